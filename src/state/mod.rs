//! State-handle model and restore-time reconciliation.
//!
//! State bytes themselves are owned by the storage engine; this module deals
//! in opaque handles. Once a handle is part of a completed checkpoint it is
//! immutable and shared by reference between the coordinator's bookkeeping
//! and the restore path.

mod handles;
mod prioritized;
mod repartition;
mod subtask;

pub use handles::*;
pub use prioritized::*;
pub use repartition::*;
pub use subtask::*;

#[cfg(test)]
#[path = "tests/handles_tests.rs"]
mod handles_tests;
#[cfg(test)]
#[path = "tests/prioritized_tests.rs"]
mod prioritized_tests;
#[cfg(test)]
#[path = "tests/repartition_tests.rs"]
mod repartition_tests;
