//! Checkpoint protocol core.
//!
//! Task side: [`BarrierAligner`] (aligned mode), [`UnalignedCapture`]
//! (unaligned mode), and the [`SubtaskSnapshotTrigger`] that turns a locally
//! settled checkpoint into an acknowledge or decline message.
//!
//! Coordinator side: [`CheckpointCoordinator`] drives triggering, the
//! [`PendingCheckpoint`] lifecycle, completion into the
//! [`CompletedCheckpointStore`], and restore orchestration.

use crate::error::CheckpointError;
use crate::state::{
    repartition_operator_state, LocalStateCache, OperatorState, OperatorSubtaskState,
    PrioritizedOperatorSubtaskState,
};
use crate::task::{ChannelId, ExecutionAttempt, ExecutionAttemptId, ExecutionVertex, OperatorId, TaskId};
use crate::types::{
    Barrier, CancelMarker, CheckpointId, CheckpointOptions, EventTime, StreamElement,
};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

mod aligner;
mod config;
mod coordinator;
mod events;
mod metadata;
mod pending;
mod store;
mod trigger;
mod unaligned;

pub use aligner::*;
pub use config::*;
pub use coordinator::*;
pub use events::*;
pub use metadata::*;
pub use pending::*;
pub use store::*;
pub use trigger::*;
pub use unaligned::*;

#[cfg(test)]
#[path = "tests/aligner_tests.rs"]
mod aligner_tests;
#[cfg(test)]
#[path = "tests/coordinator_tests.rs"]
mod coordinator_tests;
#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod store_tests;
#[cfg(test)]
#[path = "tests/trigger_tests.rs"]
mod trigger_tests;
#[cfg(test)]
#[path = "tests/unaligned_tests.rs"]
mod unaligned_tests;
