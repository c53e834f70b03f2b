//! # SnapCrab Checkpointing Core
//!
//! Fault-tolerance core for the SnapCrab stream processing engine: globally
//! consistent, recoverable snapshots of a running pipeline without stopping it.
//!
//! This crate provides the checkpoint protocol pieces:
//!
//! - [`types`] — Wire-level element model: [`StreamElement`](types::StreamElement),
//!   [`Barrier`](types::Barrier), [`CancelMarker`](types::CancelMarker),
//!   [`CheckpointOptions`](types::CheckpointOptions).
//! - [`task`] — Identity model: [`TaskId`](task::TaskId),
//!   [`ExecutionAttemptId`](task::ExecutionAttemptId), [`ChannelId`](task::ChannelId).
//! - [`state`] — State-handle model and restore-time reconciliation:
//!   [`OperatorSubtaskState`](state::OperatorSubtaskState),
//!   [`PrioritizedOperatorSubtaskState`](state::PrioritizedOperatorSubtaskState).
//! - [`checkpoint`] — The protocol core: barrier alignment, unaligned in-flight
//!   capture, the subtask snapshot trigger, and the
//!   [`CheckpointCoordinator`](checkpoint::CheckpointCoordinator).
//! - [`error`] — The checkpoint error taxonomy.

pub mod checkpoint;
pub mod error;
pub mod state;
pub mod task;
pub mod types;
