//! Checkpoint error taxonomy.
//!
//! Protocol violations are fatal to the observing subtask and are never
//! retried. Coordinator-level failures (timeout, decline, restore mismatch)
//! are terminal for that checkpoint or restore attempt but never crash the
//! coordinator itself.

use thiserror::Error;

use crate::task::{ChannelId, OperatorId, TaskId};
use crate::types::CheckpointId;

/// Errors raised by the checkpoint protocol core.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Barrier IDs regressed within a single channel. Per-channel delivery
    /// order is a transport guarantee, so this is a protocol violation.
    #[error(
        "out-of-order barrier on channel {channel}: checkpoint {incoming} after {newest}"
    )]
    BarrierOutOfOrder {
        channel: ChannelId,
        newest: CheckpointId,
        incoming: CheckpointId,
    },

    /// The same barrier arrived twice on one channel.
    #[error("duplicate barrier {checkpoint_id} on channel {channel}")]
    DuplicateBarrier {
        channel: ChannelId,
        checkpoint_id: CheckpointId,
    },

    /// An element referenced a channel outside the subtask's fixed input set.
    #[error("channel {channel} is not part of this input set")]
    UnknownChannel { channel: ChannelId },

    /// An element arrived on a channel that already reported end-of-input.
    #[error("element received on closed channel {channel}")]
    ChannelClosed { channel: ChannelId },

    /// A pending checkpoint did not complete within its deadline.
    #[error("checkpoint {checkpoint_id} expired before completion")]
    AlignmentTimeout { checkpoint_id: CheckpointId },

    /// A subtask reported an explicit local snapshot failure.
    #[error("task {task} declined checkpoint {checkpoint_id}: {reason}")]
    Declined {
        checkpoint_id: CheckpointId,
        task: TaskId,
        reason: String,
    },

    /// An acknowledgement arrived from an attempt the pending checkpoint
    /// does not expect.
    #[error("attempt for task {task} is not expected for checkpoint {checkpoint_id}")]
    UnexpectedAcknowledger {
        checkpoint_id: CheckpointId,
        task: TaskId,
    },

    /// The same attempt acknowledged a pending checkpoint twice.
    #[error("duplicate ack from task {task} for checkpoint {checkpoint_id}")]
    DuplicateAcknowledgement {
        checkpoint_id: CheckpointId,
        task: TaskId,
    },

    /// A completed checkpoint references an operator no longer present in
    /// the graph, and non-restored state was not explicitly allowed.
    #[error(
        "checkpoint contains state for operator {operator} which is not running; \
         set allow_non_restored_state to skip it"
    )]
    NonRestoredState { operator: OperatorId },

    /// An acknowledgement carried a subtask index outside the operator's
    /// parallelism recorded at snapshot time.
    #[error(
        "subtask index {index} out of range for operator {operator} \
         with parallelism {parallelism}"
    )]
    SubtaskIndexOutOfRange {
        operator: OperatorId,
        index: usize,
        parallelism: usize,
    },

    /// Restore requested a parallelism above the operator's max parallelism
    /// recorded at snapshot time.
    #[error(
        "operator {operator} cannot rescale to parallelism {requested} above \
         max parallelism {max}"
    )]
    RescaleAboveMax {
        operator: OperatorId,
        requested: usize,
        max: usize,
    },
}

impl CheckpointError {
    /// Protocol violations are fatal to the subtask that observed them.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::BarrierOutOfOrder { .. }
                | Self::DuplicateBarrier { .. }
                | Self::UnknownChannel { .. }
                | Self::ChannelClosed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::ChannelId;

    #[test]
    fn test_protocol_violation_classification() {
        let err = CheckpointError::BarrierOutOfOrder {
            channel: ChannelId::new(0, 0),
            newest: 5,
            incoming: 4,
        };
        assert!(err.is_protocol_violation());

        let err = CheckpointError::AlignmentTimeout { checkpoint_id: 3 };
        assert!(!err.is_protocol_violation());
    }

    #[test]
    fn test_error_display_mentions_channel() {
        let err = CheckpointError::ChannelClosed {
            channel: ChannelId::new(1, 2),
        };
        assert!(err.to_string().contains("gate_1_ch_2"));
    }
}
