use super::*;

/// Timing and volume figures a subtask reports with its acknowledgement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointMetrics {
    /// Time spent between the first and the last barrier of the alignment.
    pub alignment_duration_ms: u64,
    /// Time spent in the synchronous snapshot phase.
    pub sync_duration_ms: u64,
    /// Time spent writing state out after the synchronous phase.
    pub async_duration_ms: u64,
    /// Bytes of state persisted for this subtask.
    pub bytes_persisted: u64,
}

impl CheckpointMetrics {
    /// Fold another subtask's figures into a checkpoint-wide aggregate:
    /// durations track the slowest subtask, bytes add up.
    pub fn absorb(&mut self, other: &CheckpointMetrics) {
        self.alignment_duration_ms = self.alignment_duration_ms.max(other.alignment_duration_ms);
        self.sync_duration_ms = self.sync_duration_ms.max(other.sync_duration_ms);
        self.async_duration_ms = self.async_duration_ms.max(other.async_duration_ms);
        self.bytes_persisted += other.bytes_persisted;
    }
}

/// Task -> coordinator: the subtask finished its local snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcknowledgeCheckpoint {
    pub checkpoint_id: CheckpointId,
    pub task_id: TaskId,
    pub attempt_id: ExecutionAttemptId,
    pub subtask_state: OperatorSubtaskState,
    pub metrics: CheckpointMetrics,
}

/// Task -> coordinator: the subtask could not take part in the checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclineCheckpoint {
    pub checkpoint_id: CheckpointId,
    pub task_id: TaskId,
    pub attempt_id: ExecutionAttemptId,
    pub reason: String,
}

/// Everything a subtask can send the coordinator about one checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TaskCheckpointEvent {
    Acknowledge(AcknowledgeCheckpoint),
    Decline(DeclineCheckpoint),
}

impl TaskCheckpointEvent {
    pub fn checkpoint_id(&self) -> CheckpointId {
        match self {
            TaskCheckpointEvent::Acknowledge(ack) => ack.checkpoint_id,
            TaskCheckpointEvent::Decline(decline) => decline.checkpoint_id,
        }
    }
}

/// Coordinator -> tasks: the global outcome of a checkpoint. Completion is
/// the signal to commit held-back side effects; abort releases local
/// snapshot artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CheckpointNotification {
    Completed(CheckpointId),
    Aborted(CheckpointId),
}

impl CheckpointNotification {
    pub fn checkpoint_id(&self) -> CheckpointId {
        match self {
            CheckpointNotification::Completed(id) | CheckpointNotification::Aborted(id) => *id,
        }
    }
}
