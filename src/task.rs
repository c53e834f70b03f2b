//! Identity model for the checkpoint protocol.
//!
//! The coordinator addresses running subtasks by [`ExecutionAttemptId`]
//! (unique per running instance, even across restarts of the same slot),
//! while checkpoint state is recorded per [`OperatorId`] and subtask index.

use serde::{Deserialize, Serialize};

/// Unique identifier for a logical operator in the job graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperatorId(pub u32);

impl OperatorId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for OperatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operator_{}", self.0)
    }
}

/// Unique identifier for one parallel subtask of an operator.
///
/// Format: `{operator_id}_{subtask_index}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId {
    pub operator_id: OperatorId,
    pub subtask_index: usize,
}

impl TaskId {
    pub fn new(operator_id: OperatorId, subtask_index: usize) -> Self {
        Self {
            operator_id,
            subtask_index,
        }
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.operator_id, self.subtask_index)
    }
}

/// Unique identifier for one running execution of a subtask.
///
/// A restarted subtask gets a fresh attempt ID, so late acknowledgements
/// from a previous incarnation never count toward a new checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionAttemptId(pub u64);

impl ExecutionAttemptId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ExecutionAttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "attempt_{}", self.0)
    }
}

/// Identifies one input channel of a subtask: gate index plus channel index
/// within the gate.
///
/// A subtask has a fixed channel set for its lifetime; channels only leave
/// the set by reaching end-of-input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId {
    pub gate_index: usize,
    pub channel_index: usize,
}

impl ChannelId {
    pub fn new(gate_index: usize, channel_index: usize) -> Self {
        Self {
            gate_index,
            channel_index,
        }
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gate_{}_ch_{}", self.gate_index, self.channel_index)
    }
}

/// One running subtask instance as the coordinator sees it when triggering
/// a checkpoint: who must acknowledge, and how its operator is parallelized
/// at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionAttempt {
    pub attempt_id: ExecutionAttemptId,
    pub task_id: TaskId,
    pub parallelism: usize,
    pub max_parallelism: usize,
}

impl ExecutionAttempt {
    pub fn new(
        attempt_id: ExecutionAttemptId,
        task_id: TaskId,
        parallelism: usize,
        max_parallelism: usize,
    ) -> Self {
        Self {
            attempt_id,
            task_id,
            parallelism,
            max_parallelism,
        }
    }
}

/// A running vertex of the execution graph, as the restore path sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionVertex {
    pub operator_id: OperatorId,
    pub parallelism: usize,
    pub max_parallelism: usize,
}

impl ExecutionVertex {
    pub fn new(operator_id: OperatorId, parallelism: usize, max_parallelism: usize) -> Self {
        Self {
            operator_id,
            parallelism,
            max_parallelism,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_display() {
        let t = TaskId::new(OperatorId::new(3), 1);
        assert_eq!(t.to_string(), "operator_3_1");
    }

    #[test]
    fn test_channel_id_display() {
        let c = ChannelId::new(0, 2);
        assert_eq!(c.to_string(), "gate_0_ch_2");
    }

    #[test]
    fn test_attempt_ids_distinguish_incarnations() {
        let task = TaskId::new(OperatorId::new(1), 0);
        let first = ExecutionAttempt::new(ExecutionAttemptId::new(10), task, 2, 128);
        let restarted = ExecutionAttempt::new(ExecutionAttemptId::new(11), task, 2, 128);
        assert_eq!(first.task_id, restarted.task_id);
        assert_ne!(first.attempt_id, restarted.attempt_id);
    }
}
