use super::*;

/// Tuning knobs for the checkpoint protocol, shared by the coordinator and
/// the task-side alignment machinery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CheckpointConfig {
    /// Upper bound on simultaneously pending checkpoints. Savepoints are
    /// exempt from this limit.
    pub max_concurrent_checkpoints: usize,
    /// Minimum wall-clock pause between two checkpoint triggers. Savepoints
    /// are exempt.
    pub min_pause_between: Duration,
    /// A pending checkpoint older than this is expired and aborted.
    pub checkpoint_timeout: Duration,
    /// How many completed checkpoints survive subsumption.
    pub retention: CheckpointRetentionPolicy,
    /// Aligned mode: how many elements a subtask may withhold on blocked
    /// channels before the alignment is abandoned.
    pub max_buffered_elements: usize,
    /// Unaligned mode: how many in-flight elements a capture may record
    /// before it is abandoned.
    pub max_in_flight_elements: usize,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            max_concurrent_checkpoints: 1,
            min_pause_between: Duration::ZERO,
            checkpoint_timeout: Duration::from_secs(600),
            retention: CheckpointRetentionPolicy::RetainLast(3),
            max_buffered_elements: 10_000,
            max_in_flight_elements: 10_000,
        }
    }
}

impl CheckpointConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_checkpoints(mut self, max: usize) -> Self {
        self.max_concurrent_checkpoints = max.max(1);
        self
    }

    pub fn with_min_pause_between(mut self, pause: Duration) -> Self {
        self.min_pause_between = pause;
        self
    }

    pub fn with_checkpoint_timeout(mut self, timeout: Duration) -> Self {
        self.checkpoint_timeout = timeout;
        self
    }

    pub fn with_retention(mut self, retention: CheckpointRetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_max_buffered_elements(mut self, max: usize) -> Self {
        self.max_buffered_elements = max;
        self
    }

    pub fn with_max_in_flight_elements(mut self, max: usize) -> Self {
        self.max_in_flight_elements = max;
        self
    }
}
