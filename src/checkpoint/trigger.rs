use super::*;

/// Where a subtask's state actually comes from when a snapshot fires.
///
/// The synchronous part runs inside `snapshot`; whatever the backend hands
/// back is what the coordinator records for this subtask.
pub trait SnapshotBackend {
    /// Capture this subtask's state for the checkpoint.
    fn snapshot(
        &mut self,
        checkpoint_id: CheckpointId,
        options: CheckpointOptions,
    ) -> Result<OperatorSubtaskState>;

    /// Release any local artifact kept for a checkpoint that will never
    /// complete.
    fn discard(&mut self, checkpoint_id: CheckpointId);
}

/// Turns a locally settled checkpoint into exactly one message to the
/// coordinator: an acknowledge carrying state, or a decline. Every trigger
/// resolves one way or the other; an id is never silently dropped, because
/// the coordinator would otherwise wait out the full timeout for it.
#[derive(Debug)]
pub struct SubtaskSnapshotTrigger<B> {
    task_id: TaskId,
    attempt_id: ExecutionAttemptId,
    backend: B,
    /// Checkpoints snapshotted locally and not yet resolved globally.
    snapshotted: HashSet<CheckpointId>,
    /// High-water mark of cancelled checkpoint ids. A trigger at or below
    /// this declines instead of snapshotting.
    cancelled_floor: Option<CheckpointId>,
}

impl<B: SnapshotBackend> SubtaskSnapshotTrigger<B> {
    pub fn new(task_id: TaskId, attempt_id: ExecutionAttemptId, backend: B) -> Self {
        Self {
            task_id,
            attempt_id,
            backend,
            snapshotted: HashSet::new(),
            cancelled_floor: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Fires the local snapshot for an aligned (or settled unaligned)
    /// checkpoint and builds the event to send upstream.
    pub fn trigger(&mut self, barrier: &Barrier, alignment_duration_ms: u64) -> TaskCheckpointEvent {
        let checkpoint_id = barrier.checkpoint_id;
        if self
            .cancelled_floor
            .is_some_and(|floor| checkpoint_id <= floor)
        {
            // The cancel overtook the barrier; decline so the coordinator
            // hears back at all.
            return self.decline(checkpoint_id, "checkpoint was cancelled before the snapshot");
        }

        let started = Instant::now();
        match self.backend.snapshot(checkpoint_id, barrier.options) {
            Ok(subtask_state) => {
                self.snapshotted.insert(checkpoint_id);
                let metrics = CheckpointMetrics {
                    alignment_duration_ms,
                    sync_duration_ms: started.elapsed().as_millis() as u64,
                    async_duration_ms: 0,
                    bytes_persisted: subtask_state.total_size_bytes(),
                };
                tracing::debug!(
                    checkpoint_id,
                    task = %self.task_id,
                    bytes = metrics.bytes_persisted,
                    "local snapshot complete"
                );
                TaskCheckpointEvent::Acknowledge(AcknowledgeCheckpoint {
                    checkpoint_id,
                    task_id: self.task_id,
                    attempt_id: self.attempt_id,
                    subtask_state,
                    metrics,
                })
            }
            Err(err) => {
                tracing::warn!(
                    checkpoint_id,
                    task = %self.task_id,
                    "local snapshot failed: {err:#}"
                );
                self.decline(checkpoint_id, &format!("snapshot failed: {err:#}"))
            }
        }
    }

    /// Handles a cancel observed after processing. Returns the decline to
    /// send when a local snapshot for the id had already fired; a cancel
    /// for an id never snapshotted here is a no-op beyond suppression.
    pub fn cancel(&mut self, checkpoint_id: CheckpointId) -> Option<TaskCheckpointEvent> {
        self.raise_cancelled_floor(checkpoint_id);
        if self.snapshotted.remove(&checkpoint_id) {
            self.backend.discard(checkpoint_id);
            Some(self.decline(checkpoint_id, "checkpoint was cancelled after the snapshot"))
        } else {
            None
        }
    }

    /// The coordinator reported the checkpoint complete; drop local
    /// bookkeeping for it.
    pub fn notify_complete(&mut self, checkpoint_id: CheckpointId) {
        self.snapshotted.remove(&checkpoint_id);
    }

    /// The coordinator aborted the checkpoint after this subtask already
    /// acknowledged; release the artifact without declining again.
    pub fn notify_aborted(&mut self, checkpoint_id: CheckpointId) {
        self.raise_cancelled_floor(checkpoint_id);
        if self.snapshotted.remove(&checkpoint_id) {
            self.backend.discard(checkpoint_id);
        }
    }

    fn decline(&mut self, checkpoint_id: CheckpointId, reason: &str) -> TaskCheckpointEvent {
        TaskCheckpointEvent::Decline(DeclineCheckpoint {
            checkpoint_id,
            task_id: self.task_id,
            attempt_id: self.attempt_id,
            reason: reason.to_string(),
        })
    }

    fn raise_cancelled_floor(&mut self, checkpoint_id: CheckpointId) {
        self.cancelled_floor = Some(match self.cancelled_floor {
            Some(floor) => floor.max(checkpoint_id),
            None => checkpoint_id,
        });
    }
}
