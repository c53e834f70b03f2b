use super::*;

/// How the coordinator classified an acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckResponse {
    /// The id is unknown or already resolved; the message was dropped.
    Ignored,
    /// Recorded; more acknowledgements are outstanding.
    Progress,
    /// This acknowledgement completed the checkpoint.
    Completed,
}

/// Restore-time assignment of recorded state to the new execution graph.
#[derive(Debug, Clone, PartialEq)]
pub struct RestorePlan {
    pub checkpoint_id: CheckpointId,
    pub assignments: HashMap<TaskId, OperatorSubtaskState>,
}

impl RestorePlan {
    /// Resolves each assignment against a cache of locally held snapshot
    /// copies, yielding per-task candidate lists for the actual restore.
    pub fn prioritize(
        &self,
        cache: &LocalStateCache,
    ) -> HashMap<TaskId, PrioritizedOperatorSubtaskState> {
        self.assignments
            .iter()
            .map(|(task_id, primary)| (*task_id, cache.prioritize(*task_id, primary)))
            .collect()
    }
}

/// Drives the checkpoint protocol from the coordinator's side: triggering,
/// collecting acknowledgements and declines, promoting fully acknowledged
/// checkpoints, expiry, and restore planning.
///
/// The coordinator is driven from a single control thread; every entry
/// point takes `&mut self` and runs to completion, so no two checkpoint
/// decisions ever interleave.
pub struct CheckpointCoordinator<S> {
    config: CheckpointConfig,
    storage: Arc<S>,
    store: CompletedCheckpointStore,
    next_checkpoint_id: CheckpointId,
    pending: HashMap<CheckpointId, PendingCheckpoint>,
    /// Checkpoints declined, expired, or superseded. Late acknowledgements
    /// for these are dropped without complaint.
    aborted: HashSet<CheckpointId>,
    last_trigger_at: Option<Instant>,
    notifications: VecDeque<CheckpointNotification>,
}

impl<S: CheckpointStorage> CheckpointCoordinator<S> {
    pub fn new(config: CheckpointConfig, storage: Arc<S>) -> Self {
        let store = CompletedCheckpointStore::new(config.retention);
        Self {
            config,
            storage,
            store,
            next_checkpoint_id: 1,
            pending: HashMap::new(),
            aborted: HashSet::new(),
            last_trigger_at: None,
            notifications: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn num_pending(&self) -> usize {
        self.pending.len()
    }

    pub fn pending_checkpoint(&self, checkpoint_id: CheckpointId) -> Option<&PendingCheckpoint> {
        self.pending.get(&checkpoint_id)
    }

    pub fn completed_checkpoint_ids(&self) -> Vec<CheckpointId> {
        self.store.checkpoint_ids()
    }

    pub fn latest_completed(&self) -> Option<Arc<CompletedCheckpoint>> {
        self.store.latest()
    }

    pub fn was_aborted(&self, checkpoint_id: CheckpointId) -> bool {
        self.aborted.contains(&checkpoint_id)
    }

    /// Starts a new checkpoint over the given execution attempts and hands
    /// back the barrier to inject at the sources.
    ///
    /// Regular checkpoints respect the concurrency limit and the minimum
    /// pause; savepoints are user-initiated and bypass both.
    pub fn trigger_checkpoint(
        &mut self,
        timestamp: EventTime,
        attempts: &[ExecutionAttempt],
        props: CheckpointProps,
    ) -> Result<Barrier> {
        if attempts.is_empty() {
            return Err(anyhow!("cannot trigger a checkpoint with no execution attempts"));
        }
        if !props.is_savepoint() {
            if self.pending.len() >= self.config.max_concurrent_checkpoints {
                return Err(anyhow!(
                    "too many concurrent checkpoints: {} already pending",
                    self.pending.len()
                ));
            }
            if let Some(last) = self.last_trigger_at {
                if last.elapsed() < self.config.min_pause_between {
                    return Err(anyhow!(
                        "minimum pause between checkpoints has not elapsed"
                    ));
                }
            }
        }

        let checkpoint_id = self.next_checkpoint_id;
        self.next_checkpoint_id += 1;
        self.last_trigger_at = Some(Instant::now());

        let pending = PendingCheckpoint::new(
            checkpoint_id,
            timestamp,
            props,
            attempts,
            Instant::now(),
        );
        tracing::info!(
            checkpoint_id,
            num_attempts = attempts.len(),
            savepoint = props.is_savepoint(),
            "triggering checkpoint"
        );
        self.pending.insert(checkpoint_id, pending);

        Ok(Barrier::with_options(checkpoint_id, timestamp, props.options))
    }

    /// Attaches coordinator-side hook state to a pending checkpoint.
    /// Returns false when the id is unknown or already resolved.
    pub fn add_master_state(&mut self, checkpoint_id: CheckpointId, state: MasterState) -> bool {
        match self.pending.get_mut(&checkpoint_id) {
            Some(pending) => {
                pending.add_master_state(state);
                true
            }
            None => false,
        }
    }

    /// Records a subtask acknowledgement, completing the checkpoint when it
    /// is the last one outstanding.
    ///
    /// Acknowledgements for unknown or already resolved checkpoints are
    /// dropped: with supersession and expiry in play, a slow subtask
    /// answering late is normal operation, not a fault.
    pub fn receive_acknowledge(&mut self, ack: AcknowledgeCheckpoint) -> Result<AckResponse> {
        let checkpoint_id = ack.checkpoint_id;
        let Some(pending) = self.pending.get_mut(&checkpoint_id) else {
            tracing::debug!(
                checkpoint_id,
                task = %ack.task_id,
                "dropping ack for unknown or resolved checkpoint"
            );
            return Ok(AckResponse::Ignored);
        };

        match pending.acknowledge(ack)? {
            AckOutcome::Progress => Ok(AckResponse::Progress),
            AckOutcome::Complete => {
                self.complete_checkpoint(checkpoint_id)?;
                Ok(AckResponse::Completed)
            }
        }
    }

    /// Aborts the pending checkpoint a subtask declined. Returns whether a
    /// pending checkpoint was actually aborted.
    pub fn receive_decline(&mut self, decline: &DeclineCheckpoint) -> bool {
        let checkpoint_id = decline.checkpoint_id;
        if self.pending.remove(&checkpoint_id).is_none() {
            tracing::debug!(
                checkpoint_id,
                task = %decline.task_id,
                "dropping decline for unknown or resolved checkpoint"
            );
            return false;
        }
        tracing::warn!(
            checkpoint_id,
            task = %decline.task_id,
            reason = %decline.reason,
            "checkpoint declined, aborting"
        );
        self.abort(checkpoint_id);
        true
    }

    /// Aborts every pending checkpoint whose deadline has passed as of
    /// `now`, returning the expired ids in ascending order.
    pub fn expire_pending_checkpoints(&mut self, now: Instant) -> Vec<CheckpointId> {
        let mut expired: Vec<_> = self
            .pending
            .iter()
            .filter(|(_, p)| p.is_expired(now, self.config.checkpoint_timeout))
            .map(|(id, _)| *id)
            .collect();
        expired.sort();
        for checkpoint_id in &expired {
            self.pending.remove(checkpoint_id);
            tracing::warn!(checkpoint_id, "checkpoint expired before completion");
            self.abort(*checkpoint_id);
        }
        expired
    }

    /// Drains the completion and abort notifications queued for the tasks.
    pub fn take_notifications(&mut self) -> Vec<CheckpointNotification> {
        self.notifications.drain(..).collect()
    }

    /// Plans a restore from the most recent completed checkpoint, mapping
    /// recorded operator state onto the (possibly rescaled) new graph.
    ///
    /// Returns `None` when nothing has completed yet; a fresh start is not
    /// an error. Recorded state for an operator missing from `vertices` is
    /// an error unless `allow_non_restored_state` is set.
    pub fn restore_latest(
        &self,
        vertices: &[ExecutionVertex],
        allow_non_restored_state: bool,
    ) -> Result<Option<RestorePlan>> {
        let Some(checkpoint) = self.store.latest() else {
            return Ok(None);
        };

        let by_operator: HashMap<OperatorId, &ExecutionVertex> =
            vertices.iter().map(|v| (v.operator_id, v)).collect();

        let mut assignments = HashMap::new();
        for operator_id in checkpoint.operator_ids() {
            let operator_state = match checkpoint.state_for(operator_id) {
                Some(state) => state,
                None => continue,
            };
            let Some(vertex) = by_operator.get(&operator_id) else {
                if operator_state.is_empty() {
                    continue;
                }
                if !allow_non_restored_state {
                    return Err(CheckpointError::NonRestoredState {
                        operator: operator_id,
                    }
                    .into());
                }
                tracing::warn!(
                    operator = %operator_id,
                    "skipping state for operator not present in the new graph"
                );
                continue;
            };

            let subtask_states = repartition_operator_state(operator_state, vertex.parallelism)?;
            for (subtask_index, state) in subtask_states.into_iter().enumerate() {
                assignments.insert(TaskId::new(operator_id, subtask_index), state);
            }
        }

        tracing::info!(
            checkpoint_id = checkpoint.checkpoint_id,
            num_assignments = assignments.len(),
            "planned restore from latest checkpoint"
        );
        Ok(Some(RestorePlan {
            checkpoint_id: checkpoint.checkpoint_id,
            assignments,
        }))
    }

    /// Promotes a fully acknowledged pending checkpoint: persist, register
    /// in the store, release what it subsumed, notify the tasks.
    fn complete_checkpoint(&mut self, checkpoint_id: CheckpointId) -> Result<()> {
        let pending = self
            .pending
            .remove(&checkpoint_id)
            .ok_or_else(|| anyhow!("pending checkpoint {checkpoint_id} disappeared"))?;

        let location = self.storage.location(checkpoint_id);
        let completed = pending.into_completed(location);

        if let Err(err) = self.storage.persist(&completed) {
            // Without durable metadata the checkpoint cannot be restored
            // from, so it must not be advertised as complete.
            tracing::error!(checkpoint_id, "failed to persist checkpoint: {err:#}");
            self.abort(checkpoint_id);
            return Err(err.context(format!("failed to persist checkpoint {checkpoint_id}")));
        }

        let (retained, subsumed) = self.store.add(completed);
        for old in &subsumed {
            if let Err(err) = self.storage.discard(old.checkpoint_id) {
                tracing::warn!(
                    checkpoint_id = old.checkpoint_id,
                    "failed to discard subsumed checkpoint: {err:#}"
                );
            }
        }

        tracing::info!(
            checkpoint_id,
            location = %retained.external_location,
            bytes = retained.total_size_bytes(),
            num_subsumed = subsumed.len(),
            "checkpoint complete"
        );
        self.notifications
            .push_back(CheckpointNotification::Completed(checkpoint_id));
        Ok(())
    }

    fn abort(&mut self, checkpoint_id: CheckpointId) {
        self.aborted.insert(checkpoint_id);
        self.notifications
            .push_back(CheckpointNotification::Aborted(checkpoint_id));
    }
}
