use super::*;

/// What an accepted acknowledgement did to the pending checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// More acknowledgements are still outstanding.
    Progress,
    /// Every expected attempt has acknowledged; the checkpoint can be
    /// promoted.
    Complete,
}

/// Coordinator-side bookkeeping for one in-progress checkpoint.
///
/// The set of acknowledging attempts is always a subset of the attempts the
/// trigger addressed: anything else is rejected before it can touch the
/// collected state.
#[derive(Debug)]
pub struct PendingCheckpoint {
    checkpoint_id: CheckpointId,
    timestamp: EventTime,
    props: CheckpointProps,
    created_at: Instant,
    expected: HashMap<ExecutionAttemptId, ExecutionAttempt>,
    acknowledged: HashSet<ExecutionAttemptId>,
    operator_states: HashMap<OperatorId, OperatorState>,
    master_states: Vec<MasterState>,
    metrics: CheckpointMetrics,
}

impl PendingCheckpoint {
    pub fn new(
        checkpoint_id: CheckpointId,
        timestamp: EventTime,
        props: CheckpointProps,
        attempts: &[ExecutionAttempt],
        created_at: Instant,
    ) -> Self {
        Self {
            checkpoint_id,
            timestamp,
            props,
            created_at,
            expected: attempts.iter().map(|a| (a.attempt_id, *a)).collect(),
            acknowledged: HashSet::new(),
            operator_states: HashMap::new(),
            master_states: Vec::new(),
            metrics: CheckpointMetrics::default(),
        }
    }

    /// Attaches coordinator-side hook state captured at trigger time.
    pub fn add_master_state(&mut self, state: MasterState) {
        self.master_states.push(state);
    }

    pub fn checkpoint_id(&self) -> CheckpointId {
        self.checkpoint_id
    }

    pub fn props(&self) -> CheckpointProps {
        self.props
    }

    pub fn num_expected(&self) -> usize {
        self.expected.len()
    }

    pub fn num_acknowledged(&self) -> usize {
        self.acknowledged.len()
    }

    pub fn is_fully_acknowledged(&self) -> bool {
        self.acknowledged.len() == self.expected.len()
    }

    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.duration_since(self.created_at) >= timeout
    }

    /// Records one subtask's acknowledgement.
    pub fn acknowledge(
        &mut self,
        ack: AcknowledgeCheckpoint,
    ) -> Result<AckOutcome, CheckpointError> {
        let attempt = *self.expected.get(&ack.attempt_id).ok_or(
            CheckpointError::UnexpectedAcknowledger {
                checkpoint_id: self.checkpoint_id,
                task: ack.task_id,
            },
        )?;
        if self.acknowledged.contains(&ack.attempt_id) {
            return Err(CheckpointError::DuplicateAcknowledgement {
                checkpoint_id: self.checkpoint_id,
                task: ack.task_id,
            });
        }

        let operator_id = attempt.task_id.operator_id;
        let operator_state = self.operator_states.entry(operator_id).or_insert_with(|| {
            OperatorState::new(operator_id, attempt.parallelism, attempt.max_parallelism)
        });
        operator_state.put_subtask_state(attempt.task_id.subtask_index, ack.subtask_state)?;

        // The attempt counts only once its fragment is recorded; a rejected
        // fragment leaves the checkpoint short of promotion.
        self.acknowledged.insert(ack.attempt_id);
        self.metrics.absorb(&ack.metrics);

        if self.is_fully_acknowledged() {
            Ok(AckOutcome::Complete)
        } else {
            Ok(AckOutcome::Progress)
        }
    }

    /// Promotes the fully acknowledged checkpoint into its immutable form.
    pub fn into_completed(self, external_location: String) -> CompletedCheckpoint {
        CompletedCheckpoint {
            checkpoint_id: self.checkpoint_id,
            timestamp: self.timestamp,
            props: self.props,
            operator_states: self.operator_states,
            master_states: self.master_states,
            metrics: self.metrics,
            external_location,
        }
    }
}
