use super::*;

/// What kind of snapshot a checkpoint is and how barriers should behave for
/// it. Fixed at trigger time and carried through to the completed metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointProps {
    pub options: CheckpointOptions,
}

impl CheckpointProps {
    /// A periodic aligned checkpoint.
    pub fn checkpoint() -> Self {
        Self {
            options: CheckpointOptions::aligned(),
        }
    }

    /// A periodic checkpoint whose barriers overtake buffered data.
    pub fn unaligned_checkpoint() -> Self {
        Self {
            options: CheckpointOptions::unaligned(),
        }
    }

    /// A user-requested savepoint. Savepoints always align and are never
    /// subsumed by newer checkpoints.
    pub fn savepoint() -> Self {
        Self {
            options: CheckpointOptions::savepoint(),
        }
    }

    pub fn is_savepoint(&self) -> bool {
        self.options.is_savepoint()
    }
}

/// Opaque coordinator-side state captured outside any task, e.g. a source
/// enumerator's progress. Restored on the coordinator before task state is
/// redistributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasterState {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl MasterState {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Immutable record of a fully acknowledged checkpoint: everything restore
/// needs, with no live bookkeeping attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedCheckpoint {
    pub checkpoint_id: CheckpointId,
    pub timestamp: EventTime,
    pub props: CheckpointProps,
    pub operator_states: HashMap<OperatorId, OperatorState>,
    pub master_states: Vec<MasterState>,
    pub metrics: CheckpointMetrics,
    /// Where the metadata was persisted, as reported by the storage backend.
    pub external_location: String,
}

impl CompletedCheckpoint {
    pub fn state_for(&self, operator_id: OperatorId) -> Option<&OperatorState> {
        self.operator_states.get(&operator_id)
    }

    pub fn is_savepoint(&self) -> bool {
        self.props.is_savepoint()
    }

    /// Operator ids in ascending order, for deterministic iteration.
    pub fn operator_ids(&self) -> Vec<OperatorId> {
        let mut ids: Vec<_> = self.operator_states.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.operator_states.values().map(OperatorState::total_size_bytes).sum()
    }
}
