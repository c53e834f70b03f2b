use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CheckpointError;
use crate::task::OperatorId;

use super::handles::StateObjectCollection;

/// The four-way state bundle for one subtask at one checkpoint:
/// managed/raw × operator/keyed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSubtaskState {
    pub managed_operator: StateObjectCollection,
    pub raw_operator: StateObjectCollection,
    pub managed_keyed: StateObjectCollection,
    pub raw_keyed: StateObjectCollection,
}

impl OperatorSubtaskState {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_managed_operator(mut self, collection: StateObjectCollection) -> Self {
        self.managed_operator = collection;
        self
    }

    pub fn with_raw_operator(mut self, collection: StateObjectCollection) -> Self {
        self.raw_operator = collection;
        self
    }

    pub fn with_managed_keyed(mut self, collection: StateObjectCollection) -> Self {
        self.managed_keyed = collection;
        self
    }

    pub fn with_raw_keyed(mut self, collection: StateObjectCollection) -> Self {
        self.raw_keyed = collection;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.managed_operator.is_empty()
            && self.raw_operator.is_empty()
            && self.managed_keyed.is_empty()
            && self.raw_keyed.is_empty()
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.managed_operator.total_size_bytes()
            + self.raw_operator.total_size_bytes()
            + self.managed_keyed.total_size_bytes()
            + self.raw_keyed.total_size_bytes()
    }
}

/// Per-operator aggregation of subtask states, indexed by subtask index.
///
/// Carries the operator's parallelism and max parallelism at snapshot time,
/// which the restore path needs to re-partition keyed state on rescale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorState {
    pub operator_id: OperatorId,
    pub parallelism: usize,
    pub max_parallelism: usize,
    subtask_states: BTreeMap<usize, OperatorSubtaskState>,
}

impl OperatorState {
    pub fn new(operator_id: OperatorId, parallelism: usize, max_parallelism: usize) -> Self {
        Self {
            operator_id,
            parallelism,
            max_parallelism,
            subtask_states: BTreeMap::new(),
        }
    }

    /// Record the state fragment for one subtask index.
    pub fn put_subtask_state(
        &mut self,
        subtask_index: usize,
        state: OperatorSubtaskState,
    ) -> Result<(), CheckpointError> {
        if subtask_index >= self.parallelism {
            return Err(CheckpointError::SubtaskIndexOutOfRange {
                operator: self.operator_id,
                index: subtask_index,
                parallelism: self.parallelism,
            });
        }
        self.subtask_states.insert(subtask_index, state);
        Ok(())
    }

    pub fn subtask_state(&self, subtask_index: usize) -> Option<&OperatorSubtaskState> {
        self.subtask_states.get(&subtask_index)
    }

    /// Iterate registered subtask states in subtask-index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &OperatorSubtaskState)> {
        self.subtask_states.iter().map(|(idx, s)| (*idx, s))
    }

    pub fn num_subtask_states(&self) -> usize {
        self.subtask_states.len()
    }

    /// Whether every registered fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.subtask_states.values().all(OperatorSubtaskState::is_empty)
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.subtask_states
            .values()
            .map(OperatorSubtaskState::total_size_bytes)
            .sum()
    }
}
