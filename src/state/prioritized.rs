//! Restore-time reconciliation of recorded state against local alternatives.
//!
//! When a subtask restarts on a machine that still holds a local copy of an
//! earlier snapshot, restoring from the local copy is much cheaper than
//! re-fetching the authoritative primary. Reconciliation computes, per state
//! category, the best available mix while guaranteeing it covers exactly the
//! state the primary covers. The computation is deterministic and
//! side-effect-free so a failed restore attempt can simply retry with the
//! next candidate.

use std::collections::HashMap;

use crate::state::handles::{KeyGroupRange, StateObjectCollection};
use crate::state::subtask::OperatorSubtaskState;
use crate::task::TaskId;

/// Restore-time view of one subtask's state: per category, an ordered list
/// of candidate collections from best (fastest local mix) to worst
/// (authoritative primary), always ending in the primary.
///
/// Each list has at most two entries. Callers try the first candidate and
/// fall back to the next on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrioritizedOperatorSubtaskState {
    managed_operator: Vec<StateObjectCollection>,
    raw_operator: Vec<StateObjectCollection>,
    managed_keyed: Vec<StateObjectCollection>,
    raw_keyed: Vec<StateObjectCollection>,
}

impl PrioritizedOperatorSubtaskState {
    /// Build the prioritized view from the recorded primary state and zero
    /// or more locally cached alternatives, ordered from least to most
    /// preferred.
    pub fn build(primary: &OperatorSubtaskState, alternatives: &[OperatorSubtaskState]) -> Self {
        Self {
            managed_operator: resolve_operator(
                &primary.managed_operator,
                alternatives.iter().map(|a| &a.managed_operator),
            ),
            raw_operator: resolve_operator(
                &primary.raw_operator,
                alternatives.iter().map(|a| &a.raw_operator),
            ),
            managed_keyed: resolve_keyed(
                &primary.managed_keyed,
                alternatives.iter().map(|a| &a.managed_keyed),
            ),
            raw_keyed: resolve_keyed(
                &primary.raw_keyed,
                alternatives.iter().map(|a| &a.raw_keyed),
            ),
        }
    }

    /// A view with no alternatives: every category is just the primary.
    pub fn primary_only(primary: &OperatorSubtaskState) -> Self {
        Self::build(primary, &[])
    }

    /// Candidates for managed operator state, best first.
    pub fn managed_operator(&self) -> &[StateObjectCollection] {
        &self.managed_operator
    }

    /// Candidates for raw operator state, best first.
    pub fn raw_operator(&self) -> &[StateObjectCollection] {
        &self.raw_operator
    }

    /// Candidates for managed keyed state, best first.
    pub fn managed_keyed(&self) -> &[StateObjectCollection] {
        &self.managed_keyed
    }

    /// Candidates for raw keyed state, best first.
    pub fn raw_keyed(&self) -> &[StateObjectCollection] {
        &self.raw_keyed
    }
}

/// Operator-state categories: an alternative may stand in for the primary
/// only when the primary holds exactly one handle. Ambiguous multi-handle
/// primaries fall back to the primary verbatim, never an error.
fn resolve_operator<'a>(
    primary: &StateObjectCollection,
    alternatives: impl Iterator<Item = &'a StateObjectCollection>,
) -> Vec<StateObjectCollection> {
    let mut best: Option<StateObjectCollection> = None;
    if primary.has_exactly_one() {
        // Later entries are more preferred and overwrite earlier ones.
        for alternative in alternatives {
            if !alternative.is_empty() {
                best = Some(alternative.clone());
            }
        }
    }
    match best {
        Some(mix) => vec![mix, primary.clone()],
        None => vec![primary.clone()],
    }
}

/// Keyed-state categories: substitute per key-group range. The result covers
/// exactly the primary's ranges; an alternative handle replaces a primary
/// handle only when its range is identical to one the primary covers.
fn resolve_keyed<'a>(
    primary: &StateObjectCollection,
    alternatives: impl Iterator<Item = &'a StateObjectCollection>,
) -> Vec<StateObjectCollection> {
    if primary.is_empty() {
        return vec![primary.clone()];
    }

    // Position of each primary handle by its key-group range. A primary
    // handle without a range (or with a duplicate range) makes substitution
    // ambiguous, so fall back to the primary verbatim.
    let mut by_range: HashMap<KeyGroupRange, usize> = HashMap::new();
    for (idx, handle) in primary.iter().enumerate() {
        let Some(range) = handle.key_group_range() else {
            return vec![primary.clone()];
        };
        if by_range.insert(range, idx).is_some() {
            return vec![primary.clone()];
        }
    }

    let mut mixed: Vec<_> = primary.iter().cloned().collect();
    let mut substituted = false;

    // Walk alternatives from least to most preferred: later entries
    // overwrite earlier ones at matching ranges.
    for alternative in alternatives {
        if alternative.is_empty() {
            continue;
        }
        for handle in alternative {
            let Some(range) = handle.key_group_range() else {
                continue;
            };
            if let Some(&idx) = by_range.get(&range) {
                mixed[idx] = handle.clone();
                substituted = true;
            }
        }
    }

    if substituted {
        vec![StateObjectCollection::new(mixed), primary.clone()]
    } else {
        vec![primary.clone()]
    }
}

/// Task-local registry of cached snapshot copies usable as restore
/// alternatives.
///
/// Alternatives are registered oldest-first; registration order is the
/// preference order handed to [`PrioritizedOperatorSubtaskState::build`].
#[derive(Debug, Default)]
pub struct LocalStateCache {
    alternatives: HashMap<TaskId, Vec<OperatorSubtaskState>>,
}

impl LocalStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a locally cached copy for a task. Later registrations are
    /// preferred over earlier ones.
    pub fn register(&mut self, task_id: TaskId, state: OperatorSubtaskState) {
        self.alternatives.entry(task_id).or_default().push(state);
    }

    /// Number of cached copies for a task.
    pub fn num_alternatives(&self, task_id: TaskId) -> usize {
        self.alternatives.get(&task_id).map_or(0, Vec::len)
    }

    /// Build the prioritized restore view for a task against its cached
    /// alternatives.
    pub fn prioritize(
        &self,
        task_id: TaskId,
        primary: &OperatorSubtaskState,
    ) -> PrioritizedOperatorSubtaskState {
        match self.alternatives.get(&task_id) {
            Some(alts) => PrioritizedOperatorSubtaskState::build(primary, alts),
            None => PrioritizedOperatorSubtaskState::primary_only(primary),
        }
    }

    /// Drop all cached copies for a task, e.g. after a successful restore.
    pub fn evict(&mut self, task_id: TaskId) {
        self.alternatives.remove(&task_id);
    }
}
