//! Re-partitioning of recorded operator state to a new parallelism.
//!
//! Keyed handles are assigned to every new subtask whose target key-group
//! range intersects the handle's recorded range; the restoring backend reads
//! only the groups it owns. Operator handles cannot be split, so on a
//! parallelism change they are redistributed round-robin.

use crate::error::CheckpointError;

use super::handles::KeyGroupRange;
use super::subtask::{OperatorState, OperatorSubtaskState};

/// Build the per-subtask state assignments for restoring `state` at
/// `new_parallelism`.
///
/// Returns one [`OperatorSubtaskState`] per new subtask index. When the
/// parallelism is unchanged, recorded fragments pass through verbatim.
pub fn repartition_operator_state(
    state: &OperatorState,
    new_parallelism: usize,
) -> Result<Vec<OperatorSubtaskState>, CheckpointError> {
    if new_parallelism == 0 || new_parallelism > state.max_parallelism {
        return Err(CheckpointError::RescaleAboveMax {
            operator: state.operator_id,
            requested: new_parallelism,
            max: state.max_parallelism,
        });
    }

    if new_parallelism == state.parallelism {
        return Ok((0..new_parallelism)
            .map(|idx| state.subtask_state(idx).cloned().unwrap_or_default())
            .collect());
    }

    let mut assignments: Vec<OperatorSubtaskState> =
        (0..new_parallelism).map(|_| OperatorSubtaskState::empty()).collect();

    // Keyed state follows key-group ownership.
    for (new_index, assignment) in assignments.iter_mut().enumerate() {
        let target = KeyGroupRange::for_operator_index(
            state.max_parallelism,
            new_parallelism,
            new_index,
        );
        for (_, old) in state.iter() {
            for handle in &old.managed_keyed {
                if overlaps(handle.key_group_range(), target) {
                    assignment.managed_keyed.push(handle.clone());
                }
            }
            for handle in &old.raw_keyed {
                if overlaps(handle.key_group_range(), target) {
                    assignment.raw_keyed.push(handle.clone());
                }
            }
        }
    }

    // Operator state is opaque and unsplittable: deal handles out round-robin.
    let mut next = 0usize;
    for (_, old) in state.iter() {
        for handle in &old.managed_operator {
            assignments[next % new_parallelism]
                .managed_operator
                .push(handle.clone());
            next += 1;
        }
    }
    let mut next = 0usize;
    for (_, old) in state.iter() {
        for handle in &old.raw_operator {
            assignments[next % new_parallelism]
                .raw_operator
                .push(handle.clone());
            next += 1;
        }
    }

    Ok(assignments)
}

fn overlaps(recorded: Option<KeyGroupRange>, target: KeyGroupRange) -> bool {
    recorded.is_some_and(|range| range.intersect(&target).is_some())
}
