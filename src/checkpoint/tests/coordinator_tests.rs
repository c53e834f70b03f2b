use super::*;
use crate::state::{KeyGroupRange, StateHandle, StateObjectCollection};

const MAX_PARALLELISM: usize = 8;

fn attempts(parallelism: usize) -> Vec<ExecutionAttempt> {
    (0..parallelism)
        .map(|idx| {
            ExecutionAttempt::new(
                ExecutionAttemptId::new(100 + idx as u64),
                TaskId::new(OperatorId::new(1), idx),
                parallelism,
                MAX_PARALLELISM,
            )
        })
        .collect()
}

fn ack_for(checkpoint_id: CheckpointId, attempt: &ExecutionAttempt) -> AcknowledgeCheckpoint {
    let range = KeyGroupRange::for_operator_index(
        attempt.max_parallelism,
        attempt.parallelism,
        attempt.task_id.subtask_index,
    );
    let subtask_state = OperatorSubtaskState::empty().with_managed_keyed(
        StateObjectCollection::single(StateHandle::keyed(
            checkpoint_id * 10 + attempt.task_id.subtask_index as u64,
            range,
            format!("chk-{checkpoint_id}/keyed-{}", attempt.task_id.subtask_index),
            256,
        )),
    );
    AcknowledgeCheckpoint {
        checkpoint_id,
        task_id: attempt.task_id,
        attempt_id: attempt.attempt_id,
        subtask_state,
        metrics: CheckpointMetrics {
            alignment_duration_ms: 5,
            sync_duration_ms: 2,
            async_duration_ms: 0,
            bytes_persisted: 256,
        },
    }
}

fn coordinator(config: CheckpointConfig) -> CheckpointCoordinator<InMemoryCheckpointStorage> {
    CheckpointCoordinator::new(config, Arc::new(InMemoryCheckpointStorage::new()))
}

fn complete_one(
    coordinator: &mut CheckpointCoordinator<InMemoryCheckpointStorage>,
    attempts: &[ExecutionAttempt],
) -> CheckpointId {
    let barrier = coordinator
        .trigger_checkpoint(0, attempts, CheckpointProps::checkpoint())
        .unwrap();
    for attempt in attempts {
        coordinator
            .receive_acknowledge(ack_for(barrier.checkpoint_id, attempt))
            .unwrap();
    }
    barrier.checkpoint_id
}

#[test]
fn test_checkpoint_ids_are_monotonic() {
    let mut coordinator = coordinator(
        CheckpointConfig::default().with_max_concurrent_checkpoints(10),
    );
    let attempts = attempts(1);

    for expected in 1..=3u64 {
        let barrier = coordinator
            .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
            .unwrap();
        assert_eq!(barrier.checkpoint_id, expected);
    }
}

#[test]
fn test_trigger_requires_execution_attempts() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let err = coordinator
        .trigger_checkpoint(0, &[], CheckpointProps::checkpoint())
        .unwrap_err();
    assert!(err.to_string().contains("no execution attempts"));
}

#[test]
fn test_concurrency_limit_blocks_regular_checkpoints() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(2);

    coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    let err = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap_err();
    assert!(err.to_string().contains("concurrent"));

    // Savepoints bypass the limit.
    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::savepoint())
        .unwrap();
    assert!(barrier.options.is_savepoint());
    assert_eq!(coordinator.num_pending(), 2);
}

#[test]
fn test_min_pause_blocks_regular_checkpoints() {
    let mut coordinator = coordinator(
        CheckpointConfig::default().with_min_pause_between(Duration::from_secs(3600)),
    );
    let attempts = attempts(1);

    complete_one(&mut coordinator, &attempts);
    let err = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap_err();
    assert!(err.to_string().contains("pause"));

    // Savepoints are user-initiated and bypass the pause.
    coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::savepoint())
        .unwrap();
}

#[test]
fn test_full_acknowledgement_completes_the_checkpoint() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(2);

    let barrier = coordinator
        .trigger_checkpoint(1000, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    assert_eq!(
        coordinator
            .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
            .unwrap(),
        AckResponse::Progress
    );
    assert_eq!(
        coordinator
            .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[1]))
            .unwrap(),
        AckResponse::Completed
    );

    assert_eq!(coordinator.num_pending(), 0);
    let completed = coordinator.latest_completed().unwrap();
    assert_eq!(completed.checkpoint_id, 1);
    assert_eq!(completed.timestamp, 1000);
    assert_eq!(completed.metrics.bytes_persisted, 512);
    assert_eq!(completed.external_location, "memory://chk-1");
    assert_eq!(
        coordinator.take_notifications(),
        vec![CheckpointNotification::Completed(1)]
    );
}

#[test]
fn test_late_or_unknown_acknowledgements_are_dropped() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(1);

    // Nothing pending at all.
    assert_eq!(
        coordinator
            .receive_acknowledge(ack_for(9, &attempts[0]))
            .unwrap(),
        AckResponse::Ignored
    );

    // A decline resolves the checkpoint; the slow subtask's ack trails in.
    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    let decline = DeclineCheckpoint {
        checkpoint_id: barrier.checkpoint_id,
        task_id: attempts[0].task_id,
        attempt_id: attempts[0].attempt_id,
        reason: "snapshot failed".into(),
    };
    assert!(coordinator.receive_decline(&decline));
    assert_eq!(
        coordinator
            .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
            .unwrap(),
        AckResponse::Ignored
    );
}

#[test]
fn test_unexpected_acknowledger_is_rejected() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(1);

    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();

    let stranger = ExecutionAttempt::new(
        ExecutionAttemptId::new(999),
        TaskId::new(OperatorId::new(1), 0),
        1,
        MAX_PARALLELISM,
    );
    let err = coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &stranger))
        .unwrap_err();
    assert!(err.to_string().contains("not expected"));
}

#[test]
fn test_duplicate_acknowledgement_is_rejected() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(2);

    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
        .unwrap();
    let err = coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
        .unwrap_err();
    assert!(err.to_string().contains("duplicate ack"));
}

#[test]
fn test_decline_aborts_the_whole_checkpoint() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(2);

    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
        .unwrap();

    let decline = DeclineCheckpoint {
        checkpoint_id: barrier.checkpoint_id,
        task_id: attempts[1].task_id,
        attempt_id: attempts[1].attempt_id,
        reason: "backend unavailable".into(),
    };
    assert!(coordinator.receive_decline(&decline));
    assert!(!coordinator.receive_decline(&decline));

    assert_eq!(coordinator.num_pending(), 0);
    assert!(coordinator.was_aborted(barrier.checkpoint_id));
    assert!(coordinator.latest_completed().is_none());
    assert_eq!(
        coordinator.take_notifications(),
        vec![CheckpointNotification::Aborted(barrier.checkpoint_id)]
    );
}

#[test]
fn test_rejected_fragment_does_not_count_toward_promotion() {
    let mut coordinator = coordinator(CheckpointConfig::default());

    // Two attempts of operator 1 disagree on its parallelism: the first ack
    // fixes it at 1, so the second attempt's subtask index is unplaceable.
    let good = ExecutionAttempt::new(
        ExecutionAttemptId::new(100),
        TaskId::new(OperatorId::new(1), 0),
        1,
        MAX_PARALLELISM,
    );
    let inconsistent = ExecutionAttempt::new(
        ExecutionAttemptId::new(101),
        TaskId::new(OperatorId::new(1), 1),
        2,
        MAX_PARALLELISM,
    );
    let bystander = ExecutionAttempt::new(
        ExecutionAttemptId::new(102),
        TaskId::new(OperatorId::new(2), 0),
        1,
        MAX_PARALLELISM,
    );
    let attempts = vec![good, inconsistent, bystander];

    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &good))
        .unwrap();

    let err = coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &inconsistent))
        .unwrap_err();
    assert!(err.to_string().contains("out of range"));

    // The failed ack left the checkpoint one acknowledger short: the last
    // attempt's ack must not promote it with a fragment missing.
    assert_eq!(
        coordinator
            .receive_acknowledge(ack_for(barrier.checkpoint_id, &bystander))
            .unwrap(),
        AckResponse::Progress
    );
    assert_eq!(coordinator.num_pending(), 1);
    assert!(coordinator.latest_completed().is_none());
}

#[test]
fn test_partial_acknowledgement_is_never_promoted() {
    let mut coordinator = coordinator(
        CheckpointConfig::default().with_max_concurrent_checkpoints(2),
    );
    let attempts = attempts(3);

    // Two of three subtasks acknowledge, the third declines: nothing of the
    // checkpoint survives.
    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
        .unwrap();
    coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[1]))
        .unwrap();
    assert!(coordinator.receive_decline(&DeclineCheckpoint {
        checkpoint_id: barrier.checkpoint_id,
        task_id: attempts[2].task_id,
        attempt_id: attempts[2].attempt_id,
        reason: "snapshot failed".into(),
    }));
    assert!(coordinator.latest_completed().is_none());

    // The next attempt completes normally.
    let next = complete_one(&mut coordinator, &attempts);
    assert_eq!(next, barrier.checkpoint_id + 1);
    assert_eq!(coordinator.latest_completed().unwrap().checkpoint_id, next);
}

#[test]
fn test_master_state_travels_with_the_checkpoint() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(1);

    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    assert!(coordinator.add_master_state(
        barrier.checkpoint_id,
        MasterState::new("source-offsets", vec![4, 2]),
    ));
    // Unknown ids are rejected rather than silently collected.
    assert!(!coordinator.add_master_state(99, MasterState::new("source-offsets", vec![0])));

    coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
        .unwrap();

    let completed = coordinator.latest_completed().unwrap();
    assert_eq!(completed.master_states.len(), 1);
    assert_eq!(completed.master_states[0].name, "source-offsets");
    assert_eq!(completed.master_states[0].bytes, vec![4, 2]);
}

#[test]
fn test_expiry_aborts_overdue_checkpoints() {
    let mut coordinator = coordinator(
        CheckpointConfig::default().with_checkpoint_timeout(Duration::ZERO),
    );
    let attempts = attempts(1);

    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    let expired = coordinator.expire_pending_checkpoints(Instant::now());
    assert_eq!(expired, vec![barrier.checkpoint_id]);
    assert_eq!(coordinator.num_pending(), 0);
    assert!(coordinator.was_aborted(barrier.checkpoint_id));
}

#[test]
fn test_subsumed_checkpoints_are_discarded_from_storage() {
    let storage = Arc::new(InMemoryCheckpointStorage::new());
    let mut coordinator = CheckpointCoordinator::new(
        CheckpointConfig::default().with_retention(CheckpointRetentionPolicy::RetainLast(1)),
        Arc::clone(&storage),
    );
    let attempts = attempts(1);

    complete_one(&mut coordinator, &attempts);
    complete_one(&mut coordinator, &attempts);

    assert_eq!(coordinator.completed_checkpoint_ids(), vec![2]);
    assert_eq!(storage.list().unwrap(), vec![2]);
}

#[test]
fn test_persist_failure_aborts_instead_of_advertising() {
    struct BrokenStorage;
    impl CheckpointStorage for BrokenStorage {
        fn location(&self, checkpoint_id: CheckpointId) -> String {
            format!("broken://chk-{checkpoint_id}")
        }
        fn persist(&self, _checkpoint: &CompletedCheckpoint) -> Result<()> {
            Err(anyhow!("disk full"))
        }
        fn load(&self, _checkpoint_id: CheckpointId) -> Result<CompletedCheckpoint> {
            Err(anyhow!("disk full"))
        }
        fn list(&self) -> Result<Vec<CheckpointId>> {
            Ok(Vec::new())
        }
        fn discard(&self, _checkpoint_id: CheckpointId) -> Result<()> {
            Ok(())
        }
    }

    let mut coordinator =
        CheckpointCoordinator::new(CheckpointConfig::default(), Arc::new(BrokenStorage));
    let attempts = attempts(1);

    let barrier = coordinator
        .trigger_checkpoint(0, &attempts, CheckpointProps::checkpoint())
        .unwrap();
    let err = coordinator
        .receive_acknowledge(ack_for(barrier.checkpoint_id, &attempts[0]))
        .unwrap_err();
    assert!(err.to_string().contains("persist"));

    assert!(coordinator.was_aborted(barrier.checkpoint_id));
    assert!(coordinator.latest_completed().is_none());
    assert_eq!(
        coordinator.take_notifications(),
        vec![CheckpointNotification::Aborted(barrier.checkpoint_id)]
    );
}

#[test]
fn test_restore_with_no_checkpoint_is_a_fresh_start() {
    let coordinator = coordinator(CheckpointConfig::default());
    let vertices = vec![ExecutionVertex::new(OperatorId::new(1), 2, MAX_PARALLELISM)];
    assert!(coordinator.restore_latest(&vertices, false).unwrap().is_none());
}

#[test]
fn test_restore_at_same_parallelism() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(2);
    let checkpoint_id = complete_one(&mut coordinator, &attempts);

    let vertices = vec![ExecutionVertex::new(OperatorId::new(1), 2, MAX_PARALLELISM)];
    let plan = coordinator.restore_latest(&vertices, false).unwrap().unwrap();

    assert_eq!(plan.checkpoint_id, checkpoint_id);
    assert_eq!(plan.assignments.len(), 2);
    for idx in 0..2 {
        let state = &plan.assignments[&TaskId::new(OperatorId::new(1), idx)];
        assert_eq!(state.managed_keyed.len(), 1);
    }
}

#[test]
fn test_restore_rescales_keyed_state_by_range() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(2);
    complete_one(&mut coordinator, &attempts);

    // Scale from 2 to 4 subtasks: every new subtask's target range overlaps
    // exactly one recorded handle.
    let vertices = vec![ExecutionVertex::new(OperatorId::new(1), 4, MAX_PARALLELISM)];
    let plan = coordinator.restore_latest(&vertices, false).unwrap().unwrap();

    assert_eq!(plan.assignments.len(), 4);
    for idx in 0..4 {
        let state = &plan.assignments[&TaskId::new(OperatorId::new(1), idx)];
        let target = KeyGroupRange::for_operator_index(MAX_PARALLELISM, 4, idx);
        for handle in &state.managed_keyed {
            assert!(handle.key_group_range().unwrap().intersect(&target).is_some());
        }
        assert!(!state.managed_keyed.is_empty());
    }
}

#[test]
fn test_restore_plan_prioritizes_against_local_cache() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(1);
    complete_one(&mut coordinator, &attempts);

    let vertices = vec![ExecutionVertex::new(OperatorId::new(1), 1, MAX_PARALLELISM)];
    let plan = coordinator.restore_latest(&vertices, false).unwrap().unwrap();

    // The task kept a local copy covering the same key-group range.
    let task_id = TaskId::new(OperatorId::new(1), 0);
    let range = KeyGroupRange::for_operator_index(MAX_PARALLELISM, 1, 0);
    let mut cache = crate::state::LocalStateCache::new();
    cache.register(
        task_id,
        OperatorSubtaskState::empty().with_managed_keyed(StateObjectCollection::single(
            StateHandle::keyed(777, range, "local/keyed-0", 256),
        )),
    );

    let prioritized = plan.prioritize(&cache);
    let candidates = prioritized[&task_id].managed_keyed();
    assert_eq!(candidates.len(), 2);
    assert_eq!(candidates[0].as_slice()[0].handle_id(), 777);
}

#[test]
fn test_restore_rejects_dropped_operator_state_unless_allowed() {
    let mut coordinator = coordinator(CheckpointConfig::default());
    let attempts = attempts(1);
    complete_one(&mut coordinator, &attempts);

    // The new graph no longer contains operator 1.
    let vertices = vec![ExecutionVertex::new(OperatorId::new(2), 1, MAX_PARALLELISM)];

    let err = coordinator.restore_latest(&vertices, false).unwrap_err();
    assert!(err.to_string().contains("not running"));

    let plan = coordinator.restore_latest(&vertices, true).unwrap().unwrap();
    assert!(plan.assignments.is_empty());
}
