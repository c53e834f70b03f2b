use super::*;

#[test]
fn test_key_group_range_basics() {
    let range = KeyGroupRange::new(4, 7);
    assert_eq!(range.start(), 4);
    assert_eq!(range.end(), 7);
    assert_eq!(range.num_key_groups(), 4);
    assert!(range.contains(4));
    assert!(range.contains(7));
    assert!(!range.contains(8));
}

#[test]
#[should_panic(expected = "key group range start")]
fn test_key_group_range_rejects_inverted_bounds() {
    let _ = KeyGroupRange::new(5, 4);
}

#[test]
fn test_key_group_range_intersect() {
    let a = KeyGroupRange::new(0, 7);
    let b = KeyGroupRange::new(4, 11);
    assert_eq!(a.intersect(&b), Some(KeyGroupRange::new(4, 7)));

    let c = KeyGroupRange::new(8, 11);
    assert_eq!(a.intersect(&c), None);
}

#[test]
fn test_key_group_ranges_partition_the_keyspace() {
    // 128 key groups over 3 subtasks: contiguous, disjoint, complete.
    let max = 128;
    let parallelism = 3;
    let ranges: Vec<_> = (0..parallelism)
        .map(|idx| KeyGroupRange::for_operator_index(max, parallelism, idx))
        .collect();

    assert_eq!(ranges[0].start(), 0);
    assert_eq!(ranges[parallelism - 1].end(), (max - 1) as u32);
    for pair in ranges.windows(2) {
        assert_eq!(pair[0].end() + 1, pair[1].start());
    }
    let total: u32 = ranges.iter().map(KeyGroupRange::num_key_groups).sum();
    assert_eq!(total, max as u32);
}

#[test]
fn test_state_handle_identity_vs_equality() {
    let range = KeyGroupRange::new(0, 3);
    let a = StateHandle::keyed(1, range, "s3://bucket/a", 100);
    let b = StateHandle::keyed(2, range, "s3://bucket/a", 100);

    // Same range, same location, different identity.
    assert!(!a.same_instance(&b));
    assert!(a.same_instance(&a.clone()));
    assert_eq!(a.key_group_range(), Some(range));
}

#[test]
fn test_operator_handle_has_no_key_group_range() {
    let h = StateHandle::operator(3, "file:///tmp/op", 10);
    assert_eq!(h.key_group_range(), None);
    assert_eq!(h.size_bytes(), 10);
    assert_eq!(h.location(), "file:///tmp/op");
}

#[test]
fn test_state_object_collection() {
    let mut coll = StateObjectCollection::empty();
    assert!(coll.is_empty());
    assert!(!coll.has_exactly_one());

    coll.push(StateHandle::operator(1, "a", 5));
    assert!(coll.has_exactly_one());
    assert_eq!(coll.total_size_bytes(), 5);

    coll.push(StateHandle::operator(2, "b", 7));
    assert!(!coll.has_exactly_one());
    assert_eq!(coll.len(), 2);
    assert_eq!(coll.total_size_bytes(), 12);
}
