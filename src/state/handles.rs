use serde::{Deserialize, Serialize};

/// Unique identity of a state handle.
///
/// Restore reconciliation compares handles by identity, not by content:
/// two handles pointing at byte-identical state in different locations are
/// still different handles.
pub type StateHandleId = u64;

/// A contiguous, inclusive range of key groups.
///
/// Key groups are the unit of keyed-state redistribution on rescale: the
/// keyspace is hashed into `max_parallelism` groups, and each subtask owns
/// a contiguous range of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyGroupRange {
    start: u32,
    end: u32,
}

impl KeyGroupRange {
    /// Create a range covering `start..=end`.
    ///
    /// # Panics
    ///
    /// Panics if `start > end`.
    pub fn new(start: u32, end: u32) -> Self {
        assert!(start <= end, "key group range start {start} > end {end}");
        Self { start, end }
    }

    /// The range owned by `operator_index` when an operator runs with
    /// `parallelism` out of `max_parallelism` key groups.
    pub fn for_operator_index(
        max_parallelism: usize,
        parallelism: usize,
        operator_index: usize,
    ) -> Self {
        debug_assert!(parallelism > 0 && parallelism <= max_parallelism);
        debug_assert!(operator_index < parallelism);
        let start = (operator_index * max_parallelism) / parallelism;
        let end = ((operator_index + 1) * max_parallelism) / parallelism - 1;
        Self::new(start as u32, end as u32)
    }

    pub fn start(&self) -> u32 {
        self.start
    }

    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn num_key_groups(&self) -> u32 {
        self.end - self.start + 1
    }

    pub fn contains(&self, key_group: u32) -> bool {
        key_group >= self.start && key_group <= self.end
    }

    /// The overlap of two ranges, if any.
    pub fn intersect(&self, other: &KeyGroupRange) -> Option<KeyGroupRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if start <= end {
            Some(KeyGroupRange { start, end })
        } else {
            None
        }
    }
}

impl std::fmt::Display for KeyGroupRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// An opaque reference to persisted state bytes.
///
/// Keyed handles additionally carry the key-group range they cover; operator
/// handles do not, so subtype dispatch is an explicit enum match rather than
/// runtime type inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StateHandle {
    /// Operator (non-keyed) state.
    Operator {
        handle_id: StateHandleId,
        location: String,
        size_bytes: u64,
    },
    /// Keyed state covering a key-group range.
    Keyed {
        handle_id: StateHandleId,
        key_group_range: KeyGroupRange,
        location: String,
        size_bytes: u64,
    },
}

impl StateHandle {
    pub fn operator(handle_id: StateHandleId, location: impl Into<String>, size_bytes: u64) -> Self {
        Self::Operator {
            handle_id,
            location: location.into(),
            size_bytes,
        }
    }

    pub fn keyed(
        handle_id: StateHandleId,
        key_group_range: KeyGroupRange,
        location: impl Into<String>,
        size_bytes: u64,
    ) -> Self {
        Self::Keyed {
            handle_id,
            key_group_range,
            location: location.into(),
            size_bytes,
        }
    }

    pub fn handle_id(&self) -> StateHandleId {
        match self {
            Self::Operator { handle_id, .. } | Self::Keyed { handle_id, .. } => *handle_id,
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::Operator { location, .. } | Self::Keyed { location, .. } => location,
        }
    }

    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::Operator { size_bytes, .. } | Self::Keyed { size_bytes, .. } => *size_bytes,
        }
    }

    /// The key-group range for keyed handles, `None` for operator handles.
    pub fn key_group_range(&self) -> Option<KeyGroupRange> {
        match self {
            Self::Keyed {
                key_group_range, ..
            } => Some(*key_group_range),
            Self::Operator { .. } => None,
        }
    }

    /// Identity comparison: same underlying state object.
    pub fn same_instance(&self, other: &StateHandle) -> bool {
        self.handle_id() == other.handle_id()
    }
}

/// Ordered collection of opaque state handles for one state category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateObjectCollection {
    handles: Vec<StateHandle>,
}

impl StateObjectCollection {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(handles: Vec<StateHandle>) -> Self {
        Self { handles }
    }

    pub fn single(handle: StateHandle) -> Self {
        Self {
            handles: vec![handle],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether the collection holds exactly one handle. Operator-state
    /// substitution during reconciliation is only defined for this case.
    pub fn has_exactly_one(&self) -> bool {
        self.handles.len() == 1
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StateHandle> {
        self.handles.iter()
    }

    pub fn as_slice(&self) -> &[StateHandle] {
        &self.handles
    }

    pub fn push(&mut self, handle: StateHandle) {
        self.handles.push(handle);
    }

    pub fn total_size_bytes(&self) -> u64 {
        self.handles.iter().map(StateHandle::size_bytes).sum()
    }
}

impl FromIterator<StateHandle> for StateObjectCollection {
    fn from_iter<I: IntoIterator<Item = StateHandle>>(iter: I) -> Self {
        Self {
            handles: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a StateObjectCollection {
    type Item = &'a StateHandle;
    type IntoIter = std::slice::Iter<'a, StateHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.handles.iter()
    }
}
