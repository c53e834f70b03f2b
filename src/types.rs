use serde::{Deserialize, Serialize};

/// Event time in milliseconds since epoch.
pub type EventTime = i64;

/// Unique identifier for checkpoint barriers.
///
/// Allocated by the coordinator, monotonically increasing, never reused.
pub type CheckpointId = u64;

/// How a subtask consumes barriers for a checkpoint.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AlignmentKind {
    /// Block barrier-bearing channels until every input has delivered the barrier.
    #[default]
    Aligned,
    /// Snapshot on first barrier sighting and capture in-flight channel data.
    Unaligned,
}

/// What kind of snapshot a checkpoint produces.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CheckpointKind {
    /// Periodic checkpoint, subject to retention/subsumption.
    #[default]
    Checkpoint,
    /// User-requested savepoint. Never subsumed by later checkpoints.
    Savepoint,
}

/// Per-checkpoint behavior carried on every barrier.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CheckpointOptions {
    pub alignment: AlignmentKind,
    pub kind: CheckpointKind,
}

impl CheckpointOptions {
    /// Options for an aligned periodic checkpoint.
    pub fn aligned() -> Self {
        Self::default()
    }

    /// Options for an unaligned periodic checkpoint.
    pub fn unaligned() -> Self {
        Self {
            alignment: AlignmentKind::Unaligned,
            kind: CheckpointKind::Checkpoint,
        }
    }

    /// Options for a savepoint. Savepoints always align.
    pub fn savepoint() -> Self {
        Self {
            alignment: AlignmentKind::Aligned,
            kind: CheckpointKind::Savepoint,
        }
    }

    pub fn is_unaligned(&self) -> bool {
        self.alignment == AlignmentKind::Unaligned
    }

    pub fn is_savepoint(&self) -> bool {
        self.kind == CheckpointKind::Savepoint
    }
}

/// A record in the stream, carrying user data and optional event time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamRecord<T> {
    pub value: T,
    pub timestamp: Option<EventTime>,
}

impl<T> StreamRecord<T> {
    /// Create a record with no event time.
    pub fn new(value: T) -> Self {
        Self {
            value,
            timestamp: None,
        }
    }

    /// Create a record with an explicit event time.
    pub fn with_timestamp(value: T, timestamp: EventTime) -> Self {
        Self {
            value,
            timestamp: Some(timestamp),
        }
    }
}

/// Watermark indicates that no elements with timestamp <= this value will arrive.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark {
    pub timestamp: EventTime,
}

impl Watermark {
    /// Create a new watermark at the given timestamp.
    pub fn new(timestamp: EventTime) -> Self {
        Self { timestamp }
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({}ms)", self.timestamp)
    }
}

/// Checkpoint barrier demarcating a snapshot boundary on a channel.
///
/// Barriers travel in strict order within a channel relative to data records:
/// a barrier never overtakes earlier data and is never reordered per channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Barrier {
    pub checkpoint_id: CheckpointId,
    pub timestamp: EventTime,
    pub options: CheckpointOptions,
}

impl Barrier {
    /// Create a new aligned checkpoint barrier with the given ID.
    pub fn new(checkpoint_id: CheckpointId) -> Self {
        Self {
            checkpoint_id,
            timestamp: 0,
            options: CheckpointOptions::default(),
        }
    }

    /// Create a new checkpoint barrier with explicit timestamp.
    pub fn with_timestamp(checkpoint_id: CheckpointId, timestamp: EventTime) -> Self {
        Self {
            checkpoint_id,
            timestamp,
            options: CheckpointOptions::default(),
        }
    }

    /// Create a barrier with explicit timestamp and options.
    pub fn with_options(
        checkpoint_id: CheckpointId,
        timestamp: EventTime,
        options: CheckpointOptions,
    ) -> Self {
        Self {
            checkpoint_id,
            timestamp,
            options,
        }
    }

    pub fn is_unaligned(&self) -> bool {
        self.options.is_unaligned()
    }
}

/// In-band signal that the coordinator has aborted a checkpoint.
///
/// Processing a cancel marker twice for the same ID is a no-op.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CancelMarker {
    pub checkpoint_id: CheckpointId,
}

impl CancelMarker {
    pub fn new(checkpoint_id: CheckpointId) -> Self {
        Self { checkpoint_id }
    }
}

/// The fundamental unit flowing through the stream processing pipeline.
/// Everything is a stream element: data records, watermarks, barriers,
/// cancel markers, and end markers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StreamElement<T> {
    /// User data record.
    Record(StreamRecord<T>),
    /// Watermark for event time progress tracking.
    Watermark(Watermark),
    /// Checkpoint barrier for exactly-once snapshots.
    CheckpointBarrier(Barrier),
    /// Coordinator-side abort of an in-flight checkpoint.
    CancelMarker(CancelMarker),
    /// End of bounded stream.
    End,
}

impl<T> StreamElement<T> {
    /// Create a record element with no timestamp.
    pub fn record(value: T) -> Self {
        Self::Record(StreamRecord::new(value))
    }

    /// Create a record element with a timestamp.
    pub fn timestamped_record(value: T, timestamp: EventTime) -> Self {
        Self::Record(StreamRecord::with_timestamp(value, timestamp))
    }

    /// Create a watermark element.
    pub fn watermark(timestamp: EventTime) -> Self {
        Self::Watermark(Watermark::new(timestamp))
    }

    /// Create an aligned checkpoint barrier element.
    pub fn barrier(checkpoint_id: CheckpointId) -> Self {
        Self::CheckpointBarrier(Barrier::new(checkpoint_id))
    }

    /// Create a checkpoint barrier element with explicit timestamp.
    pub fn barrier_with_timestamp(checkpoint_id: CheckpointId, timestamp: EventTime) -> Self {
        Self::CheckpointBarrier(Barrier::with_timestamp(checkpoint_id, timestamp))
    }

    /// Create a barrier element with explicit options.
    pub fn barrier_with_options(
        checkpoint_id: CheckpointId,
        timestamp: EventTime,
        options: CheckpointOptions,
    ) -> Self {
        Self::CheckpointBarrier(Barrier::with_options(checkpoint_id, timestamp, options))
    }

    /// Create a cancel marker element.
    pub fn cancel(checkpoint_id: CheckpointId) -> Self {
        Self::CancelMarker(CancelMarker::new(checkpoint_id))
    }

    /// Returns true for data records.
    pub fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }
}

/// Trait bound for types that can flow through the stream.
/// All user data types must satisfy this.
pub trait StreamData: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}

// Blanket implementation: any type satisfying the bounds is StreamData.
impl<T> StreamData for T where T: Send + Clone + Serialize + for<'de> Deserialize<'de> + 'static {}
