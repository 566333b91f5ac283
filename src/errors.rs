use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

/// Typed failures surfaced by every command and query in the engine.
///
/// Reflow itself never returns an error: infeasible schedules come back as a
/// conflict list instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Series not found: {0}")]
    SeriesNotFound(Uuid),
    #[error("Completion not found: {0}")]
    CompletionNotFound(Uuid),
    #[error("Completion already logged for series {series_id} on {instance_date}")]
    DuplicateCompletion {
        series_id: Uuid,
        instance_date: NaiveDate,
    },
    #[error("Completion end time precedes start time")]
    InvalidTimeRange,
    #[error("Series {0} already has a parent link")]
    AlreadyLinked(Uuid),
    #[error("A series cannot be linked to itself")]
    SelfLink,
    #[error("Link would introduce a cycle")]
    CycleDetected,
    #[error("Link would exceed the maximum chain depth of {0}")]
    ChainDepthExceeded(usize),
    #[error("Series {0} has no parent link")]
    NoLink(Uuid),
    #[error("Series {0} still has linked children")]
    LinkedChildrenExist(Uuid),
    #[error("Series {0} is locked")]
    Locked(Uuid),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Invalid range: {0}")]
    InvalidRange(String),
    #[error("No cancellation to restore for series {series_id} on {instance_date}")]
    RestoreNotCancelled {
        series_id: Uuid,
        instance_date: NaiveDate,
    },
    #[error("Cannot reschedule the cancelled instance of series {series_id} on {instance_date}")]
    RescheduleCancelled {
        series_id: Uuid,
        instance_date: NaiveDate,
    },
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
