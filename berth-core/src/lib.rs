pub mod booking;
pub mod clock;
pub mod inventory;
pub mod repository;
pub mod schedule;
pub mod search;
pub mod types;

use serde::{Deserialize, Serialize};

pub use booking::{Booking, CancellationReason, CancellationRecord, ContactInfo, Passenger};
pub use clock::{Clock, FixedClock, SystemClock};
pub use inventory::{CoachInventory, QueueEntry, QuotaPool, RacPool, SeatInventory};
pub use repository::{AvailabilityCache, EventSink, InventoryLock, InventoryStore, TrainCatalog};
pub use schedule::{Route, Stop, Train};
pub use types::{
    BerthType, BookingStatus, CoachClass, Gender, InventoryKey, PassengerStatus, Pnr, Quota,
    SeatAssignment,
};

/// Stable, serializable error category handed to the collaborator layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    NotFound,
    CapacityExhausted,
    Conflict,
    InvariantViolation,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFoundError(String),
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),
    #[error("Inventory busy: {0}")]
    ConflictError(String),
    #[error("Invariant violated: {0}")]
    InvariantViolation(String),
    #[error("Storage failure: {0}")]
    StorageError(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ValidationError(_) => ErrorKind::Validation,
            CoreError::NotFoundError(_) => ErrorKind::NotFound,
            CoreError::CapacityExhausted(_) => ErrorKind::CapacityExhausted,
            CoreError::ConflictError(_) => ErrorKind::Conflict,
            CoreError::InvariantViolation(_) => ErrorKind::InvariantViolation,
            CoreError::StorageError(_) => ErrorKind::Internal,
        }
    }

    /// Only lock contention is worth retrying with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::ConflictError(_))
    }

    pub fn to_body(&self) -> ErrorBody {
        let message = match self {
            CoreError::ValidationError(m)
            | CoreError::NotFoundError(m)
            | CoreError::CapacityExhausted(m)
            | CoreError::ConflictError(m)
            | CoreError::InvariantViolation(m)
            | CoreError::StorageError(m) => m.clone(),
        };
        ErrorBody { kind: self.kind(), message }
    }
}

/// The `{kind, message}` pair surfaced for every failed call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub kind: ErrorKind,
    pub message: String,
}

pub type CoreResult<T> = Result<T, CoreError>;
