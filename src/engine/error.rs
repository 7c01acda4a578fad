use chrono::NaiveDate;

use crate::model::{IntervalId, ReservationId, RoomId};

/// Coarse error category callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input. Fix the request; never retry as-is.
    Validation,
    /// The write would double-book a room. Re-search and pick other dates or rooms.
    Overlap,
    /// Operator tried to lift a reservation through the calendar.
    ForbiddenEdit,
    NotFound,
    /// Transport or transaction failure. Nothing was written; safe to retry.
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Overlap => "overlap",
            ErrorKind::ForbiddenEdit => "forbidden_edit",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Storage => "storage",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid date range [{start}, {end}): start must be before end")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("unknown room: {0}")]
    UnknownRoom(RoomId),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid month {year}-{month}")]
    InvalidMonth { year: i32, month: u32 },
    #[error("room already exists with a different name: {0}")]
    RoomExists(RoomId),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("room {room_id} is already occupied by interval {conflicting}")]
    Overlap { room_id: RoomId, conflicting: IntervalId },
    #[error("interval {interval_id} belongs to reservation {reservation_id}; delete the reservation instead")]
    ForbiddenEdit {
        interval_id: IntervalId,
        reservation_id: ReservationId,
    },
    #[error("reservation not found: {0}")]
    ReservationNotFound(ReservationId),
    #[error("interval {interval_id} not found on room {room_id}")]
    IntervalNotFound { room_id: RoomId, interval_id: IntervalId },
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidRange { .. }
            | EngineError::UnknownRoom(_)
            | EngineError::MissingField(_)
            | EngineError::InvalidMonth { .. }
            | EngineError::RoomExists(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::Overlap { .. } => ErrorKind::Overlap,
            EngineError::ForbiddenEdit { .. } => ErrorKind::ForbiddenEdit,
            EngineError::ReservationNotFound(_) | EngineError::IntervalNotFound { .. } => {
                ErrorKind::NotFound
            }
            EngineError::Storage(_) => ErrorKind::Storage,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Storage
    }
}
