use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{BookingStatus, Minutes, Reservation, Span};
use crate::store::StoreError;

#[derive(Debug)]
pub enum EngineError {
    /// Malformed, missing or illogical input.
    Validation(String),
    PastDate(NaiveDate),
    OutOfHours {
        start: Minutes,
        end: Minutes,
    },
    Conflict {
        conflicts: Vec<Reservation>,
        suggestions: Vec<Span>,
    },
    NotFound(Ulid),
    Unauthorized(Ulid),
    InvalidState {
        id: Ulid,
        status: BookingStatus,
    },
    /// Storage failure, passed through untouched.
    Store(StoreError),
}

impl EngineError {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::PastDate(_) => "past_date",
            EngineError::OutOfHours { .. } => "out_of_hours",
            EngineError::Conflict { .. } => "conflict",
            EngineError::NotFound(_) => "not_found",
            EngineError::Unauthorized(_) => "unauthorized",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::Store(_) => "store",
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid request: {msg}"),
            EngineError::PastDate(date) => write!(f, "cannot book a past date: {date}"),
            EngineError::OutOfHours { start, end } => write!(
                f,
                "{:02}:{:02}-{:02}:{:02} is outside operating hours 06:00-23:00",
                start / 60,
                start % 60,
                end / 60,
                end % 60
            ),
            EngineError::Conflict {
                conflicts,
                suggestions,
            } => {
                write!(f, "slot conflicts with {} reservation(s)", conflicts.len())?;
                if let Some(first) = suggestions.first() {
                    write!(f, "; next available {first}")?;
                }
                Ok(())
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Unauthorized(id) => write!(f, "not the owner of booking {id}"),
            EngineError::InvalidState { id, status } => {
                write!(f, "booking {id} is {status} and cannot be changed")
            }
            EngineError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        EngineError::Store(e)
    }
}
