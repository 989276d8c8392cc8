use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use uuid::Uuid;

use crate::db::DatabaseError;

/// Domain error taxonomy. Every variant carries enough context for the
/// caller to render an actionable message; infrastructure failures pass
/// through `Database` and are the only retryable kind.
#[derive(Error, Debug)]
pub enum DomainError {
    #[error("doctor {doctor_id} is already booked on {date} at {time}")]
    SchedulingConflict {
        doctor_id: Uuid,
        date: NaiveDate,
        time: NaiveTime,
    },

    #[error("illegal {dimension} transition: {from} -> {to}")]
    IllegalTransition {
        dimension: &'static str,
        from: &'static str,
        to: &'static str,
    },

    #[error("missing required field '{field}' for {dimension}")]
    MissingRequiredField {
        dimension: &'static str,
        field: &'static str,
    },

    #[error("appointment {appointment_id} already has an active anesthesia form")]
    AttachmentAlreadyExists { appointment_id: Uuid },

    #[error("concurrent update on {dimension} of appointment {appointment_id}, gave up after {attempts} attempts")]
    ConcurrentUpdateConflict {
        dimension: &'static str,
        appointment_id: Uuid,
        attempts: u32,
    },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl DomainError {
    /// Only infrastructure failures are worth retrying; the domain variants
    /// are terminal until the caller changes its input.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Database(DatabaseError::Sqlite(_)))
    }
}
