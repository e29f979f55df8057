use thiserror::Error;

/// Failures the domain reports to its callers. Absent optional data is never
/// one of these; it shows up as `None` instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MedicationError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("not found")]
    NotFound,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),
}
