use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid date/time format: '{0}' (expected YYYY-MM-DD HH:MM)")]
    InvalidTimeFormat(String),

    #[error("end time {end} must be after start time {start}")]
    InvalidInterval { start: String, end: String },

    #[error("facility '{0}' already exists")]
    DuplicateFacility(String),

    #[error("facility '{0}' does not exist")]
    FacilityNotFound(String),

    #[error("no matching booking found for '{user}' on facility '{facility}'")]
    BookingNotFound { facility: String, user: String },

    #[error("time slot overlaps with an existing booking by {user}")]
    OverlapConflict { user: String },

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
}
