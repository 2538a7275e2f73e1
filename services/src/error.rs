use sea_orm::DbErr;
use thiserror::Error;

/// Expected, recoverable outcomes of the attendance engine.
///
/// A rejected scan is a normal business event: it is returned as a typed
/// value, shown to the user with its reason, and (where a record makes sense)
/// persisted to the ledger. Only `Storage` represents infrastructure failure.
#[derive(Debug, Error)]
pub enum AttendanceError {
    #[error("You are not enrolled in this class")]
    NotEnrolled,

    #[error("This session is not accepting scans right now")]
    SessionNotActive,

    #[error("The scanned code is not valid for this session")]
    InvalidToken,

    #[error("The scanned code has expired; ask the lecturer to refresh it")]
    TokenExpired,

    #[error("Attendance for this session was already recorded")]
    DuplicateScan,

    #[error("You are outside the allowed area for this session; move closer to the room")]
    LocationMismatch {
        /// Measured distance from the session location, when coordinates were
        /// supplied at all.
        distance_m: Option<f64>,
        radius_m: f64,
    },

    #[error("An active session already exists for this class today")]
    AlreadyActive,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Storage unavailable: {0}")]
    Storage(#[from] DbErr),
}

impl AttendanceError {
    /// Stable machine-readable kind, carried alongside the human-readable
    /// message so clients can render targeted guidance.
    pub fn kind(&self) -> &'static str {
        match self {
            AttendanceError::NotEnrolled => "NOT_ENROLLED",
            AttendanceError::SessionNotActive => "SESSION_NOT_ACTIVE",
            AttendanceError::InvalidToken => "INVALID_TOKEN",
            AttendanceError::TokenExpired => "TOKEN_EXPIRED",
            AttendanceError::DuplicateScan => "DUPLICATE_SCAN",
            AttendanceError::LocationMismatch { .. } => "LOCATION_MISMATCH",
            AttendanceError::AlreadyActive => "ALREADY_ACTIVE",
            AttendanceError::SessionNotFound => "SESSION_NOT_FOUND",
            AttendanceError::Storage(_) => "STORAGE_UNAVAILABLE",
        }
    }
}
