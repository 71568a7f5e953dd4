use sea_orm::error::DbErr;

/// Error type shared by every core service.
///
/// All mutating operations are all-or-nothing: any variant returned from
/// partway through a multi-step operation means the surrounding database
/// transaction was rolled back and no write is visible.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    #[error("Event delivery error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Maps storage errors, turning a lost-update report into a
    /// `ConcurrencyConflict` the caller may retry.
    pub fn db_error(err: DbErr) -> Self {
        match err {
            DbErr::RecordNotUpdated => ServiceError::ConcurrencyConflict(
                "row changed under us; retry the operation".to_string(),
            ),
            other => ServiceError::DatabaseError(other),
        }
    }

    /// The core never retries on its own; callers use this to decide.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::ConcurrencyConflict(_))
    }
}
