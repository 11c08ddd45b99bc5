//! Error Types
//!
//! Boundary error kinds for the Oracle engine. HTTP and tool layers map
//! these onto status codes / tool errors; telemetry failures never surface
//! here (they are swallowed and logged by the store).

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    /// Invalid input: empty query, out-of-range limit, bad type, missing field
    #[error("Validation error: {0}")]
    Validation(String),

    /// Thread, decision, trace, document, or file not present
    #[error("Not found: {0}")]
    NotFound(String),

    /// Duplicate learn file, illegal status transition
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Vector backend unreachable or timed out; callers degrade, never fail
    #[error("Backend degraded: {0}")]
    Backend(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Fatal startup error (corrupt store, lock contention)
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, OracleError>;

impl OracleError {
    /// True when the error should surface as an HTTP 4xx rather than 5xx.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OracleError::Validation(_) | OracleError::NotFound(_) | OracleError::Conflict(_)
        )
    }
}
