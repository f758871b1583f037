use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DatabaseError {
    #[error("Store request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Conditional write matched no row: {0}")]
    StaleWrite(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode store response: {0}")]
    Decode(String),
}

impl DatabaseError {
    /// Timeouts and transport failures; the whole operation may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, DatabaseError::Timeout(_) | DatabaseError::Unavailable(_))
    }
}

/// Bound a store call by `duration`, reporting an elapsed timer as
/// `DatabaseError::Timeout`.
pub async fn with_timeout<T, F>(duration: Duration, operation: F) -> Result<T, DatabaseError>
where
    F: Future<Output = Result<T, DatabaseError>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => Err(DatabaseError::Timeout(duration)),
    }
}
