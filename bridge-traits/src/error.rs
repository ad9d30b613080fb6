use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Transient, rate-limited class. Callers retry with backoff.
    #[error("Resource busy: {0}")]
    Busy(String),

    #[error("Access denied by platform authorization: {0}")]
    NotAuthorized(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether the error belongs to the transient/rate-limited class.
    pub fn is_busy(&self) -> bool {
        matches!(self, BridgeError::Busy(_))
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
