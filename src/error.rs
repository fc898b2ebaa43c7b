use thiserror::Error;

/// Standard error type for the Mazurka dispatch core.
///
/// Request-scoped failures all travel through this one channel: a chain
/// element returns it, the dispatcher logs it and hands it to the error view.
/// Configuration mistakes (bad method casing, duplicate registrations) are
/// not errors — they panic at startup before any traffic is served.
#[derive(Debug, Error)]
pub enum MazurkaError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl MazurkaError {
    /// The HTTP status code this error maps to when the failing chain
    /// element did not set one itself.
    pub fn status_code(&self) -> u16 {
        match self {
            MazurkaError::BadRequest(_) => 400,
            MazurkaError::Unauthorized(_) => 401,
            MazurkaError::Forbidden(_) => 403,
            MazurkaError::NotFound(_) => 404,
            MazurkaError::Timeout(_) => 408,
            MazurkaError::Internal(_) => 500,
            MazurkaError::Serialize(_) => 500,
            MazurkaError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => 404,
            MazurkaError::Io(_) => 500,
        }
    }
}

pub type MazurkaResult<T> = Result<T, MazurkaError>;
