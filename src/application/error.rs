// Service error taxonomy
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Credential missing or not matching on the ingest path.
    #[error("invalid API key")]
    Unauthorized,

    /// Malformed payload or query parameter.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The store could not complete a read or write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn store(err: anyhow::Error) -> Self {
        Self::StoreUnavailable(format!("{:#}", err))
    }
}
