// Access control gate for the write path
use crate::application::error::ServiceError;
use subtle::ConstantTimeEq;

/// Header carrying the shared ingest credential.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Holds the single process-wide ingest credential.
#[derive(Clone)]
pub struct ApiKeyGate {
    expected: Vec<u8>,
}

impl ApiKeyGate {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into().into_bytes(),
        }
    }

    /// Checks the presented credential in constant time.
    pub fn authorize(&self, presented: Option<&str>) -> Result<(), ServiceError> {
        let Some(presented) = presented else {
            tracing::warn!("Rejected ingest without {} header", API_KEY_HEADER);
            return Err(ServiceError::Unauthorized);
        };

        if bool::from(presented.as_bytes().ct_eq(&self.expected)) {
            Ok(())
        } else {
            tracing::warn!("Rejected ingest with mismatched API key");
            Err(ServiceError::Unauthorized)
        }
    }
}

impl std::fmt::Debug for ApiKeyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyGate").finish_non_exhaustive()
    }
}
