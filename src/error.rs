use std::time::Duration;

use thiserror::Error;

/// Message reported for an item whose credential was rejected with HTTP 401.
pub const INVALID_KEY_MESSAGE: &str = "Invalid API key - please enter a valid key";

/// Message reported when the service gives no error text of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "Image generation failed";

#[derive(Debug, Error)]
pub enum GenError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("API key required")]
    MissingCredential,
    #[error("Selected model is not available: {0}")]
    UnknownModel(String),
    #[error("{message}")]
    ServiceRejected { status: u16, message: String },
    #[error("Network error: {0}")]
    NetworkFailure(String),
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification used when deciding how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Credential,
    Service,
    Transport,
}

impl GenError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GenError::ValidationError(_) | GenError::UnknownModel(_) => ErrorKind::Validation,
            GenError::MissingCredential => ErrorKind::Credential,
            GenError::ServiceRejected { status: 401, .. } => ErrorKind::Credential,
            GenError::ServiceRejected { .. } => ErrorKind::Service,
            GenError::NetworkFailure(_) | GenError::Timeout(_) | GenError::IoError(_) => {
                ErrorKind::Transport
            }
            GenError::ConfigError(_) | GenError::SerializationError(_) => ErrorKind::Validation,
        }
    }

    /// True when the stored credential was rejected by the service.
    pub fn is_credential_rejection(&self) -> bool {
        matches!(self, GenError::ServiceRejected { status: 401, .. })
    }
}

impl From<reqwest::Error> for GenError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            GenError::NetworkFailure(format!("request timed out: {}", e))
        } else {
            GenError::NetworkFailure(e.to_string())
        }
    }
}

impl From<serde_json::Error> for GenError {
    fn from(e: serde_json::Error) -> Self {
        GenError::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GenError>;
