//! Crate-level error type.

use thiserror::Error;

use crate::auth::AuthError;

/// Primary error type for schwab-auth operations.
#[derive(Error, Debug)]
pub enum SchwabError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SchwabError {
    /// Whether retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(err) => err.is_transient(),
            _ => false,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SchwabError>;
