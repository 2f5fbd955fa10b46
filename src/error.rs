//! Unified error handling for the sync engine.
//!
//! Every failure the engine can surface maps into [`SyncError`]. Variants carry
//! owned strings rather than source errors so that an error can be cloned into
//! every [`crate::SyncEvent`] subscriber.

use std::time::Duration;

use thiserror::Error;

/// Unified error type for sync operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyncError {
    /// No connectivity, connection reset, DNS failure
    #[error("Network error: {message}")]
    Network { message: String },

    /// Remote call exceeded the configured timeout
    #[error("Request timed out after {after:?}")]
    Timeout { after: Duration },

    /// Remote answered with a non-success status
    #[error("HTTP error ({status}): {message}")]
    Http { status: u16, message: String },

    /// Response or cache payload could not be decoded
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// Key/value store failure
    #[error("Cache error: {message}")]
    Cache { message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Generic internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Whether retrying the same call later can reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Network { .. } | SyncError::Timeout { .. } => true,
            SyncError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        SyncError::Config {
            message: message.into(),
        }
    }

    pub(crate) fn cache(message: impl Into<String>) -> Self {
        SyncError::Cache {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(e: rusqlite::Error) -> Self {
        SyncError::cache(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for SyncError {
    fn from(e: rusqlite_migration::Error) -> Self {
        SyncError::cache(format!("migration failed: {}", e))
    }
}

impl From<rmp_serde::encode::Error> for SyncError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        SyncError::cache(format!("encode failed: {}", e))
    }
}

impl From<rmp_serde::decode::Error> for SyncError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        SyncError::Decode {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Decode {
            message: e.to_string(),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            SyncError::Http {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else if e.is_decode() {
            SyncError::Decode {
                message: e.to_string(),
            }
        } else {
            SyncError::Network {
                message: e.to_string(),
            }
        }
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Internal {
            message: format!("task failed: {}", e),
        }
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
