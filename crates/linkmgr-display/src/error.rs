//! Error types for the display controller.

use std::path::PathBuf;

use linkmgr_core::{
    domain::{CallerId, DomainError},
    ports::Permission,
};
use thiserror::Error;

/// Errors returned by the display API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    #[error("permission denied: {caller} lacks {permission}")]
    PermissionDenied {
        caller: CallerId,
        permission: Permission,
    },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("configuration parse failure: {0}")]
    ConfigurationParseFailure(String),

    #[error("config file {}: {reason}", path.display())]
    ConfigFile { path: PathBuf, reason: String },

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
}

/// Result type for display operations
pub type Result<T> = std::result::Result<T, DisplayError>;

impl From<DomainError> for DisplayError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidDisplayMode { .. } => {
                DisplayError::ConfigurationParseFailure(err.to_string())
            }
            other => DisplayError::InvariantViolation(other.to_string()),
        }
    }
}
