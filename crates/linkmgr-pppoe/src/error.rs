//! Error types for the PPPoE link controller.
//!
//! Defines `LinkError`, the error taxonomy surfaced to API callers.
//! External process and collaborator failures inside the event loops are
//! never returned through it; they become detailed-state transitions.

use linkmgr_core::{
    domain::{CallerId, DomainError},
    ports::Permission,
};
use thiserror::Error;

/// Errors returned by the link manager API
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("permission denied: {caller} lacks {permission}")]
    PermissionDenied {
        caller: CallerId,
        permission: Permission,
    },

    #[error("resource exhausted: more than {max} active keep-awake locks")]
    ResourceExhausted { max: usize },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("external process failure: {0}")]
    ExternalProcessFailure(String),

    #[error("configuration parse failure: {0}")]
    ConfigurationParseFailure(#[from] DomainError),

    #[error("remote unavailable: {0}")]
    RemoteUnavailable(String),
}

/// Result type for link manager operations
pub type Result<T> = std::result::Result<T, LinkError>;
