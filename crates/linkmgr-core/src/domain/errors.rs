//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including invalid state transitions, malformed display modes and
//! slot bookkeeping violations.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// A display mode string could not be parsed
    #[error("Invalid display mode '{mode}': {reason}")]
    InvalidDisplayMode {
        /// The offending mode string
        mode: String,
        /// What was wrong with it
        reason: String,
    },

    /// A framebuffer id outside `[0, max_framebuffers)`
    #[error("Framebuffer {fb} out of range (max {max})")]
    FramebufferOutOfRange {
        /// The requested framebuffer id
        fb: usize,
        /// Number of framebuffer slots
        max: usize,
    },

    /// A display slot outside `[0, max_displays)`
    #[error("Display slot {slot} out of range (max {max})")]
    DisplayOutOfRange {
        /// The requested display slot
        slot: usize,
        /// Number of display slots
        max: usize,
    },

    /// Every display slot is already mapped to a framebuffer
    #[error("No free display slot for framebuffer {0}")]
    NoFreeDisplaySlot(usize),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
