//! PPPoE link domain types
//!
//! This module defines the states the link controller moves through:
//!
//! - [`PppoeState`] - coarse enable state plus the session status codes
//!   reported to observers (`CheckConnect`, `NoAccount`, ...)
//! - [`RunState`] - run state of the underlying session process
//! - [`DetailedState`] - fine-grained connectivity status
//! - [`LinkEvent`] - tag of the last event the tracker processed
//! - [`PppoeAccount`] - opaque username/password pair
//!
//! ## Enable state machine
//!
//! ```text
//!            ┌──────────┐   enable    ┌──────────┐
//!   ┌──────► │ Disabled │ ──────────► │ Enabling │
//!   │        └──────────┘             └────┬─────┘
//!   │                                      │
//! ┌─┴─────────┐   disable    ┌─────────┐   │
//! │ Disabling │ ◄─────────── │ Enabled │ ◄─┘
//! └───────────┘              └─────────┘
//! ```

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// PppoeState
// ============================================================================

/// Coarse PPPoE state and session status codes
///
/// The numeric codes are the ones observers receive in state broadcasts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PppoeState {
    /// Being turned off
    Disabling,
    /// Off
    Disabled,
    /// Being turned on
    Enabling,
    /// On
    Enabled,
    /// Not yet known (before the service has initialised)
    Unknown,
    /// Enabled but the Ethernet link is down (or pppd exited cleanly)
    CheckConnect,
    /// Enabled but no username/password configured
    NoAccount,
    /// pppd reported the modem hung up
    ModemHungUp,
    /// pppd reported authentication failure
    AccountIncorrect,
}

impl PppoeState {
    /// Numeric code carried in broadcasts
    pub fn code(&self) -> i32 {
        match self {
            PppoeState::Disabling => 0,
            PppoeState::Disabled => 1,
            PppoeState::Enabling => 2,
            PppoeState::Enabled => 3,
            PppoeState::Unknown => 4,
            PppoeState::CheckConnect => 5,
            PppoeState::NoAccount => 6,
            PppoeState::ModemHungUp => 7,
            PppoeState::AccountIncorrect => 8,
        }
    }

    /// Parses a broadcast code
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => PppoeState::Disabling,
            1 => PppoeState::Disabled,
            2 => PppoeState::Enabling,
            3 => PppoeState::Enabled,
            4 => PppoeState::Unknown,
            5 => PppoeState::CheckConnect,
            6 => PppoeState::NoAccount,
            7 => PppoeState::ModemHungUp,
            8 => PppoeState::AccountIncorrect,
            _ => return None,
        })
    }

    /// Returns the state name as used in logs and dumps
    pub fn name(&self) -> &'static str {
        match self {
            PppoeState::Disabling => "disabling",
            PppoeState::Disabled => "disabled",
            PppoeState::Enabling => "enabling",
            PppoeState::Enabled => "enabled",
            PppoeState::Unknown => "unknown state",
            PppoeState::CheckConnect => "check connect",
            PppoeState::NoAccount => "no account",
            PppoeState::ModemHungUp => "modem hung up",
            PppoeState::AccountIncorrect => "account incorrect",
        }
    }

    /// Returns true for the session status codes that are only ever
    /// broadcast and never stored as the enable state
    pub fn is_session_status(&self) -> bool {
        matches!(
            self,
            PppoeState::CheckConnect
                | PppoeState::NoAccount
                | PppoeState::ModemHungUp
                | PppoeState::AccountIncorrect
        )
    }

    /// Checks whether the enable state may move to `target`
    pub fn can_transition_to(&self, target: &PppoeState) -> bool {
        if target.is_session_status() || self.is_session_status() {
            return false;
        }

        match (self, target) {
            (PppoeState::Unknown, PppoeState::Disabled) => true,
            (PppoeState::Unknown, PppoeState::Enabling) => true,
            (PppoeState::Unknown, PppoeState::Disabling) => true,

            (PppoeState::Disabled, PppoeState::Enabling) => true,
            (PppoeState::Enabling, PppoeState::Enabled) => true,
            (PppoeState::Enabled, PppoeState::Disabling) => true,
            (PppoeState::Disabling, PppoeState::Disabled) => true,

            // Any state can fall back to unknown
            (_, PppoeState::Unknown) => true,

            _ => false,
        }
    }

    /// Moves to `target`, rejecting edges the enable machine does not have
    pub fn transition_to(&mut self, target: PppoeState) -> Result<(), DomainError> {
        if !self.can_transition_to(&target) {
            return Err(DomainError::InvalidState {
                from: self.name().to_string(),
                to: target.name().to_string(),
            });
        }
        *self = target;
        Ok(())
    }
}

impl Default for PppoeState {
    fn default() -> Self {
        PppoeState::Unknown
    }
}

impl fmt::Display for PppoeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// RunState
// ============================================================================

/// Run state of the session process supervised by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl RunState {
    /// Returns the state name
    pub fn name(&self) -> &'static str {
        match self {
            RunState::Starting => "Starting",
            RunState::Running => "Running",
            RunState::Stopping => "Stopping",
            RunState::Stopped => "Stopped",
        }
    }

    /// Stopped or on the way there
    pub fn is_stopped(&self) -> bool {
        matches!(self, RunState::Stopped | RunState::Stopping)
    }
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Starting
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// DetailedState
// ============================================================================

/// Fine-grained connectivity status broadcast to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailedState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
    Failed,
}

impl DetailedState {
    /// Returns the state name
    pub fn name(&self) -> &'static str {
        match self {
            DetailedState::Idle => "IDLE",
            DetailedState::Connecting => "CONNECTING",
            DetailedState::Connected => "CONNECTED",
            DetailedState::Disconnected => "DISCONNECTED",
            DetailedState::Failed => "FAILED",
        }
    }
}

impl Default for DetailedState {
    fn default() -> Self {
        DetailedState::Idle
    }
}

impl fmt::Display for DetailedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ============================================================================
// LinkEvent
// ============================================================================

/// Tag of an event processed by the link tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkEvent {
    Enabled,
    PluggedAndUp,
    PluggedAndDown,
    UnpluggedAndDown,
    SetAccount,
    RemoveAccount,
    Disabled,
    Unknown,
    ConfigSucceeded,
    ConfigFailed,
    ConfigWait,
    SessionConnected,
    DeferredDisconnect,
}

impl LinkEvent {
    /// Events that take the link-up handling path
    pub fn is_link_up_path(&self) -> bool {
        matches!(
            self,
            LinkEvent::Enabled | LinkEvent::PluggedAndUp | LinkEvent::SetAccount
        )
    }
}

impl Default for LinkEvent {
    fn default() -> Self {
        LinkEvent::UnpluggedAndDown
    }
}

// ============================================================================
// PppoeAccount
// ============================================================================

/// Username and password handed to the session process
///
/// Both are opaque; either may be empty, in which case the account is
/// considered missing. The password is never printed.
#[derive(Clone)]
pub struct PppoeAccount {
    username: String,
    password: SecretString,
}

impl PppoeAccount {
    /// Creates an account from raw strings
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// An account with empty username and password
    pub fn empty() -> Self {
        Self::new("", "")
    }

    /// The username
    pub fn username(&self) -> &str {
        &self.username
    }

    /// The password
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// True when both username and password are non-empty
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.expose_secret().is_empty()
    }
}

impl Default for PppoeAccount {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for PppoeAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PppoeAccount")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
