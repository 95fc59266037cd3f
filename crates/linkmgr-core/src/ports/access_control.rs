//! Access control port (driven/secondary port)
//!
//! Answers whether a caller holds a capability. Every mutating entry point
//! of the public API asks before enqueuing work.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::newtypes::CallerId;

/// Capabilities checked by the public API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Enable/disable the link, set/remove the account
    ChangePppoeState,
    /// Query link state
    AccessPppoeState,
    /// Acquire/release keep-awake locks
    WakeLock,
    /// Attribute work to a uid other than the caller's
    UpdateDeviceStats,
    /// Reconfigure display slots
    ChangeDisplayState,
}

impl Permission {
    pub fn name(&self) -> &'static str {
        match self {
            Permission::ChangePppoeState => "CHANGE_PPPOE_STATE",
            Permission::AccessPppoeState => "ACCESS_PPPOE_STATE",
            Permission::WakeLock => "WAKE_LOCK",
            Permission::UpdateDeviceStats => "UPDATE_DEVICE_STATS",
            Permission::ChangeDisplayState => "CHANGE_DISPLAY_STATE",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Capability oracle
pub trait IAccessControl: Send + Sync {
    fn check(&self, caller: &CallerId, permission: Permission) -> bool;
}
