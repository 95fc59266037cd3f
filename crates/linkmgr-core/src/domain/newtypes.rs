//! Newtype wrappers for identifiers used across the link manager
//!
//! - [`LockId`] identifies one keep-awake lock registration
//! - [`OwnerId`] identifies the caller binding that owns locks (its
//!   liveness is tracked, never owned, by the registry)
//! - [`Uid`] is a numeric caller identity used for permissions and
//!   work attribution
//! - [`CallerId`] bundles uid and pid of an API caller

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// LockId
// ============================================================================

/// Identifier of a keep-awake lock registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockId(Uuid);

impl LockId {
    /// Create a new random LockId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LockId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for LockId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LockId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::ValidationFailed(format!("Invalid lock id: {e}")))
    }
}

// ============================================================================
// OwnerId
// ============================================================================

/// Identity of a caller binding (the handle a client holds while it is alive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(Uuid);

impl OwnerId {
    /// Create a new random OwnerId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for OwnerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Uid / CallerId
// ============================================================================

/// Numeric user identity of a caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(u32);

impl Uid {
    /// The superuser
    pub const ROOT: Uid = Uid(0);

    /// Wrap a raw uid
    #[must_use]
    pub const fn new(uid: u32) -> Self {
        Self(uid)
    }

    /// Raw numeric value
    #[must_use]
    pub const fn as_raw(&self) -> u32 {
        self.0
    }
}

impl Display for Uid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Uid {
    fn from(uid: u32) -> Self {
        Self(uid)
    }
}

/// The identity of whoever is calling into the public API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerId {
    /// Calling user
    pub uid: Uid,
    /// Calling process
    pub pid: u32,
}

impl CallerId {
    /// Creates a caller identity
    pub fn new(uid: impl Into<Uid>, pid: u32) -> Self {
        Self {
            uid: uid.into(),
            pid,
        }
    }
}

impl Display for CallerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "uid={} pid={}", self.uid, self.pid)
    }
}
