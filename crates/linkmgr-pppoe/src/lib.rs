//! linkmgr PPPoE - link state machine and service orchestration
//!
//! This crate drives a PPPoE session through the ports defined in
//! `linkmgr-core`:
//! - [`tracker`] - the link state machine (`LinkTracker` + `TrackerHandle`)
//! - [`ip_poll`] - the bounded IP-configuration poller
//! - [`lock_registry`] - caller keep-awake locks with owner-death cleanup
//! - [`wakelock`] - the service's reference-counted system wakelock
//! - [`service`] - enable/disable lifecycle, idle policy and the caller API
//!
//! Each controller runs as its own task and is reached through a cloneable
//! handle; nothing here blocks a caller on a state transition.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod error;
pub mod ip_poll;
pub mod keys;
pub mod lock_registry;
pub mod service;
pub mod tracker;
pub mod wakelock;

pub use error::{LinkError, Result};
pub use lock_registry::{LockActivity, LockHandle, LockInfo, LockRegistry, LockStats, OwnerBinding};
pub use service::{PppoeService, PppoeServiceHandle, ServiceDump, ServicePorts};
pub use tracker::{LinkTracker, TrackerHandle, TrackerPorts, TrackerSettings, TrackerSnapshot};
pub use wakelock::WakeLock;

/// Locks a std mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
