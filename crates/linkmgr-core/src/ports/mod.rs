//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the controllers
//! depend on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`ISessionProcess`] - start/stop the external PPPoE session process
//! - [`ILinkMonitor`] / [`ILinkObserver`] - Ethernet carrier and interface events
//! - [`IPropertyStore`] - properties published by the session process
//! - [`ISettingsStore`] - persisted configuration
//! - [`IBroadcaster`] - state notifications
//! - [`IDisplayDaemon`] - display daemon command channel
//! - [`IWakeLockBackend`] - platform suspend blocker
//! - [`IAccessControl`] - caller capability checks

pub mod access_control;
pub mod broadcaster;
pub mod display_daemon;
pub mod link_monitor;
pub mod property_store;
pub mod session_process;
pub mod settings_store;
pub mod wakelock;

pub use access_control::{IAccessControl, Permission};
pub use broadcaster::{Broadcast, IBroadcaster};
pub use display_daemon::IDisplayDaemon;
pub use link_monitor::{ILinkMonitor, ILinkObserver};
pub use property_store::IPropertyStore;
pub use session_process::ISessionProcess;
pub use settings_store::ISettingsStore;
pub use wakelock::IWakeLockBackend;
