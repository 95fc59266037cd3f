//! Link monitor port (driven/secondary port)
//!
//! Reports Ethernet carrier changes and network interfaces appearing or
//! disappearing, and lets the controller bring an interface up.
//!
//! ## Design Notes
//!
//! - [`ILinkObserver`] callbacks are synchronous and may run on the
//!   monitor's own task. Implementations only post a message to their
//!   controller's queue and return.
//! - The controller subscribes exactly once, at startup.

use std::sync::Arc;

/// Receives link-level notifications
pub trait ILinkObserver: Send + Sync {
    /// Carrier of `iface` changed
    fn link_status_changed(&self, iface: &str, up: bool);

    /// A network interface appeared
    fn interface_added(&self, iface: &str);

    /// A network interface disappeared
    fn interface_removed(&self, iface: &str);
}

/// Source of link-level notifications
#[async_trait::async_trait]
pub trait ILinkMonitor: Send + Sync {
    /// Registers the observer; later events are delivered to it
    async fn subscribe(&self, observer: Arc<dyn ILinkObserver>) -> anyhow::Result<()>;

    /// Current carrier state of `iface`
    async fn is_link_up(&self, iface: &str) -> anyhow::Result<bool>;

    /// Brings `iface` administratively up
    async fn enable_interface(&self, iface: &str) -> anyhow::Result<()>;
}
