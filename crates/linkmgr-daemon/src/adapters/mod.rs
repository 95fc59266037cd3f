//! Linux adapters for the linkmgr ports
//!
//! | port | adapter |
//! |---|---|
//! | `ISessionProcess` | [`pppd::PppdProcess`] |
//! | `ILinkMonitor` | [`sysfs_link::SysfsLinkMonitor`] |
//! | `IWakeLockBackend` | [`sysfs_wakelock::SysfsWakeLockBackend`] |
//! | `IDisplayDaemon` | [`dispd::DispdClient`] |
//! | `IBroadcaster` | [`broadcaster::TracingBroadcaster`] |
//! | `IAccessControl` | [`access::UidAllowList`] |
//!
//! Settings and properties come from `linkmgr-store`. Screen and plug
//! state reach the PPPoE service through [`sysfs_power::PowerWatcher`].

pub mod access;
pub mod broadcaster;
pub mod dispd;
pub mod pppd;
pub mod sysfs_link;
pub mod sysfs_power;
pub mod sysfs_wakelock;

pub use access::UidAllowList;
pub use broadcaster::TracingBroadcaster;
pub use dispd::{DispdClient, DispdEvents};
pub use pppd::PppdProcess;
pub use sysfs_link::SysfsLinkMonitor;
pub use sysfs_power::PowerWatcher;
pub use sysfs_wakelock::SysfsWakeLockBackend;
