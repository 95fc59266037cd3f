//! Wakelock backend port (driven/secondary port)
//!
//! The platform primitive that keeps the device from suspending. The
//! service reference-counts its own usage and only calls the backend on
//! 0→1 and 1→0 edges.

use crate::domain::work_source::WorkSource;

/// Platform suspend blocker
#[async_trait::async_trait]
pub trait IWakeLockBackend: Send + Sync {
    async fn acquire(&self, tag: &str) -> anyhow::Result<()>;

    async fn release(&self, tag: &str) -> anyhow::Result<()>;

    /// Attributes the wakelock to the given uids (empty = the service itself)
    async fn set_work_source(&self, tag: &str, ws: &WorkSource) -> anyhow::Result<()>;
}
