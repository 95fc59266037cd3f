//! Link monitor over `/sys/class/net`
//!
//! Scans the interface directory on a fixed interval and reports the
//! difference against the previous scan:
//!
//! ```text
//!   new entry         → interface_added, then link_status_changed if carrier up
//!   vanished entry    → interface_removed
//!   carrier flipped   → link_status_changed
//! ```
//!
//! Interfaces that are administratively down expose no readable carrier;
//! they count as link down.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use linkmgr_core::ports::{ILinkMonitor, ILinkObserver};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_NET_DIR: &str = "/sys/class/net";
const SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Interface name → carrier up
pub type LinkTable = BTreeMap<String, bool>;

pub struct SysfsLinkMonitor {
    net_dir: PathBuf,
    interval: Duration,
    shutdown: CancellationToken,
}

impl SysfsLinkMonitor {
    pub fn new(net_dir: impl Into<PathBuf>, shutdown: CancellationToken) -> Self {
        Self {
            net_dir: net_dir.into(),
            interval: SCAN_INTERVAL,
            shutdown,
        }
    }
}

async fn carrier(net_dir: &Path, iface: &str) -> bool {
    match tokio::fs::read_to_string(net_dir.join(iface).join("carrier")).await {
        Ok(text) => text.trim() == "1",
        Err(_) => false,
    }
}

/// Reads the current interface table
pub async fn scan(net_dir: &Path) -> anyhow::Result<LinkTable> {
    let mut table = LinkTable::new();
    let mut entries = tokio::fs::read_dir(net_dir)
        .await
        .with_context(|| format!("reading {}", net_dir.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let up = carrier(net_dir, &name).await;
        table.insert(name, up);
    }
    Ok(table)
}

/// Reports every change from `old` to `new` to the observer
pub fn report(old: &LinkTable, new: &LinkTable, observer: &dyn ILinkObserver) {
    for (iface, _) in old.iter().filter(|(i, _)| !new.contains_key(*i)) {
        debug!(iface = %iface, "Interface removed");
        observer.interface_removed(iface);
    }
    for (iface, &up) in new {
        match old.get(iface) {
            None => {
                debug!(iface = %iface, up, "Interface added");
                observer.interface_added(iface);
                if up {
                    observer.link_status_changed(iface, true);
                }
            }
            Some(&was) if was != up => {
                debug!(iface = %iface, up, "Carrier changed");
                observer.link_status_changed(iface, up);
            }
            Some(_) => {}
        }
    }
}

#[async_trait::async_trait]
impl ILinkMonitor for SysfsLinkMonitor {
    async fn subscribe(&self, observer: Arc<dyn ILinkObserver>) -> anyhow::Result<()> {
        let net_dir = self.net_dir.clone();
        let interval = self.interval;
        let shutdown = self.shutdown.clone();
        let mut last = scan(&net_dir).await?;
        info!(net_dir = %net_dir.display(), interfaces = last.len(), "Watching network interfaces");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match scan(&net_dir).await {
                    Ok(now) => {
                        report(&last, &now, observer.as_ref());
                        last = now;
                    }
                    Err(e) => warn!(error = %e, "Interface scan failed"),
                }
            }
            debug!("Interface watcher stopped");
        });
        Ok(())
    }

    async fn is_link_up(&self, iface: &str) -> anyhow::Result<bool> {
        Ok(carrier(&self.net_dir, iface).await)
    }

    async fn enable_interface(&self, iface: &str) -> anyhow::Result<()> {
        let status = Command::new("ip")
            .args(["link", "set", "dev", iface, "up"])
            .status()
            .await
            .context("running ip link")?;
        if !status.success() {
            anyhow::bail!("ip link set dev {iface} up failed: {status}");
        }
        info!(iface, "Interface brought up");
        Ok(())
    }
}
