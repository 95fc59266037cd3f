//! Kernel wakelock backend
//!
//! Writes the tag to `<dir>/wake_lock` to hold and to `<dir>/wake_unlock`
//! to drop. On kernels without the wakelock interface the files are
//! missing; the backend then only logs, so the service still runs on a
//! plain desktop.

use std::{io::ErrorKind, path::PathBuf};

use anyhow::Context;
use linkmgr_core::{domain::WorkSource, ports::IWakeLockBackend};
use tokio::{fs::OpenOptions, io::AsyncWriteExt};
use tracing::debug;

pub const DEFAULT_POWER_DIR: &str = "/sys/power";

#[derive(Debug, Clone)]
pub struct SysfsWakeLockBackend {
    dir: PathBuf,
}

impl SysfsWakeLockBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    async fn write(&self, file: &str, tag: &str) -> anyhow::Result<()> {
        let path = self.dir.join(file);
        // Never create: a missing file means the kernel lacks the interface
        let mut f = match OpenOptions::new().write(true).open(&path).await {
            Ok(f) => f,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), tag, "No kernel wakelock interface");
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("opening {}", path.display())),
        };
        f.write_all(tag.as_bytes())
            .await
            .with_context(|| format!("writing {}", path.display()))
    }
}

impl Default for SysfsWakeLockBackend {
    fn default() -> Self {
        Self::new(DEFAULT_POWER_DIR)
    }
}

#[async_trait::async_trait]
impl IWakeLockBackend for SysfsWakeLockBackend {
    async fn acquire(&self, tag: &str) -> anyhow::Result<()> {
        self.write("wake_lock", tag).await
    }

    async fn release(&self, tag: &str) -> anyhow::Result<()> {
        self.write("wake_unlock", tag).await
    }

    async fn set_work_source(&self, tag: &str, ws: &WorkSource) -> anyhow::Result<()> {
        // The kernel has no attribution; record it for power debugging.
        debug!(tag, work_source = %ws, "Wakelock attribution");
        Ok(())
    }
}
