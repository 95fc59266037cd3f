//! The service's own wakelock
//!
//! A reference-counted wrapper over [`IWakeLockBackend`]. The backend only
//! sees the 0 → 1 and 1 → 0 edges; nested acquires from back-to-back
//! transitions just bump the count.

use std::sync::Arc;

use linkmgr_core::{domain::WorkSource, ports::IWakeLockBackend};
use tokio::sync::Mutex;
use tracing::{debug, warn};

struct WakeLockState {
    count: u32,
    work_source: WorkSource,
}

/// Reference-counted system wakelock
#[derive(Clone)]
pub struct WakeLock {
    tag: String,
    backend: Arc<dyn IWakeLockBackend>,
    state: Arc<Mutex<WakeLockState>>,
}

impl WakeLock {
    pub fn new(tag: impl Into<String>, backend: Arc<dyn IWakeLockBackend>) -> Self {
        Self {
            tag: tag.into(),
            backend,
            state: Arc::new(Mutex::new(WakeLockState {
                count: 0,
                work_source: WorkSource::new(),
            })),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub async fn acquire(&self) {
        let mut st = self.state.lock().await;
        st.count += 1;
        if st.count == 1 {
            if let Err(e) = self.backend.acquire(&self.tag).await {
                warn!(tag = %self.tag, error = %e, "Wakelock backend acquire failed");
            }
        }
        debug!(tag = %self.tag, count = st.count, "Wakelock acquired");
    }

    pub async fn release(&self) {
        let mut st = self.state.lock().await;
        if st.count == 0 {
            warn!(tag = %self.tag, "Wakelock under-locked");
            return;
        }
        st.count -= 1;
        if st.count == 0 {
            if let Err(e) = self.backend.release(&self.tag).await {
                warn!(tag = %self.tag, error = %e, "Wakelock backend release failed");
            }
        }
        debug!(tag = %self.tag, count = st.count, "Wakelock released");
    }

    /// Attributes the wakelock to `ws`; unchanged sets are not forwarded
    pub async fn set_work_source(&self, ws: WorkSource) {
        let mut st = self.state.lock().await;
        if st.work_source == ws {
            return;
        }
        if let Err(e) = self.backend.set_work_source(&self.tag, &ws).await {
            warn!(tag = %self.tag, error = %e, "Wakelock work source update failed");
        }
        st.work_source = ws;
    }

    pub async fn is_held(&self) -> bool {
        self.state.lock().await.count > 0
    }

    pub async fn count(&self) -> u32 {
        self.state.lock().await.count
    }
}
