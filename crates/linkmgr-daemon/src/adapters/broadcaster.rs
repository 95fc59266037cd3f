use linkmgr_core::ports::{Broadcast, IBroadcaster};
use tracing::info;

/// Emits every broadcast as a structured log line
#[derive(Debug, Default)]
pub struct TracingBroadcaster;

#[async_trait::async_trait]
impl IBroadcaster for TracingBroadcaster {
    async fn broadcast(&self, event: Broadcast) -> anyhow::Result<()> {
        let json = serde_json::to_string(&event)?;
        info!(target: "linkmgr::broadcast", event = %json, "Broadcast");
        Ok(())
    }
}
