//! Broadcast port (driven/secondary port)
//!
//! Fire-and-forget delivery of state notifications to whoever listens.
//!
//! ## Design Notes
//!
//! - Delivery failures are logged by the caller and never retried.
//! - [`Broadcast`] is serializable so adapters can forward it as JSON.

use serde::{Deserialize, Serialize};

use crate::domain::pppoe::{DetailedState, PppoeState};

/// A notification emitted by one of the controllers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Broadcast {
    /// Enable state changed, or a session status code was reported
    PppoeStateChanged {
        state: PppoeState,
        previous: Option<PppoeState>,
    },
    /// The detailed connectivity state changed
    NetworkStateChanged { detailed: DetailedState },
    /// Link re-confirmed without a state change
    ConfigurationChanged { detailed: DetailedState },
    /// Aggregate "a pluggable display is connected" indication
    DisplayPlugged { connected: bool },
    /// A display slot was attached or detached
    DisplayAttached { slot: usize, connected: bool },
    /// HDMI audio routing should follow the display
    HdmiAudioPlug { plugged: bool },
}

/// Delivers broadcasts to interested parties
#[async_trait::async_trait]
pub trait IBroadcaster: Send + Sync {
    async fn broadcast(&self, event: Broadcast) -> anyhow::Result<()>;
}
