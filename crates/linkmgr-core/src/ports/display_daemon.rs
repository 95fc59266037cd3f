//! Display daemon port (driven/secondary port)
//!
//! The external display daemon owns the framebuffers. It answers mode
//! list queries and applies [`DisplayCommand`]s. Attach/detach events
//! flow the other way and are fed to the display manager's handle by the
//! adapter that owns the daemon connection.

use crate::domain::display::DisplayCommand;

/// Event code: a framebuffer was connected
pub const EVENT_INTERFACE_CONNECTED: u32 = 600;
/// Event code: a framebuffer was disconnected
pub const EVENT_INTERFACE_DISCONNECTED: u32 = 601;
/// Response code of each line of a mode list
pub const RESPONSE_MODE_LIST: u32 = 110;
/// Response code terminating a successful command
pub const RESPONSE_OK: u32 = 200;

/// Command channel to the display daemon
#[async_trait::async_trait]
pub trait IDisplayDaemon: Send + Sync {
    /// Modes supported by framebuffer `fb`, in daemon order
    async fn list_modes(&self, fb: usize) -> anyhow::Result<Vec<String>>;

    /// Applies a configuration command
    async fn apply(&self, command: &DisplayCommand) -> anyhow::Result<()>;
}
