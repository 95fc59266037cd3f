//! Session process port (driven/secondary port)
//!
//! Controls the external PPP daemon that establishes the PPPoE session.
//! The link state machine never speaks PPP itself; it only starts and
//! stops this process and then watches the properties it publishes.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because spawn/kill failures are adapter-specific.
//!   The caller catches every error and turns it into a detailed-state
//!   transition; nothing here is fatal to the event loop.
//! - The password is handed over as a [`SecretString`] and exposed only by
//!   the adapter when building the command line.

use secrecy::SecretString;

/// Starts and stops the external PPPoE session process
#[async_trait::async_trait]
pub trait ISessionProcess: Send + Sync {
    /// Spawns the session with the given credentials
    async fn start_session(&self, username: &str, password: &SecretString) -> anyhow::Result<()>;

    /// Terminates the running session, if any
    async fn stop_session(&self) -> anyhow::Result<()>;
}
