//! Command bridge to the display daemon
//!
//! Wraps [`IDisplayDaemon`] with one method per configuration operation.
//! Failures are mapped to [`DisplayError::RemoteUnavailable`]; the manager
//! logs them and carries on.

use std::sync::Arc;

use linkmgr_core::{
    domain::{DisplayCommand, DisplaySettings},
    ports::IDisplayDaemon,
};
use tracing::debug;

use crate::error::{DisplayError, Result};

#[derive(Clone)]
pub struct CommandBridge {
    daemon: Arc<dyn IDisplayDaemon>,
}

impl CommandBridge {
    pub fn new(daemon: Arc<dyn IDisplayDaemon>) -> Self {
        Self { daemon }
    }

    /// Modes offered by framebuffer `fb`
    pub async fn list_modes(&self, fb: usize) -> Result<Vec<String>> {
        self.daemon
            .list_modes(fb)
            .await
            .map_err(|e| DisplayError::RemoteUnavailable(format!("mode list of fb{fb}: {e:#}")))
    }

    async fn send(&self, command: DisplayCommand) -> Result<()> {
        debug!(
            fb = command.framebuffer,
            operate = %command.operate,
            "Display command"
        );
        self.daemon.apply(&command).await.map_err(|e| {
            DisplayError::RemoteUnavailable(format!(
                "command {} on fb{}: {e:#}",
                command.operate, command.framebuffer
            ))
        })
    }

    pub async fn enable(&self, fb: usize, settings: &DisplaySettings) -> Result<()> {
        self.send(DisplayCommand::enable(fb, settings)).await
    }

    pub async fn disable(&self, fb: usize) -> Result<()> {
        self.send(DisplayCommand::disable(fb)).await
    }

    pub async fn set_resolution(&self, fb: usize, mode: &str) -> Result<()> {
        self.send(DisplayCommand::resolution(fb, mode)).await
    }

    pub async fn set_overscan(&self, fb: usize, ratio: i32) -> Result<()> {
        self.send(DisplayCommand::overscan(fb, ratio)).await
    }

    pub async fn set_mirror(&self, fb: usize, mirror: bool) -> Result<()> {
        self.send(DisplayCommand::mirror(fb, mirror)).await
    }

    pub async fn set_color_depth(&self, fb: usize, depth: u32) -> Result<()> {
        self.send(DisplayCommand::color_depth(fb, depth)).await
    }

    pub async fn set_rotation(&self, fb: usize, rotated: bool) -> Result<()> {
        self.send(DisplayCommand::rotation(fb, rotated)).await
    }
}
