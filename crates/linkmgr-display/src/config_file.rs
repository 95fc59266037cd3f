//! Primary display config file
//!
//! The primary display's mode and color depth live in a small text file
//! that is read before the settings store is consulted:
//!
//! ```text
//! mode=1920x1080p-60
//! colordepth=32
//! ```

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{DisplayError, Result};

const MODE_PREFIX: &str = "mode=";
const DEPTH_PREFIX: &str = "colordepth=";

/// Values found in the config file; absent or empty entries are `None`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryConfig {
    pub mode: Option<String>,
    pub color_depth: Option<u32>,
}

impl PrimaryConfig {
    fn parse(path: &Path, text: &str) -> Result<Self> {
        let mut config = PrimaryConfig::default();
        for line in text.lines().map(str::trim) {
            if let Some(mode) = line.strip_prefix(MODE_PREFIX) {
                config.mode = (!mode.is_empty()).then(|| mode.to_string());
            } else if let Some(depth) = line.strip_prefix(DEPTH_PREFIX) {
                if depth.is_empty() {
                    continue;
                }
                let depth = depth.parse().map_err(|e| DisplayError::ConfigFile {
                    path: path.to_path_buf(),
                    reason: format!("bad colordepth '{depth}': {e}"),
                })?;
                config.color_depth = Some(depth);
            }
        }
        Ok(config)
    }
}

/// Reads and rewrites the primary display config file
#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the file; `Ok(None)` if it does not exist
    pub async fn load(&self) -> Result<Option<PrimaryConfig>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };
        PrimaryConfig::parse(&self.path, &text).map(Some)
    }

    /// Replaces the file with the given mode and color depth
    pub async fn store(&self, mode: Option<&str>, color_depth: u32) -> Result<()> {
        let text = format!(
            "{MODE_PREFIX}{}\n{DEPTH_PREFIX}{color_depth}\n",
            mode.unwrap_or_default()
        );
        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| self.io_error(e))?;
        }
        tokio::fs::write(&self.path, text)
            .await
            .map_err(|e| self.io_error(e))?;
        debug!(path = %self.path.display(), "Primary display config written");
        Ok(())
    }

    fn io_error(&self, e: std::io::Error) -> DisplayError {
        DisplayError::ConfigFile {
            path: self.path.clone(),
            reason: e.to_string(),
        }
    }
}
