//! Directory-backed property store
//!
//! Each property is a file named after its key under one directory, e.g.
//! `<dir>/net.ppp0.dns1`. The pppd ip-up hook writes the DNS servers; the
//! session adapter writes the exit code when pppd terminates.

use std::path::{Path, PathBuf};

use linkmgr_core::ports::IPropertyStore;
use tracing::trace;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
pub struct DirPropertyStore {
    dir: PathBuf,
}

impl DirPropertyStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\', '\0']);
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(key))
    }

    /// Reads a property; missing files and blank values are `None`
    pub async fn read(&self, key: &str) -> Result<Option<String>> {
        let file = self.file(key)?;
        match tokio::fs::read_to_string(&file).await {
            Ok(text) => {
                let value = text.trim();
                Ok((!value.is_empty()).then(|| value.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::io(file, e)),
        }
    }

    /// Publishes a property
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let file = self.file(key)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;
        tokio::fs::write(&file, format!("{value}\n"))
            .await
            .map_err(|e| StoreError::io(&file, e))?;
        trace!(key, value, "Property set");
        Ok(())
    }

    /// Removes a property; removing a missing one is fine
    pub async fn clear(&self, key: &str) -> Result<()> {
        let file = self.file(key)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(file, e)),
        }
    }
}

#[async_trait::async_trait]
impl IPropertyStore for DirPropertyStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.read(key).await?)
    }
}
