//! YAML-backed settings store
//!
//! All settings live in one flat YAML map. The map is loaded once at
//! startup into a [`DashMap`]; every `put` updates the cache and rewrites
//! the file through a temporary file and a rename.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use dashmap::DashMap;
use linkmgr_core::ports::ISettingsStore;
use serde_yaml::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{Result, StoreError};

pub struct YamlSettingsStore {
    path: PathBuf,
    cache: DashMap<String, String>,
    /// Serializes file rewrites
    flush: Mutex<()>,
}

fn scalar(path: &Path, key: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if b { "1" } else { "0" }.to_string()),
        Value::Null => Ok(String::new()),
        _ => Err(StoreError::Parse {
            path: path.to_path_buf(),
            reason: format!("value of '{key}' is not a scalar"),
        }),
    }
}

impl YamlSettingsStore {
    /// Opens the store, loading the file if it exists
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let cache = DashMap::new();

        match tokio::fs::read_to_string(&path).await {
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => {
                let map: BTreeMap<String, Value> =
                    serde_yaml::from_str(&text).map_err(|e| StoreError::Parse {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                for (key, value) in map {
                    let value = scalar(&path, &key, value)?;
                    cache.insert(key, value);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No settings file yet");
            }
            Err(e) => return Err(StoreError::io(&path, e)),
        }

        info!(path = %path.display(), entries = cache.len(), "Settings loaded");
        Ok(Self {
            path,
            cache,
            flush: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    async fn write_file(&self) -> Result<()> {
        let _guard = self.flush.lock().await;
        let sorted: BTreeMap<String, String> = self
            .cache
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let yaml = serde_yaml::to_string(&sorted).map_err(|e| StoreError::Parse {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| StoreError::io(dir, e))?;
        }
        let tmp = self.path.with_extension("yaml.tmp");
        tokio::fs::write(&tmp, yaml)
            .await
            .map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::io(&self.path, e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ISettingsStore for YamlSettingsStore {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.cache.get(key).map(|v| v.value().clone()))
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let unchanged = self.cache.get(key).is_some_and(|v| v.value() == value);
        if unchanged {
            return Ok(());
        }
        self.cache.insert(key.to_string(), value.to_string());
        debug!(key, "Setting stored");
        self.write_file().await?;
        Ok(())
    }
}
