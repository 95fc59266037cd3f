//! Settings store port (driven/secondary port)
//!
//! Persisted key/value configuration: the enabled flag, the account and
//! per-display settings.
//!
//! ## Design Notes
//!
//! - Reads are best-effort. The typed helpers map a missing key, an
//!   unparseable value or a store error to the caller's default.
//! - Values are stored as strings; booleans are written as `0`/`1`.

use tracing::warn;

/// Persisted string settings
#[async_trait::async_trait]
pub trait ISettingsStore: Send + Sync {
    /// Raw lookup
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key`
    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;

    /// Integer lookup with a default
    async fn get_int(&self, key: &str, default: i64) -> i64 {
        match self.get(key).await {
            Ok(Some(v)) => v.trim().parse().unwrap_or(default),
            Ok(None) => default,
            Err(e) => {
                warn!(key, error = %e, "Settings read failed, using default");
                default
            }
        }
    }

    /// Boolean lookup (`0` is false, any other integer true)
    async fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_int(key, i64::from(default)).await != 0
    }

    /// String lookup with a default
    async fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key).await {
            Ok(Some(v)) => v,
            Ok(None) => default.to_string(),
            Err(e) => {
                warn!(key, error = %e, "Settings read failed, using default");
                default.to_string()
            }
        }
    }

    async fn put_int(&self, key: &str, value: i64) -> anyhow::Result<()> {
        self.put(key, &value.to_string()).await
    }

    async fn put_bool(&self, key: &str, value: bool) -> anyhow::Result<()> {
        self.put_int(key, i64::from(value)).await
    }
}
