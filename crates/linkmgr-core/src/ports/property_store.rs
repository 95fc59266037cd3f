//! Property store port (driven/secondary port)
//!
//! Read-only view of the string properties the session process publishes
//! (its exit code and the DNS servers it negotiated).

/// Read-only string property lookups
#[async_trait::async_trait]
pub trait IPropertyStore: Send + Sync {
    /// Returns the property value; a missing or empty property is `None`
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
}
