//! linkmgr Store - file-backed adapters for the settings and property ports
//!
//! - [`YamlSettingsStore`] - persisted settings in one YAML map, cached in memory
//! - [`DirPropertyStore`] - one file per property, as written by pppd hooks

pub mod error;
pub mod properties;
pub mod settings;

pub use error::{Result, StoreError};
pub use properties::DirPropertyStore;
pub use settings::YamlSettingsStore;
