//! linkmgr Display - framebuffer attach/detach and mode negotiation
//!
//! - [`manager`] - the reconciliation state machine (`DisplayManager` + `DisplayHandle`)
//! - [`bridge`] - typed commands over the display daemon port
//! - [`config_file`] - the primary display's `mode=` / `colordepth=` file
//!
//! Mode parsing, default-mode selection and the slot map itself are pure
//! domain logic in `linkmgr-core`.

pub mod bridge;
pub mod config_file;
pub mod error;
pub mod manager;

pub use bridge::CommandBridge;
pub use config_file::{ConfigFile, PrimaryConfig};
pub use error::{DisplayError, Result};
pub use manager::{settings_key, DisplayHandle, DisplayManager, DisplayPorts, DisplaySnapshot};
