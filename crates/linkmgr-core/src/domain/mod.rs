//! Domain entities and business logic
//!
//! This module contains the core domain types for the link manager:
//! - Newtypes for lock, owner and caller identities
//! - PPPoE enable/run/detailed states and link events
//! - Work attribution sets
//! - Display modes, settings and commands
//! - The framebuffer ↔ display slot map
//! - Domain-specific error types

pub mod display;
pub mod errors;
pub mod newtypes;
pub mod pppoe;
pub mod slot_map;
pub mod work_source;

// Re-export commonly used types
pub use display::{
    choose_default_mode, select_mode, DisplayCommand, DisplayMode, DisplaySettings, ModeChoice,
    ModeChoiceReason, OperateCode, ScanType,
};
pub use errors::DomainError;
pub use newtypes::*;
pub use pppoe::{DetailedState, LinkEvent, PppoeAccount, PppoeState, RunState};
pub use slot_map::{SlotChange, SlotMap};
pub use work_source::WorkSource;
