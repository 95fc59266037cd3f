//! linkmgr Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain types** - `PppoeState`, `RunState`, `DetailedState`, `PppoeAccount`,
//!   `WorkSource`, `DisplayMode`, `DisplayCommand`, `SlotMap`
//! - **Port definitions** - Traits for adapters: `ISessionProcess`, `ILinkMonitor`,
//!   `IPropertyStore`, `ISettingsStore`, `IBroadcaster`, `IDisplayDaemon`,
//!   `IWakeLockBackend`, `IAccessControl`
//! - **Configuration** - YAML `Config` with validation and a builder
//! - **Timers** - cancellable delayed messages for controller queues
//!
//! # Architecture
//!
//! The domain module contains pure logic with no I/O. Ports define trait
//! interfaces that adapter crates implement. The controllers in
//! `linkmgr-pppoe` and `linkmgr-display` drive the domain through them.

pub mod config;
pub mod domain;
pub mod ports;
pub mod timer;
