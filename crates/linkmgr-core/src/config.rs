//! Configuration module for the link manager.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for the link manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pppoe: PppoeConfig,
    pub service: ServiceConfig,
    pub display: DisplayConfig,
    pub storage: StorageConfig,
    pub access: AccessConfig,
    pub logging: LoggingConfig,
}

/// PPPoE link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PppoeConfig {
    /// Ethernet interface carrying the session.
    pub interface: String,
    /// Interface the session process creates once connected.
    pub session_interface: String,
    /// Property holding the session process exit code.
    pub exit_code_property: String,
    /// DNS properties published by the session process; the first is polled.
    pub dns_properties: Vec<String>,
    /// Milliseconds between IP-configuration polls.
    pub poll_interval_ms: u64,
    /// Polls before giving up on IP configuration.
    pub max_poll_attempts: u32,
    /// Milliseconds a session-interface removal is held back.
    pub disconnect_delay_ms: u64,
    /// Path to the pppd binary.
    pub pppd_path: PathBuf,
    /// pppd plugin providing PPPoE.
    pub pppd_plugin: String,
}

/// Service orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Milliseconds after screen-off before the device counts as idle.
    pub idle_ms: u64,
    /// Milliseconds the wakelock is kept after an idle-driven stop.
    pub wakelock_timeout_ms: u64,
    /// Ceiling on concurrently active keep-awake locks.
    pub max_active_locks: usize,
    /// Tag of the service's own wakelock.
    pub wakelock_tag: String,
}

/// Display reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Framebuffer ids accepted from the daemon are `0..max_framebuffers`.
    pub max_framebuffers: usize,
    /// Number of logical display slots.
    pub max_displays: usize,
    /// Milliseconds a "disconnected" notification is held back.
    pub disconnect_debounce_ms: u64,
    /// File holding the primary display's mode and color depth.
    pub config_file: PathBuf,
    /// Unix socket of the display daemon.
    pub socket: PathBuf,
}

/// Storage adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// YAML file backing the settings store.
    pub settings_file: PathBuf,
    /// Directory of one-file-per-key properties.
    pub property_dir: PathBuf,
}

/// Caller access policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// Uids granted every permission. The daemon's own uid is always allowed.
    pub allowed_uids: Vec<u32>,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/linkmgr/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("linkmgr")
            .join("config.yaml")
    }
}

impl PppoeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn disconnect_delay(&self) -> Duration {
        Duration::from_millis(self.disconnect_delay_ms)
    }

    /// The DNS property the IP poller watches
    pub fn primary_dns_property(&self) -> &str {
        self.dns_properties.first().map(String::as_str).unwrap_or("")
    }
}

impl ServiceConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_ms)
    }

    pub fn wakelock_timeout(&self) -> Duration {
        Duration::from_millis(self.wakelock_timeout_ms)
    }
}

impl DisplayConfig {
    pub fn disconnect_debounce(&self) -> Duration {
        Duration::from_millis(self.disconnect_debounce_ms)
    }
}

// ---------------------------------------------------------------------------
// Section defaults
// ---------------------------------------------------------------------------

impl Default for PppoeConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            session_interface: "ppp0".to_string(),
            exit_code_property: "net.pppoe.ppp-exit".to_string(),
            dns_properties: vec!["net.ppp0.dns1".to_string(), "net.ppp0.dns2".to_string()],
            poll_interval_ms: 2000,
            max_poll_attempts: 20,
            disconnect_delay_ms: 5000,
            pppd_path: PathBuf::from("/usr/sbin/pppd"),
            pppd_plugin: "rp-pppoe.so".to_string(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            idle_ms: 15 * 60 * 1000,
            wakelock_timeout_ms: 8000,
            max_active_locks: 50,
            wakelock_tag: "*pppoe*".to_string(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_framebuffers: 10,
            max_displays: 4,
            disconnect_debounce_ms: 1000,
            config_file: PathBuf::from("/data/misc/display.conf"),
            socket: PathBuf::from("/dev/socket/dispd"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let data = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("/var/lib"))
            .join("linkmgr");
        Self {
            settings_file: data.join("settings.yaml"),
            property_dir: PathBuf::from("/run/linkmgr/properties"),
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            allowed_uids: vec![0, 1000],
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"pppoe.poll_interval_ms"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

fn non_empty(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.push(ValidationError {
            field: field.into(),
            message: "must not be empty".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- pppoe ---
        non_empty(&mut errors, "pppoe.interface", &self.pppoe.interface);
        non_empty(
            &mut errors,
            "pppoe.session_interface",
            &self.pppoe.session_interface,
        );
        if self.pppoe.interface == self.pppoe.session_interface {
            errors.push(ValidationError {
                field: "pppoe.session_interface".into(),
                message: "must differ from pppoe.interface".into(),
            });
        }
        non_empty(
            &mut errors,
            "pppoe.exit_code_property",
            &self.pppoe.exit_code_property,
        );
        if self.pppoe.dns_properties.is_empty() {
            errors.push(ValidationError {
                field: "pppoe.dns_properties".into(),
                message: "must list at least one property".into(),
            });
        }
        positive(&mut errors, "pppoe.poll_interval_ms", self.pppoe.poll_interval_ms);
        positive(
            &mut errors,
            "pppoe.max_poll_attempts",
            u64::from(self.pppoe.max_poll_attempts),
        );
        positive(
            &mut errors,
            "pppoe.disconnect_delay_ms",
            self.pppoe.disconnect_delay_ms,
        );

        // --- service ---
        positive(&mut errors, "service.idle_ms", self.service.idle_ms);
        positive(
            &mut errors,
            "service.wakelock_timeout_ms",
            self.service.wakelock_timeout_ms,
        );
        positive(
            &mut errors,
            "service.max_active_locks",
            self.service.max_active_locks as u64,
        );
        non_empty(&mut errors, "service.wakelock_tag", &self.service.wakelock_tag);

        // --- display ---
        positive(
            &mut errors,
            "display.max_framebuffers",
            self.display.max_framebuffers as u64,
        );
        positive(
            &mut errors,
            "display.max_displays",
            self.display.max_displays as u64,
        );
        if self.display.max_displays > self.display.max_framebuffers {
            errors.push(ValidationError {
                field: "display.max_displays".into(),
                message: format!(
                    "must not exceed display.max_framebuffers ({})",
                    self.display.max_framebuffers
                ),
            });
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}', expected one of: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Config`], starting from defaults.
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a builder pre-populated with default values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- pppoe ---

    pub fn pppoe_interface(mut self, iface: impl Into<String>) -> Self {
        self.config.pppoe.interface = iface.into();
        self
    }

    pub fn pppoe_session_interface(mut self, iface: impl Into<String>) -> Self {
        self.config.pppoe.session_interface = iface.into();
        self
    }

    pub fn pppoe_poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.pppoe.poll_interval_ms = ms;
        self
    }

    pub fn pppoe_max_poll_attempts(mut self, n: u32) -> Self {
        self.config.pppoe.max_poll_attempts = n;
        self
    }

    pub fn pppoe_disconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.pppoe.disconnect_delay_ms = ms;
        self
    }

    pub fn pppoe_pppd_path(mut self, path: PathBuf) -> Self {
        self.config.pppoe.pppd_path = path;
        self
    }

    // --- service ---

    pub fn service_idle_ms(mut self, ms: u64) -> Self {
        self.config.service.idle_ms = ms;
        self
    }

    pub fn service_wakelock_timeout_ms(mut self, ms: u64) -> Self {
        self.config.service.wakelock_timeout_ms = ms;
        self
    }

    pub fn service_max_active_locks(mut self, n: usize) -> Self {
        self.config.service.max_active_locks = n;
        self
    }

    // --- display ---

    pub fn display_max_framebuffers(mut self, n: usize) -> Self {
        self.config.display.max_framebuffers = n;
        self
    }

    pub fn display_max_displays(mut self, n: usize) -> Self {
        self.config.display.max_displays = n;
        self
    }

    pub fn display_disconnect_debounce_ms(mut self, ms: u64) -> Self {
        self.config.display.disconnect_debounce_ms = ms;
        self
    }

    pub fn display_config_file(mut self, path: PathBuf) -> Self {
        self.config.display.config_file = path;
        self
    }

    // --- storage ---

    pub fn storage_settings_file(mut self, path: PathBuf) -> Self {
        self.config.storage.settings_file = path;
        self
    }

    pub fn storage_property_dir(mut self, path: PathBuf) -> Self {
        self.config.storage.property_dir = path;
        self
    }

    // --- access ---

    pub fn access_allowed_uids(mut self, uids: Vec<u32>) -> Self {
        self.config.access.allowed_uids = uids;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
