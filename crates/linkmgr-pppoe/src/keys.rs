//! Settings-store keys used by the link manager

/// Persisted enabled flag (0/1)
pub const PPPOE_ON: &str = "pppoe_on";
/// Enabled flag saved across a reboot; consumed once at boot
pub const PPPOE_SAVED_STATE: &str = "pppoe_saved_state";
pub const PPPOE_USERNAME: &str = "pppoe_username";
pub const PPPOE_PASSWORD: &str = "pppoe_password";
/// Bitmask of plug types that keep the device awake with the screen off
pub const STAY_ON_WHILE_PLUGGED_IN: &str = "stay_on_while_plugged_in";
