//! Screen and plug state over sysfs
//!
//! Polls `/sys/class/power_supply` for online external supplies and
//! `/sys/class/backlight` for the panel power, and forwards changes to the
//! PPPoE service as `battery_changed`, `screen_on` and `screen_off`.
//!
//! ```text
//!   power_supply/*/type   Mains → 1, USB → 2, Wireless → 4
//!   power_supply/*/online 1 → bit set in the plug mask
//!   backlight/*/bl_power  0 on any device → screen on
//! ```
//!
//! A machine without a backlight device never reports the screen as off,
//! so the idle policy stays dormant on headless boxes.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use linkmgr_pppoe::PppoeServiceHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_SUPPLY_DIR: &str = "/sys/class/power_supply";
pub const DEFAULT_BACKLIGHT_DIR: &str = "/sys/class/backlight";
const SCAN_INTERVAL: Duration = Duration::from_secs(2);

const PLUGGED_AC: u32 = 1;
const PLUGGED_USB: u32 = 2;
const PLUGGED_WIRELESS: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerState {
    /// Bit mask of online external supplies
    pub plugged: u32,
    /// None when no backlight device exists
    pub screen_on: Option<bool>,
}

/// A change to forward to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    Plugged(u32),
    ScreenOn,
    ScreenOff,
}

async fn read_trimmed(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
}

async fn entries(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(mut rd) = tokio::fs::read_dir(dir).await else {
        return out;
    };
    while let Ok(Some(entry)) = rd.next_entry().await {
        out.push(entry.path());
    }
    out.sort();
    out
}

fn plug_bit(supply_type: &str) -> u32 {
    match supply_type {
        "Mains" => PLUGGED_AC,
        "USB" | "USB_C" | "USB_PD" => PLUGGED_USB,
        "Wireless" => PLUGGED_WIRELESS,
        _ => 0,
    }
}

/// Plug mask from the online external supplies under `dir`
pub async fn plugged(dir: &Path) -> u32 {
    let mut mask = 0;
    for supply in entries(dir).await {
        let Some(kind) = read_trimmed(&supply.join("type")).await else {
            continue;
        };
        let bit = plug_bit(&kind);
        if bit != 0 && read_trimmed(&supply.join("online")).await.as_deref() == Some("1") {
            mask |= bit;
        }
    }
    mask
}

/// Panel power from the backlight devices under `dir`
pub async fn screen_on(dir: &Path) -> Option<bool> {
    let mut seen = false;
    for device in entries(dir).await {
        let Some(power) = read_trimmed(&device.join("bl_power")).await else {
            continue;
        };
        if power == "0" {
            return Some(true);
        }
        seen = true;
    }
    seen.then_some(false)
}

/// Events that turn `old` into `new`; the first scan reports plug state
/// and a known screen state
pub fn changes(old: Option<PowerState>, new: PowerState) -> Vec<PowerEvent> {
    let mut events = Vec::new();
    if old.map(|o| o.plugged) != Some(new.plugged) {
        events.push(PowerEvent::Plugged(new.plugged));
    }
    if old.map(|o| o.screen_on) != Some(new.screen_on) {
        match new.screen_on {
            Some(true) => events.push(PowerEvent::ScreenOn),
            Some(false) => events.push(PowerEvent::ScreenOff),
            None => {}
        }
    }
    events
}

pub struct PowerWatcher {
    supply_dir: PathBuf,
    backlight_dir: PathBuf,
    interval: Duration,
    service: PppoeServiceHandle,
}

impl PowerWatcher {
    pub fn new(service: PppoeServiceHandle) -> Self {
        Self {
            supply_dir: PathBuf::from(DEFAULT_SUPPLY_DIR),
            backlight_dir: PathBuf::from(DEFAULT_BACKLIGHT_DIR),
            interval: SCAN_INTERVAL,
            service,
        }
    }

    async fn scan(&self) -> PowerState {
        PowerState {
            plugged: plugged(&self.supply_dir).await,
            screen_on: screen_on(&self.backlight_dir).await,
        }
    }

    fn forward(&self, event: PowerEvent) {
        debug!(?event, "Power state changed");
        let result = match event {
            PowerEvent::Plugged(mask) => self.service.battery_changed(mask),
            PowerEvent::ScreenOn => self.service.screen_on(),
            PowerEvent::ScreenOff => self.service.screen_off(),
        };
        if let Err(e) = result {
            warn!(?event, error = %e, "PPPoE service did not take power event");
        }
    }

    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            supplies = %self.supply_dir.display(),
            backlight = %self.backlight_dir.display(),
            "Watching screen and plug state"
        );
        let mut last = None;
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let now = self.scan().await;
            for event in changes(last, now) {
                self.forward(event);
            }
            last = Some(now);
        }
        debug!("Power watcher stopped");
    }
}
