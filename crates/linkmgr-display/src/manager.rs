//! Display reconciliation state machine
//!
//! `DisplayManager` owns the framebuffer ↔ slot map and the per-slot
//! settings. Daemon attach/detach events and caller configuration requests
//! are queued on one task and applied in order.
//!
//! ```text
//!   dispd 600 (fb) ──► connect ──► slot ──► select mode ──► DisplayAttached
//!                                        └─► re-enable if slot enabled
//!   dispd 601 (fb) ──► DisplayAttached(false) ──► disable ──► free slot
//!
//!   plugged: fb != 0 connect   → Connected now (cancels pending unplug)
//!            disconnect, ≤ 1   → Disconnected after debounce
//! ```
//!
//! Setters short-circuit when the value is unchanged, except enable which
//! always goes to the daemon. Commands are only sent for enabled slots;
//! the new value is persisted either way.

use std::sync::Arc;

use linkmgr_core::{
    config::DisplayConfig,
    domain::{
        choose_default_mode, CallerId, DisplayMode, DisplaySettings, ModeChoiceReason, SlotChange,
        SlotMap, Uid,
    },
    ports::{
        display_daemon::{EVENT_INTERFACE_CONNECTED, EVENT_INTERFACE_DISCONNECTED},
        Broadcast, IAccessControl, IBroadcaster, ISettingsStore, Permission,
    },
    timer::{schedule, TimerId, TimerSlot},
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    bridge::CommandBridge,
    config_file::ConfigFile,
    error::{DisplayError, Result},
};

// ============================================================================
// Settings keys
// ============================================================================

/// Settings key of `field` for display `slot` (`plugged_display_{slot+1}_{field}`)
pub fn settings_key(slot: usize, field: &str) -> String {
    format!("plugged_display_{}_{field}", slot + 1)
}

const MODE: &str = "mode";
const ENABLE: &str = "enable";
const MIRROR: &str = "mirror";
const ROTATION: &str = "rotation";
const OVERSCAN: &str = "overscan";
const COLORDEPTH: &str = "colordepth";

/// Integer setting narrowed to `T`; values out of range fall back to `default`
async fn int_setting<T>(settings: &dyn ISettingsStore, key: &str, default: T) -> T
where
    T: TryFrom<i64> + Into<i64> + Copy,
{
    let value = settings.get_int(key, default.into()).await;
    T::try_from(value).unwrap_or_else(|_| {
        warn!(key, value, "Display setting out of range, using default");
        default
    })
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug)]
enum DisplayMsg {
    Connected(usize),
    Disconnected(usize),
    SetEnable { slot: usize, enable: bool },
    SetMirror { slot: usize, mirror: bool },
    SetRotation { slot: usize, rotated: bool },
    SetOverscan { slot: usize, ratio: i32 },
    SetMode { slot: usize, mode: String },
    SetColorDepth { slot: usize, depth: u32 },
    Settings { slot: usize, reply: oneshot::Sender<DisplaySettings> },
    ModeList { slot: usize, reply: oneshot::Sender<Vec<String>> },
    Snapshot { reply: oneshot::Sender<DisplaySnapshot> },
    DebouncedUnplug(TimerId),
}

/// Display state as shown in dumps
#[derive(Debug, Clone, Serialize)]
pub struct DisplaySnapshot {
    pub slots: SlotMap,
    pub displays: Vec<DisplaySettings>,
    pub plugged: bool,
    pub unplug_pending: bool,
}

#[derive(Clone)]
pub struct DisplayPorts {
    pub bridge: CommandBridge,
    pub settings: Arc<dyn ISettingsStore>,
    pub broadcaster: Arc<dyn IBroadcaster>,
    pub access: Arc<dyn IAccessControl>,
}

// ============================================================================
// DisplayHandle
// ============================================================================

/// Caller-facing API of the display manager
#[derive(Clone)]
pub struct DisplayHandle {
    tx: mpsc::UnboundedSender<DisplayMsg>,
    access: Arc<dyn IAccessControl>,
    service_uid: Uid,
    max_framebuffers: usize,
    max_displays: usize,
}

impl DisplayHandle {
    fn post(&self, msg: DisplayMsg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| DisplayError::RemoteUnavailable("DisplayManager task has stopped".to_string()))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> DisplayMsg) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.post(make(tx))?;
        rx.await
            .map_err(|_| DisplayError::RemoteUnavailable("DisplayManager response lost".to_string()))
    }

    fn check_fb(&self, fb: usize) -> Result<()> {
        if fb >= self.max_framebuffers {
            return Err(DisplayError::InvariantViolation(format!(
                "framebuffer {fb} out of range (max {})",
                self.max_framebuffers
            )));
        }
        Ok(())
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.max_displays {
            return Err(DisplayError::InvariantViolation(format!(
                "display {slot} out of range (max {})",
                self.max_displays
            )));
        }
        Ok(())
    }

    fn authorize(&self, caller: &CallerId, slot: usize) -> Result<()> {
        if caller.uid != self.service_uid
            && !self.access.check(caller, Permission::ChangeDisplayState)
        {
            warn!(%caller, slot, "Display change denied");
            return Err(DisplayError::PermissionDenied {
                caller: *caller,
                permission: Permission::ChangeDisplayState,
            });
        }
        self.check_slot(slot)
    }

    /// Feeds a raw daemon event; returns false for codes that are not
    /// attach/detach events
    pub fn daemon_event(&self, code: u32, fb: usize) -> Result<bool> {
        match code {
            EVENT_INTERFACE_CONNECTED => self.interface_connected(fb).map(|_| true),
            EVENT_INTERFACE_DISCONNECTED => self.interface_disconnected(fb).map(|_| true),
            _ => Ok(false),
        }
    }

    pub fn interface_connected(&self, fb: usize) -> Result<()> {
        self.check_fb(fb)?;
        self.post(DisplayMsg::Connected(fb))
    }

    pub fn interface_disconnected(&self, fb: usize) -> Result<()> {
        self.check_fb(fb)?;
        self.post(DisplayMsg::Disconnected(fb))
    }

    pub fn set_enable(&self, caller: &CallerId, slot: usize, enable: bool) -> Result<bool> {
        self.authorize(caller, slot)?;
        self.post(DisplayMsg::SetEnable { slot, enable })?;
        Ok(true)
    }

    pub fn set_mirror(&self, caller: &CallerId, slot: usize, mirror: bool) -> Result<bool> {
        self.authorize(caller, slot)?;
        self.post(DisplayMsg::SetMirror { slot, mirror })?;
        Ok(true)
    }

    pub fn set_rotation(&self, caller: &CallerId, slot: usize, rotated: bool) -> Result<bool> {
        self.authorize(caller, slot)?;
        self.post(DisplayMsg::SetRotation { slot, rotated })?;
        Ok(true)
    }

    pub fn set_overscan(&self, caller: &CallerId, slot: usize, ratio: i32) -> Result<bool> {
        self.authorize(caller, slot)?;
        self.post(DisplayMsg::SetOverscan { slot, ratio })?;
        Ok(true)
    }

    /// Requests a mode; the string must parse as a display mode
    pub fn set_mode(&self, caller: &CallerId, slot: usize, mode: &str) -> Result<bool> {
        self.authorize(caller, slot)?;
        mode.parse::<DisplayMode>()?;
        self.post(DisplayMsg::SetMode {
            slot,
            mode: mode.to_string(),
        })?;
        Ok(true)
    }

    pub fn set_color_depth(&self, caller: &CallerId, slot: usize, depth: u32) -> Result<bool> {
        self.authorize(caller, slot)?;
        self.post(DisplayMsg::SetColorDepth { slot, depth })?;
        Ok(true)
    }

    pub async fn settings(&self, slot: usize) -> Result<DisplaySettings> {
        self.check_slot(slot)?;
        self.request(|reply| DisplayMsg::Settings { slot, reply }).await
    }

    pub async fn enabled(&self, slot: usize) -> Result<bool> {
        Ok(self.settings(slot).await?.enabled)
    }

    pub async fn mirror(&self, slot: usize) -> Result<bool> {
        Ok(self.settings(slot).await?.mirror)
    }

    pub async fn rotation(&self, slot: usize) -> Result<bool> {
        Ok(self.settings(slot).await?.rotation)
    }

    pub async fn overscan(&self, slot: usize) -> Result<i32> {
        Ok(self.settings(slot).await?.overscan)
    }

    pub async fn mode(&self, slot: usize) -> Result<Option<String>> {
        Ok(self.settings(slot).await?.mode)
    }

    pub async fn color_depth(&self, slot: usize) -> Result<u32> {
        Ok(self.settings(slot).await?.color_depth)
    }

    /// Modes the daemon offered when the slot was last attached
    pub async fn mode_list(&self, slot: usize) -> Result<Vec<String>> {
        self.check_slot(slot)?;
        self.request(|reply| DisplayMsg::ModeList { slot, reply }).await
    }

    pub async fn snapshot(&self) -> Result<DisplaySnapshot> {
        self.request(|reply| DisplayMsg::Snapshot { reply }).await
    }
}

// ============================================================================
// DisplayManager
// ============================================================================

pub struct DisplayManager {
    config: DisplayConfig,
    ports: DisplayPorts,
    config_file: ConfigFile,
    tx: mpsc::UnboundedSender<DisplayMsg>,
    rx: mpsc::UnboundedReceiver<DisplayMsg>,

    slots: SlotMap,
    displays: Vec<DisplaySettings>,
    mode_lists: Vec<Vec<String>>,
    plugged: bool,
    unplug: TimerSlot,
}

impl DisplayManager {
    pub fn new(config: DisplayConfig, ports: DisplayPorts, service_uid: Uid) -> (Self, DisplayHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = DisplayHandle {
            tx: tx.clone(),
            access: Arc::clone(&ports.access),
            service_uid,
            max_framebuffers: config.max_framebuffers,
            max_displays: config.max_displays,
        };
        let manager = Self {
            slots: SlotMap::new(config.max_framebuffers, config.max_displays),
            displays: vec![DisplaySettings::default(); config.max_displays],
            mode_lists: vec![Vec::new(); config.max_displays],
            config_file: ConfigFile::new(config.config_file.clone()),
            config,
            ports,
            tx,
            rx,
            plugged: false,
            unplug: TimerSlot::new(),
        };
        (manager, handle)
    }

    /// Loads per-slot settings, then the primary display's config file
    pub async fn load_settings(&mut self) {
        let settings = &self.ports.settings;
        for (slot, entry) in self.displays.iter_mut().enumerate() {
            let mode = settings.get_string(&settings_key(slot, MODE), "").await;
            *entry = DisplaySettings {
                mode: (!mode.is_empty()).then_some(mode),
                enabled: settings.get_bool(&settings_key(slot, ENABLE), false).await,
                mirror: settings.get_bool(&settings_key(slot, MIRROR), false).await,
                rotation: settings.get_bool(&settings_key(slot, ROTATION), false).await,
                overscan: int_setting(settings.as_ref(), &settings_key(slot, OVERSCAN), 0).await,
                color_depth: int_setting(settings.as_ref(), &settings_key(slot, COLORDEPTH), 0).await,
            };
            debug!(slot, mode = ?entry.mode, enabled = entry.enabled, "Display settings loaded");
        }

        match self.config_file.load().await {
            Ok(Some(primary)) => {
                if let Some(display) = self.displays.first_mut() {
                    if let Some(mode) = primary.mode {
                        display.mode = Some(mode);
                    }
                    if let Some(depth) = primary.color_depth {
                        display.color_depth = depth;
                    }
                }
            }
            Ok(None) => debug!(path = %self.config_file.path().display(), "No primary display config"),
            Err(e) => warn!(error = %e, "Ignoring primary display config"),
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            framebuffers = self.config.max_framebuffers,
            displays = self.config.max_displays,
            "Display manager running"
        );
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
            }
        }
        self.unplug.cancel();
        info!("Display manager stopped");
    }

    async fn handle(&mut self, msg: DisplayMsg) {
        match msg {
            DisplayMsg::Connected(fb) => self.on_connected(fb).await,
            DisplayMsg::Disconnected(fb) => self.on_disconnected(fb).await,
            DisplayMsg::SetEnable { slot, enable } => self.command_enable(slot, enable, true).await,
            DisplayMsg::SetMirror { slot, mirror } => self.set_mirror(slot, mirror).await,
            DisplayMsg::SetRotation { slot, rotated } => self.set_rotation(slot, rotated).await,
            DisplayMsg::SetOverscan { slot, ratio } => self.set_overscan(slot, ratio).await,
            DisplayMsg::SetMode { slot, mode } => self.set_mode(slot, mode).await,
            DisplayMsg::SetColorDepth { slot, depth } => self.set_color_depth(slot, depth).await,
            DisplayMsg::Settings { slot, reply } => {
                let _ = reply.send(self.displays[slot].clone());
            }
            DisplayMsg::ModeList { slot, reply } => {
                let _ = reply.send(self.mode_lists[slot].clone());
            }
            DisplayMsg::Snapshot { reply } => {
                let _ = reply.send(DisplaySnapshot {
                    slots: self.slots.clone(),
                    displays: self.displays.clone(),
                    plugged: self.plugged,
                    unplug_pending: self.unplug.is_pending(),
                });
            }
            DisplayMsg::DebouncedUnplug(id) => {
                if self.unplug.fire(id) {
                    self.deliver_plugged(false).await;
                }
            }
        }
    }

    async fn broadcast(&self, event: Broadcast) {
        if let Err(e) = self.ports.broadcaster.broadcast(event).await {
            warn!(error = %e, "Display broadcast failed");
        }
    }

    // ------------------------------------------------------------------------
    // Attach / detach
    // ------------------------------------------------------------------------

    async fn on_connected(&mut self, fb: usize) {
        let slot = match self.slots.connect(fb) {
            Ok(SlotChange::Attached(slot)) => slot,
            Ok(_) => {
                debug!(fb, "Framebuffer already connected");
                return;
            }
            Err(e) => {
                warn!(fb, error = %e, "Ignoring connect event");
                return;
            }
        };
        info!(fb, ?slot, "Framebuffer connected");

        if fb != 0 {
            self.update_plugged(true).await;
        }
        match slot {
            Some(slot) => self.attach_slot(fb, slot).await,
            None => warn!(fb, "No free display slot"),
        }
    }

    async fn attach_slot(&mut self, fb: usize, slot: usize) {
        self.select_default_mode(fb, slot).await;
        self.broadcast(Broadcast::DisplayAttached {
            slot,
            connected: true,
        })
        .await;
        if slot > 0 && self.displays[slot].enabled {
            self.command_enable(slot, true, false).await;
        }
    }

    async fn select_default_mode(&mut self, fb: usize, slot: usize) {
        let modes = match self.ports.bridge.list_modes(fb).await {
            Ok(modes) => modes,
            Err(e) => {
                warn!(fb, slot, error = %e, "Keeping configured mode");
                return;
            }
        };
        let requested = self.displays[slot].mode.clone();
        let choice = choose_default_mode(requested.as_deref(), &modes);
        self.mode_lists[slot] = modes;

        let Some(choice) = choice else {
            warn!(fb, slot, "Daemon offered no modes");
            return;
        };
        match &choice.reason {
            ModeChoiceReason::ParseFailure(e) => {
                warn!(slot, error = %e, mode = %choice.mode, "Mode parse failed, using first listed")
            }
            reason => debug!(slot, ?reason, mode = %choice.mode, "Default mode selected"),
        }
        self.displays[slot].mode = Some(choice.mode);
    }

    async fn on_disconnected(&mut self, fb: usize) {
        let slot = match self.slots.display_for(fb) {
            Ok(slot) if self.slots.is_connected(fb).unwrap_or(false) => slot,
            Ok(_) => {
                debug!(fb, "Framebuffer not connected");
                return;
            }
            Err(e) => {
                warn!(fb, error = %e, "Ignoring disconnect event");
                return;
            }
        };
        info!(fb, ?slot, "Framebuffer disconnected");

        if let Some(slot) = slot {
            self.broadcast(Broadcast::DisplayAttached {
                slot,
                connected: false,
            })
            .await;
            if slot > 0 && self.displays[slot].enabled {
                self.command_enable(slot, false, false).await;
            }
        }
        if let Err(e) = self.slots.disconnect(fb) {
            warn!(fb, error = %e, "Disconnect failed");
        }

        if self.slots.pluggable_count() <= 1 {
            self.update_plugged(false).await;
        }
    }

    /// Connected is delivered at once; disconnected after the debounce
    async fn update_plugged(&mut self, connected: bool) {
        self.unplug.cancel();
        if connected {
            self.deliver_plugged(true).await;
        } else {
            let handle = schedule(
                &self.tx,
                self.config.disconnect_debounce(),
                DisplayMsg::DebouncedUnplug,
            );
            self.unplug.arm(handle);
        }
    }

    async fn deliver_plugged(&mut self, connected: bool) {
        if self.plugged == connected {
            return;
        }
        self.plugged = connected;
        info!(connected, "Pluggable display state changed");
        self.broadcast(Broadcast::DisplayPlugged { connected }).await;
    }

    // ------------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------------

    fn framebuffer(&self, slot: usize) -> Option<usize> {
        self.slots.framebuffer_for(slot).ok().flatten()
    }

    /// Framebuffer to command, if the slot is enabled and attached
    fn active_framebuffer(&self, slot: usize) -> Option<usize> {
        if !self.displays[slot].enabled {
            return None;
        }
        let fb = self.framebuffer(slot);
        if fb.is_none() {
            debug!(slot, "Slot enabled but not attached");
        }
        fb
    }

    async fn persist(&self, slot: usize, field: &str, value: &str) {
        let key = settings_key(slot, field);
        if let Err(e) = self.ports.settings.put(&key, value).await {
            warn!(key = %key, error = %e, "Failed to persist display setting");
        }
    }

    async fn persist_flag(&self, slot: usize, field: &str, value: bool) {
        self.persist(slot, field, if value { "1" } else { "0" }).await;
    }

    async fn persist_primary(&self) {
        let display = &self.displays[0];
        if let Err(e) = self
            .config_file
            .store(display.mode.as_deref(), display.color_depth)
            .await
        {
            warn!(error = %e, "Failed to write primary display config");
        }
    }

    fn log_command(slot: usize, result: Result<()>) {
        if let Err(e) = result {
            warn!(slot, error = %e, "Display command failed");
        }
    }

    async fn command_enable(&mut self, slot: usize, enable: bool, persist: bool) {
        if persist {
            self.displays[slot].enabled = enable;
        }
        info!(slot, enable, persist, "Display enable");

        if let Some(fb) = self.framebuffer(slot) {
            let bridge = &self.ports.bridge;
            if enable {
                Self::log_command(slot, bridge.enable(fb, &self.displays[slot]).await);
                self.broadcast(Broadcast::HdmiAudioPlug { plugged: true }).await;
            } else {
                self.broadcast(Broadcast::HdmiAudioPlug { plugged: false }).await;
                Self::log_command(slot, bridge.disable(fb).await);
            }
        } else {
            debug!(slot, "Slot not attached, no command sent");
        }

        if persist {
            let display = self.displays[slot].clone();
            self.persist_flag(slot, ENABLE, enable).await;
            self.persist_flag(slot, MIRROR, display.mirror).await;
            self.persist_flag(slot, ROTATION, display.rotation).await;
            self.persist(slot, OVERSCAN, &display.overscan.to_string()).await;
            self.persist(slot, MODE, display.mode.as_deref().unwrap_or_default())
                .await;
            self.persist(slot, COLORDEPTH, &display.color_depth.to_string())
                .await;
        }
    }

    async fn set_mirror(&mut self, slot: usize, mirror: bool) {
        if self.displays[slot].mirror == mirror {
            return;
        }
        self.displays[slot].mirror = mirror;
        if let Some(fb) = self.active_framebuffer(slot) {
            Self::log_command(slot, self.ports.bridge.set_mirror(fb, mirror).await);
        }
        self.persist_flag(slot, MIRROR, mirror).await;
    }

    async fn set_rotation(&mut self, slot: usize, rotated: bool) {
        if self.displays[slot].rotation == rotated {
            return;
        }
        self.displays[slot].rotation = rotated;
        if let Some(fb) = self.active_framebuffer(slot) {
            Self::log_command(slot, self.ports.bridge.set_rotation(fb, rotated).await);
        }
        self.persist_flag(slot, ROTATION, rotated).await;
    }

    async fn set_overscan(&mut self, slot: usize, ratio: i32) {
        if self.displays[slot].overscan == ratio {
            return;
        }
        self.displays[slot].overscan = ratio;
        if let Some(fb) = self.active_framebuffer(slot) {
            Self::log_command(slot, self.ports.bridge.set_overscan(fb, ratio).await);
        }
        self.persist(slot, OVERSCAN, &ratio.to_string()).await;
    }

    async fn set_mode(&mut self, slot: usize, mode: String) {
        if self.displays[slot].mode.as_deref() == Some(mode.as_str()) {
            return;
        }
        self.displays[slot].mode = Some(mode.clone());
        if let Some(fb) = self.active_framebuffer(slot) {
            Self::log_command(slot, self.ports.bridge.set_resolution(fb, &mode).await);
        }
        if slot == 0 {
            self.persist_primary().await;
        }
        self.persist(slot, MODE, &mode).await;
    }

    async fn set_color_depth(&mut self, slot: usize, depth: u32) {
        if self.displays[slot].color_depth == depth {
            return;
        }
        self.displays[slot].color_depth = depth;
        if let Some(fb) = self.active_framebuffer(slot) {
            Self::log_command(slot, self.ports.bridge.set_color_depth(fb, depth).await);
        }
        if slot == 0 {
            self.persist_primary().await;
        }
        self.persist(slot, COLORDEPTH, &depth.to_string()).await;
    }
}
