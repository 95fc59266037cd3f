//! Service orchestration
//!
//! `PppoeService` serializes enable/disable, start/stop and the idle policy
//! on one task. The public API lives on [`PppoeServiceHandle`]: every call
//! checks the caller's permission, enqueues work and returns an acceptance
//! result without waiting for the transition to finish.
//!
//! Idle policy, recomputed on every update-state:
//!
//! ```text
//!   enabled && (!idle || locks held)   → wakelock; start (driver stopped) or enable
//!   enabled && idle && no locks        → driver-stop wakelock; stop; release later
//!   !enabled                           → wakelock; disable
//! ```

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use chrono::{DateTime, Utc};
use linkmgr_core::{
    config::ServiceConfig,
    domain::{CallerId, PppoeAccount, PppoeState, Uid, WorkSource},
    ports::{Broadcast, IAccessControl, IBroadcaster, ISettingsStore, IWakeLockBackend, Permission},
    timer::{schedule, TimerId, TimerSlot},
};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{LinkError, Result},
    keys,
    lock_registry::{LockActivity, LockHandle, LockInfo, LockRegistry, LockStats, OwnerBinding},
    tracker::{TrackerHandle, TrackerSnapshot},
    wakelock::WakeLock,
};

// ============================================================================
// ServiceMsg
// ============================================================================

#[derive(Debug)]
pub enum ServiceMsg {
    Enable { enable: bool, persist: bool, uid: Uid },
    Start,
    Stop,
    UpdateState,
    ReleaseDriverStopWakeLock,
    EnableNetworks,
    ReportWorkSource,
    ScreenOn,
    ScreenOff,
    DeviceIdle(TimerId),
    BatteryChanged { plugged: u32 },
    Dump { reply: oneshot::Sender<ServiceDump> },
}

/// Service state as shown in dumps
#[derive(Debug, Clone, Serialize)]
pub struct ServiceDump {
    pub enabled_state: PppoeState,
    pub stay_awake_conditions: i64,
    pub screen_off: bool,
    pub device_idle: bool,
    pub plugged: u32,
    pub wakelock_held: bool,
    pub tracker: TrackerSnapshot,
    pub locks: LockStats,
    pub held_locks: Vec<LockInfo>,
    pub taken_at: DateTime<Utc>,
}

/// True if the plug type is one of the stay-awake conditions
pub fn should_stay_awake(conditions: i64, plugged: u32) -> bool {
    conditions & i64::from(plugged) != 0
}

// ============================================================================
// Collaborators
// ============================================================================

#[derive(Clone)]
pub struct ServicePorts {
    pub tracker: TrackerHandle,
    pub settings: Arc<dyn ISettingsStore>,
    pub broadcaster: Arc<dyn IBroadcaster>,
    pub access: Arc<dyn IAccessControl>,
    pub wakelock: Arc<dyn IWakeLockBackend>,
}

// ============================================================================
// PppoeServiceHandle
// ============================================================================

/// Caller-facing API of the link service
#[derive(Clone)]
pub struct PppoeServiceHandle {
    tx: mpsc::UnboundedSender<ServiceMsg>,
    registry: Arc<LockRegistry>,
    tracker: TrackerHandle,
    settings: Arc<dyn ISettingsStore>,
    access: Arc<dyn IAccessControl>,
    wakelock: WakeLock,
    service_uid: Uid,
    last_enable_uid: Arc<AtomicU32>,
}

impl PppoeServiceHandle {
    fn post(&self, msg: ServiceMsg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| LinkError::RemoteUnavailable("PppoeService task has stopped".to_string()))
    }

    fn enforce(&self, caller: &CallerId, permission: Permission) -> Result<()> {
        if caller.uid == self.service_uid || self.access.check(caller, permission) {
            return Ok(());
        }
        warn!(%caller, %permission, "Permission denied");
        Err(LinkError::PermissionDenied {
            caller: *caller,
            permission,
        })
    }

    fn enforce_work_source(&self, caller: &CallerId, ws: &Option<WorkSource>) -> Result<()> {
        if ws.is_some() && caller.uid != self.service_uid {
            self.enforce(caller, Permission::UpdateDeviceStats)?;
        }
        Ok(())
    }

    /// Queues an enable or disable; the setting is persisted
    pub async fn set_enabled(&self, caller: &CallerId, enable: bool) -> Result<bool> {
        self.enforce(caller, Permission::ChangePppoeState)?;
        info!(%caller, enable, "Set enabled requested");
        self.wakelock.acquire().await;
        self.last_enable_uid
            .store(caller.uid.as_raw(), Ordering::SeqCst);
        if let Err(e) = self.post(ServiceMsg::Enable {
            enable,
            persist: true,
            uid: caller.uid,
        }) {
            self.wakelock.release().await;
            return Err(e);
        }
        Ok(true)
    }

    /// Stores the account and hands it to the tracker
    pub async fn set_account(
        &self,
        caller: &CallerId,
        username: &str,
        password: &str,
    ) -> Result<bool> {
        self.enforce(caller, Permission::ChangePppoeState)?;
        self.persist_account(username, password).await;
        self.tracker
            .set_account(PppoeAccount::new(username, password))?;
        info!(%caller, user = username, "Account set");
        Ok(true)
    }

    pub async fn remove_account(&self, caller: &CallerId) -> Result<bool> {
        self.enforce(caller, Permission::ChangePppoeState)?;
        self.persist_account("", "").await;
        self.tracker.remove_account()?;
        info!(%caller, "Account removed");
        Ok(true)
    }

    async fn persist_account(&self, username: &str, password: &str) {
        for (key, value) in [(keys::PPPOE_USERNAME, username), (keys::PPPOE_PASSWORD, password)] {
            if let Err(e) = self.settings.put(key, value).await {
                warn!(key, error = %e, "Failed to persist account");
            }
        }
    }

    pub fn enabled_state(&self, caller: &CallerId) -> Result<PppoeState> {
        self.enforce(caller, Permission::AccessPppoeState)?;
        Ok(self.tracker.pppoe_state())
    }

    /// Tears the session down until [`reconnect`](Self::reconnect)
    pub async fn disconnect(&self, caller: &CallerId) -> Result<bool> {
        self.enforce(caller, Permission::ChangePppoeState)?;
        self.tracker.teardown().await
    }

    pub async fn reconnect(&self, caller: &CallerId) -> Result<bool> {
        self.enforce(caller, Permission::ChangePppoeState)?;
        self.tracker.reconnect().await
    }

    /// Creates and acquires a keep-awake lock owned by `owner`
    pub fn acquire_lock(
        &self,
        caller: &CallerId,
        owner: &OwnerBinding,
        tag: &str,
        ref_counted: bool,
        work_source: Option<WorkSource>,
    ) -> Result<LockHandle> {
        self.enforce(caller, Permission::WakeLock)?;
        let ws = WorkSource::non_empty(work_source);
        self.enforce_work_source(caller, &ws)?;

        let handle = self
            .registry
            .new_lock(*caller, owner, tag, ref_counted, ws);
        handle.acquire()?;
        Ok(handle)
    }

    pub fn release_lock(&self, caller: &CallerId, handle: &LockHandle) -> Result<()> {
        self.enforce(caller, Permission::WakeLock)?;
        handle.release()
    }

    pub fn update_lock_work_source(
        &self,
        caller: &CallerId,
        handle: &LockHandle,
        work_source: Option<WorkSource>,
    ) -> Result<()> {
        let ws = WorkSource::non_empty(work_source);
        self.enforce_work_source(caller, &ws)?;
        if !handle.is_held() {
            return Err(LinkError::InvariantViolation("lock not active".to_string()));
        }
        handle.set_work_source(ws)
    }

    /// Boot-time start from the persisted flags
    pub async fn start_pppoe(&self) -> Result<bool> {
        let mut enabled = self.settings.get_int(keys::PPPOE_ON, 0).await == 1;
        if !enabled && self.settings.get_int(keys::PPPOE_SAVED_STATE, 0).await == 1 {
            enabled = true;
            if let Err(e) = self.settings.put_int(keys::PPPOE_SAVED_STATE, 0).await {
                warn!(error = %e, "Failed to clear saved state");
            }
        }
        info!(enabled, "PPPoE boot start");
        let me = CallerId::new(self.service_uid, std::process::id());
        self.set_enabled(&me, enabled).await
    }

    pub fn screen_on(&self) -> Result<()> {
        self.post(ServiceMsg::ScreenOn)
    }

    pub fn screen_off(&self) -> Result<()> {
        self.post(ServiceMsg::ScreenOff)
    }

    pub fn battery_changed(&self, plugged: u32) -> Result<()> {
        self.post(ServiceMsg::BatteryChanged { plugged })
    }

    pub async fn dump(&self) -> Result<ServiceDump> {
        let (tx, rx) = oneshot::channel();
        self.post(ServiceMsg::Dump { reply: tx })?;
        rx.await
            .map_err(|_| LinkError::RemoteUnavailable("PppoeService response lost".to_string()))
    }

    pub fn tracker(&self) -> &TrackerHandle {
        &self.tracker
    }

    pub fn registry(&self) -> &Arc<LockRegistry> {
        &self.registry
    }
}

// ============================================================================
// PppoeService
// ============================================================================

pub struct PppoeService {
    config: ServiceConfig,
    ports: ServicePorts,
    registry: Arc<LockRegistry>,
    wakelock: WakeLock,
    driver_stop_wakelock: WakeLock,

    tx: mpsc::UnboundedSender<ServiceMsg>,
    rx: mpsc::UnboundedReceiver<ServiceMsg>,
    activity_rx: mpsc::UnboundedReceiver<LockActivity>,
    last_enable_uid: Arc<AtomicU32>,

    receivers_registered: bool,
    screen_off: bool,
    device_idle: bool,
    plugged: u32,
    idle_alarm: TimerSlot,
}

impl PppoeService {
    pub fn new(
        config: ServiceConfig,
        ports: ServicePorts,
        service_uid: Uid,
    ) -> (Self, PppoeServiceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (activity_tx, activity_rx) = mpsc::unbounded_channel();
        let registry = LockRegistry::new(config.max_active_locks, activity_tx);
        let wakelock = WakeLock::new(config.wakelock_tag.clone(), Arc::clone(&ports.wakelock));
        let driver_stop_wakelock = WakeLock::new(
            format!("{}.driver_stop", config.wakelock_tag),
            Arc::clone(&ports.wakelock),
        );
        let last_enable_uid = Arc::new(AtomicU32::new(service_uid.as_raw()));

        ports.tracker.set_pppoe_state(PppoeState::Disabled);

        let handle = PppoeServiceHandle {
            tx: tx.clone(),
            registry: Arc::clone(&registry),
            tracker: ports.tracker.clone(),
            settings: Arc::clone(&ports.settings),
            access: Arc::clone(&ports.access),
            wakelock: wakelock.clone(),
            service_uid,
            last_enable_uid: Arc::clone(&last_enable_uid),
        };

        let service = Self {
            config,
            ports,
            registry,
            wakelock,
            driver_stop_wakelock,
            tx,
            rx,
            activity_rx,
            last_enable_uid,
            receivers_registered: false,
            screen_off: false,
            device_idle: false,
            plugged: 0,
            idle_alarm: TimerSlot::new(),
        };
        (service, handle)
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("PPPoE service running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => self.handle(msg).await,
                    None => break,
                },
                Some(activity) = self.activity_rx.recv() => self.handle_activity(activity).await,
            }
        }
        self.idle_alarm.cancel();
        info!("PPPoE service stopped");
    }

    fn post_self(&self, msg: ServiceMsg) {
        let _ = self.tx.send(msg);
    }

    fn last_enable_uid(&self) -> Uid {
        Uid::new(self.last_enable_uid.load(Ordering::SeqCst))
    }

    async fn stay_awake_conditions(&self) -> i64 {
        self.ports
            .settings
            .get_int(keys::STAY_ON_WHILE_PLUGGED_IN, 0)
            .await
    }

    async fn handle(&mut self, msg: ServiceMsg) {
        match msg {
            ServiceMsg::Enable {
                enable,
                persist,
                uid,
            } => {
                self.set_enabled_blocking(enable, persist, uid).await;
                self.wakelock.release().await;
            }
            ServiceMsg::Start => {
                self.report_work_source().await;
                if let Err(e) = self.ports.tracker.restart().await {
                    warn!(error = %e, "Restart failed");
                }
                self.wakelock.release().await;
            }
            ServiceMsg::Stop => {
                if let Err(e) = self.ports.tracker.disconnect_and_stop().await {
                    warn!(error = %e, "Stop failed");
                }
            }
            ServiceMsg::UpdateState => self.update_state().await,
            ServiceMsg::ReleaseDriverStopWakeLock => self.driver_stop_wakelock.release().await,
            ServiceMsg::EnableNetworks => {
                if let Err(e) = self.ports.tracker.enable_networks().await {
                    warn!(error = %e, "Enable networks failed");
                }
            }
            ServiceMsg::ReportWorkSource => self.report_work_source().await,
            ServiceMsg::ScreenOn => self.on_screen_on().await,
            ServiceMsg::ScreenOff => self.on_screen_off().await,
            ServiceMsg::DeviceIdle(id) => {
                if self.idle_alarm.fire(id) {
                    self.on_device_idle().await;
                }
            }
            ServiceMsg::BatteryChanged { plugged } => self.on_battery_changed(plugged).await,
            ServiceMsg::Dump { reply } => {
                let dump = self.dump().await;
                let _ = reply.send(dump);
            }
        }
    }

    async fn handle_activity(&mut self, activity: LockActivity) {
        debug!(?activity, "Lock activity");
        match activity {
            LockActivity::Acquired(_) => {
                self.report_work_source().await;
                self.update_state().await;
            }
            LockActivity::Released(_) => self.update_state().await,
            LockActivity::WorkSourceChanged(_) => self.report_work_source().await,
        }
    }

    // ------------------------------------------------------------------------
    // Enable / disable
    // ------------------------------------------------------------------------

    async fn set_enabled_blocking(&mut self, enable: bool, persist: bool, uid: Uid) -> bool {
        let eventual = if enable {
            PppoeState::Enabled
        } else {
            PppoeState::Disabled
        };
        let current = self.ports.tracker.pppoe_state();
        info!(%current, %eventual, persist, %uid, "Set enabled");

        if current == eventual {
            return true;
        }
        if current == PppoeState::Unknown && !enable {
            return false;
        }

        self.set_enabled_state(if enable {
            PppoeState::Enabling
        } else {
            PppoeState::Disabling
        })
        .await;

        let tracker = &self.ports.tracker;
        if enable {
            self.receivers_registered = true;
            if let Err(e) = tracker.start_event_loop().await {
                warn!(error = %e, "Could not start tracker event loop");
            }
        } else {
            self.receivers_registered = false;
            self.idle_alarm.cancel();
            let steps = async {
                tracker.notify_disabled().await?;
                tracker.reset_connections().await?;
                tracker.stop_event_loop().await
            };
            if let Err(e) = steps.await {
                warn!(error = %e, "Could not stop tracker event loop");
            }
        }

        if persist {
            if let Err(e) = self.ports.settings.put_bool(keys::PPPOE_ON, enable).await {
                warn!(error = %e, "Failed to persist enabled flag");
            }
        }
        self.set_enabled_state(eventual).await;
        true
    }

    async fn set_enabled_state(&self, state: PppoeState) {
        let previous = self.ports.tracker.pppoe_state();
        if !previous.can_transition_to(&state) {
            warn!(%previous, %state, "Unexpected enabled-state edge");
        }
        self.ports.tracker.set_pppoe_state(state);
        info!(%previous, %state, "Enabled state changed");

        let event = Broadcast::PppoeStateChanged {
            state,
            previous: Some(previous),
        };
        if let Err(e) = self.ports.broadcaster.broadcast(event).await {
            warn!(error = %e, "Enabled-state broadcast failed");
        }
    }

    // ------------------------------------------------------------------------
    // Idle policy
    // ------------------------------------------------------------------------

    async fn update_state(&mut self) {
        let enabled = self.ports.settings.get_bool(keys::PPPOE_ON, false).await;
        let lock_held = self.registry.has_locks();
        let should_start = !self.device_idle || lock_held;
        let tracker = &self.ports.tracker;

        if tracker.pppoe_state() == PppoeState::Enabling {
            return;
        }
        debug!(enabled, lock_held, device_idle = self.device_idle, "Update state");

        if enabled {
            if should_start {
                self.wakelock.acquire().await;
                if tracker.is_driver_stopped() {
                    self.post_self(ServiceMsg::Start);
                } else {
                    self.post_self(ServiceMsg::Enable {
                        enable: true,
                        persist: false,
                        uid: self.last_enable_uid(),
                    });
                }
            } else if !tracker.is_driver_stopped() {
                info!(
                    timeout_ms = self.config.wakelock_timeout_ms,
                    "Device idle, stopping link"
                );
                self.driver_stop_wakelock.acquire().await;
                self.post_self(ServiceMsg::Stop);
                schedule(&self.tx, self.config.wakelock_timeout(), |_| {
                    ServiceMsg::ReleaseDriverStopWakeLock
                });
            }
        } else {
            self.wakelock.acquire().await;
            self.post_self(ServiceMsg::Enable {
                enable: false,
                persist: false,
                uid: self.last_enable_uid(),
            });
        }
    }

    async fn report_work_source(&self) {
        let ws = if self.device_idle {
            self.registry.combined_work_source()
        } else {
            WorkSource::new()
        };
        self.wakelock.set_work_source(ws).await;
    }

    fn arm_idle_alarm(&mut self) {
        debug!(idle_ms = self.config.idle_ms, "Arming device-idle alarm");
        let handle = schedule(&self.tx, self.config.idle_timeout(), ServiceMsg::DeviceIdle);
        self.idle_alarm.arm(handle);
    }

    async fn on_screen_on(&mut self) {
        if !self.receivers_registered {
            return;
        }
        debug!("Screen on");
        self.idle_alarm.cancel();
        self.device_idle = false;
        self.screen_off = false;
        self.report_work_source().await;
        if self.ports.tracker.is_any_network_disabled() {
            self.post_self(ServiceMsg::EnableNetworks);
        }
        self.update_state().await;
    }

    async fn on_screen_off(&mut self) {
        if !self.receivers_registered {
            return;
        }
        debug!("Screen off");
        self.screen_off = true;
        let conditions = self.stay_awake_conditions().await;
        if !should_stay_awake(conditions, self.plugged) {
            self.arm_idle_alarm();
        }
    }

    async fn on_device_idle(&mut self) {
        if !self.receivers_registered {
            return;
        }
        info!("Device idle");
        self.device_idle = true;
        self.report_work_source().await;
        self.update_state().await;
    }

    async fn on_battery_changed(&mut self, plugged: u32) {
        // Plug state is sticky: remember it even while not enabled.
        if !self.receivers_registered {
            self.plugged = plugged;
            return;
        }
        debug!(plugged, "Battery changed");
        let conditions = self.stay_awake_conditions().await;
        if self.screen_off
            && should_stay_awake(conditions, self.plugged)
            && !should_stay_awake(conditions, plugged)
        {
            self.arm_idle_alarm();
            self.plugged = plugged;
            return;
        }
        self.plugged = plugged;
        self.update_state().await;
    }

    async fn dump(&self) -> ServiceDump {
        ServiceDump {
            enabled_state: self.ports.tracker.pppoe_state(),
            stay_awake_conditions: self.stay_awake_conditions().await,
            screen_off: self.screen_off,
            device_idle: self.device_idle,
            plugged: self.plugged,
            wakelock_held: self.wakelock.is_held().await,
            tracker: self.ports.tracker.snapshot(),
            locks: self.registry.stats(),
            held_locks: self.registry.snapshot(),
            taken_at: Utc::now(),
        }
    }
}
