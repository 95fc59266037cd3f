//! PPPoE link state machine
//!
//! `LinkTracker` owns the session: it reacts to physical link changes,
//! account changes, IP-poll results and session-interface add/remove
//! events, drives the external session process and broadcasts detailed
//! state. All of it runs on one task; callers talk to it through a
//! cloneable [`TrackerHandle`].
//!
//! ```text
//!  link monitor ──► TrackerObserver ─┐
//!  IP-poll worker ── PollReport ─────┤
//!  TrackerHandle ── requests ────────┼──► mpsc ──► LinkTracker::run
//!  timers ── DeferredDisconnect ─────┘                  │
//!                                                       ├─► ISessionProcess
//!                                                       ├─► IBroadcaster
//!                                                       └─► Shared (run state,
//!                                                            pppoe state, snapshot)
//! ```
//!
//! Run state, pppoe state and the snapshot live in [`Shared`] behind a
//! mutex so the service can read them without a round trip.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use linkmgr_core::{
    config::PppoeConfig,
    domain::{DetailedState, LinkEvent, PppoeAccount, PppoeState, RunState},
    ports::{
        Broadcast, IBroadcaster, ILinkMonitor, ILinkObserver, IPropertyStore, ISessionProcess,
        ISettingsStore,
    },
    timer::{schedule, TimerId, TimerSlot},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{LinkError, Result},
    ip_poll::{IpPollHandle, IpPollWorker, PollId, PollOutcome, PollReport, PollSettings},
    keys, lock,
};

// ============================================================================
// Settings and collaborators
// ============================================================================

/// Interface names, property names and timing for the tracker
#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub interface: String,
    pub session_interface: String,
    pub exit_code_property: String,
    pub dns_properties: Vec<String>,
    pub poll: PollSettings,
    pub disconnect_delay: Duration,
}

impl TrackerSettings {
    pub fn from_config(cfg: &PppoeConfig) -> Self {
        Self {
            interface: cfg.interface.clone(),
            session_interface: cfg.session_interface.clone(),
            exit_code_property: cfg.exit_code_property.clone(),
            dns_properties: cfg.dns_properties.clone(),
            poll: PollSettings {
                exit_code_property: cfg.exit_code_property.clone(),
                dns_property: cfg.primary_dns_property().to_string(),
                interval: cfg.poll_interval(),
                max_attempts: cfg.max_poll_attempts,
            },
            disconnect_delay: cfg.disconnect_delay(),
        }
    }

    /// True for the session interface and its numbered siblings (`ppp0`, `ppp1`, ...)
    pub fn is_session_interface(&self, iface: &str) -> bool {
        if iface == self.session_interface {
            return true;
        }
        let prefix = self.session_interface.trim_end_matches(|c: char| c.is_ascii_digit());
        !prefix.is_empty() && iface.starts_with(prefix)
    }
}

/// Ports the tracker drives
#[derive(Clone)]
pub struct TrackerPorts {
    pub session: Arc<dyn ISessionProcess>,
    pub monitor: Arc<dyn ILinkMonitor>,
    pub props: Arc<dyn IPropertyStore>,
    pub settings: Arc<dyn ISettingsStore>,
    pub broadcaster: Arc<dyn IBroadcaster>,
}

// ============================================================================
// Shared state and snapshot
// ============================================================================

/// Tracker state as shown in dumps
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackerSnapshot {
    pub interface: String,
    pub run_state: RunState,
    pub pppoe_state: PppoeState,
    pub link_up: bool,
    pub have_ip_address: bool,
    pub obtaining_ip_address: bool,
    pub explicitly_disabled: bool,
    pub detailed_state: DetailedState,
    pub last_event: LinkEvent,
    pub any_network_disabled: bool,
    pub disconnect_pending: bool,
}

#[derive(Debug, Default)]
struct Shared {
    run_state: RunState,
    pppoe_state: PppoeState,
    any_network_disabled: bool,
    torn_down: bool,
    snapshot: TrackerSnapshot,
}

impl Shared {
    fn is_driver_stopped(&self) -> bool {
        self.run_state.is_stopped()
    }
}

// ============================================================================
// TrackerMsg
// ============================================================================

/// Messages processed by the tracker task
#[derive(Debug)]
pub enum TrackerMsg {
    Event(LinkEvent),
    SetAccount(PppoeAccount),
    RemoveAccount,
    Poll(PollReport),
    LinkStatus { iface: String, up: bool },
    InterfaceAdded(String),
    InterfaceRemoved(String),
    DeferredDisconnect(TimerId),
    StartEventLoop { reply: oneshot::Sender<()> },
    StopEventLoop { reply: oneshot::Sender<()> },
    NotifyDisabled { reply: oneshot::Sender<()> },
    ResetConnections { reply: oneshot::Sender<()> },
    DisconnectAndStop { reply: oneshot::Sender<bool> },
    Restart { reply: oneshot::Sender<bool> },
    Teardown { reply: oneshot::Sender<bool> },
    Reconnect { reply: oneshot::Sender<bool> },
    EnableNetworks { reply: oneshot::Sender<()> },
}

impl From<PollReport> for TrackerMsg {
    fn from(report: PollReport) -> Self {
        TrackerMsg::Poll(report)
    }
}

// ============================================================================
// TrackerHandle
// ============================================================================

/// Cloneable handle to the link tracker
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::UnboundedSender<TrackerMsg>,
    shared: Arc<Mutex<Shared>>,
    props: Arc<dyn IPropertyStore>,
    dns_properties: Vec<String>,
}

impl TrackerHandle {
    fn post(&self, msg: TrackerMsg) -> Result<()> {
        self.tx
            .send(msg)
            .map_err(|_| LinkError::RemoteUnavailable("LinkTracker task has stopped".to_string()))
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> TrackerMsg) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.post(make(tx))?;
        rx.await
            .map_err(|_| LinkError::RemoteUnavailable("LinkTracker response lost".to_string()))
    }

    /// Replaces the account; a running tracker re-runs the link-up path
    pub fn set_account(&self, account: PppoeAccount) -> Result<()> {
        self.post(TrackerMsg::SetAccount(account))
    }

    pub fn remove_account(&self) -> Result<()> {
        self.post(TrackerMsg::RemoveAccount)
    }

    /// Marks the run state unknown (Starting)
    pub fn notify_unknown(&self) -> Result<()> {
        self.post(TrackerMsg::Event(LinkEvent::Unknown))
    }

    pub async fn start_event_loop(&self) -> Result<()> {
        self.request(|reply| TrackerMsg::StartEventLoop { reply }).await
    }

    pub async fn stop_event_loop(&self) -> Result<()> {
        self.request(|reply| TrackerMsg::StopEventLoop { reply }).await
    }

    /// Runs the disabled path if the tracker is running
    pub async fn notify_disabled(&self) -> Result<()> {
        self.request(|reply| TrackerMsg::NotifyDisabled { reply }).await
    }

    pub async fn reset_connections(&self) -> Result<()> {
        self.request(|reply| TrackerMsg::ResetConnections { reply }).await
    }

    /// Stops the session unless already stopping; true if the driver was running
    pub async fn disconnect_and_stop(&self) -> Result<bool> {
        self.request(|reply| TrackerMsg::DisconnectAndStop { reply }).await
    }

    /// Restarts a stopped driver; false if the link is not enabled
    pub async fn restart(&self) -> Result<bool> {
        self.request(|reply| TrackerMsg::Restart { reply }).await
    }

    pub async fn teardown(&self) -> Result<bool> {
        self.request(|reply| TrackerMsg::Teardown { reply }).await
    }

    pub async fn reconnect(&self) -> Result<bool> {
        self.request(|reply| TrackerMsg::Reconnect { reply }).await
    }

    /// Clears the "a network is disabled" flag and retries the link-up path
    pub async fn enable_networks(&self) -> Result<()> {
        self.request(|reply| TrackerMsg::EnableNetworks { reply }).await
    }

    pub fn is_driver_stopped(&self) -> bool {
        lock(&self.shared).is_driver_stopped()
    }

    pub fn is_available(&self) -> bool {
        let shared = lock(&self.shared);
        shared.torn_down || !shared.is_driver_stopped()
    }

    pub fn run_state(&self) -> RunState {
        lock(&self.shared).run_state
    }

    pub fn pppoe_state(&self) -> PppoeState {
        lock(&self.shared).pppoe_state
    }

    pub fn set_pppoe_state(&self, state: PppoeState) {
        let mut shared = lock(&self.shared);
        shared.pppoe_state = state;
        shared.snapshot.pppoe_state = state;
    }

    pub fn is_any_network_disabled(&self) -> bool {
        lock(&self.shared).any_network_disabled
    }

    pub fn has_ip_address(&self) -> bool {
        lock(&self.shared).snapshot.have_ip_address
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        lock(&self.shared).snapshot.clone()
    }

    /// DNS servers currently published by the session process
    pub async fn name_servers(&self) -> Vec<String> {
        let mut servers = Vec::new();
        for key in &self.dns_properties {
            match self.props.get(key).await {
                Ok(Some(v)) if !v.is_empty() => servers.push(v),
                Ok(_) => {}
                Err(e) => warn!(key = %key, error = %e, "DNS property read failed"),
            }
        }
        servers
    }
}

// ============================================================================
// Link observer
// ============================================================================

/// Forwards link monitor callbacks into the tracker queue
struct TrackerObserver {
    tx: mpsc::UnboundedSender<TrackerMsg>,
}

impl TrackerObserver {
    fn forward(&self, msg: TrackerMsg) {
        if self.tx.send(msg).is_err() {
            debug!("Link event dropped, tracker stopped");
        }
    }
}

impl ILinkObserver for TrackerObserver {
    fn link_status_changed(&self, iface: &str, up: bool) {
        self.forward(TrackerMsg::LinkStatus {
            iface: iface.to_string(),
            up,
        });
    }

    fn interface_added(&self, iface: &str) {
        self.forward(TrackerMsg::InterfaceAdded(iface.to_string()));
    }

    fn interface_removed(&self, iface: &str) {
        self.forward(TrackerMsg::InterfaceRemoved(iface.to_string()));
    }
}

// ============================================================================
// LinkTracker
// ============================================================================

pub struct LinkTracker {
    settings: TrackerSettings,
    ports: TrackerPorts,
    shared: Arc<Mutex<Shared>>,
    tx: mpsc::UnboundedSender<TrackerMsg>,
    rx: mpsc::UnboundedReceiver<TrackerMsg>,

    account: PppoeAccount,
    running: bool,
    link_up: bool,
    have_ip: bool,
    obtaining_ip: bool,
    pppoe_starting: bool,
    detailed: DetailedState,
    last_event: LinkEvent,

    poll: Option<IpPollHandle>,
    next_poll_id: u64,

    disconnect_timer: TimerSlot,
    pending_disconnect: Option<String>,
}

impl LinkTracker {
    pub fn new(settings: TrackerSettings, ports: TrackerPorts) -> (Self, TrackerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Mutex::new(Shared {
            snapshot: TrackerSnapshot {
                interface: settings.interface.clone(),
                ..TrackerSnapshot::default()
            },
            ..Shared::default()
        }));

        let handle = TrackerHandle {
            tx: tx.clone(),
            shared: Arc::clone(&shared),
            props: Arc::clone(&ports.props),
            dns_properties: settings.dns_properties.clone(),
        };

        let tracker = Self {
            settings,
            ports,
            shared,
            tx,
            rx,
            account: PppoeAccount::empty(),
            running: false,
            link_up: false,
            have_ip: false,
            obtaining_ip: false,
            pppoe_starting: false,
            detailed: DetailedState::Idle,
            last_event: LinkEvent::UnpluggedAndDown,
            poll: None,
            next_poll_id: 0,
            disconnect_timer: TimerSlot::new(),
            pending_disconnect: None,
        };
        (tracker, handle)
    }

    /// Loads the account, reads the initial link state and subscribes to link events
    pub async fn start_monitoring(&mut self) -> anyhow::Result<()> {
        let username = self
            .ports
            .settings
            .get_string(keys::PPPOE_USERNAME, "")
            .await;
        let password = self
            .ports
            .settings
            .get_string(keys::PPPOE_PASSWORD, "")
            .await;
        self.account = PppoeAccount::new(username, password);

        self.link_up = match self.ports.monitor.is_link_up(&self.settings.interface).await {
            Ok(up) => up,
            Err(e) => {
                warn!(
                    interface = %self.settings.interface,
                    error = %e,
                    "Could not read link state, assuming down"
                );
                false
            }
        };

        let observer = Arc::new(TrackerObserver {
            tx: self.tx.clone(),
        });
        self.ports.monitor.subscribe(observer).await?;

        info!(
            interface = %self.settings.interface,
            link_up = self.link_up,
            has_account = self.account.is_complete(),
            "Link monitoring started"
        );
        self.publish();
        Ok(())
    }

    /// Processes messages until `shutdown` is cancelled
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(interface = %self.settings.interface, "Link tracker running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(msg) => {
                        self.handle(msg).await;
                        self.publish();
                    }
                    None => break,
                },
            }
        }
        self.quit_polling();
        self.disconnect_timer.cancel();
        info!("Link tracker stopped");
    }

    // ------------------------------------------------------------------------
    // Shared state helpers
    // ------------------------------------------------------------------------

    fn run_state(&self) -> RunState {
        lock(&self.shared).run_state
    }

    fn set_run_state(&self, state: RunState) {
        lock(&self.shared).run_state = state;
    }

    fn pppoe_state(&self) -> PppoeState {
        lock(&self.shared).pppoe_state
    }

    fn set_any_network_disabled(&self, value: bool) {
        lock(&self.shared).any_network_disabled = value;
    }

    fn torn_down(&self) -> bool {
        lock(&self.shared).torn_down
    }

    fn set_torn_down(&self, value: bool) {
        lock(&self.shared).torn_down = value;
    }

    fn publish(&self) {
        let mut shared = lock(&self.shared);
        shared.snapshot = TrackerSnapshot {
            interface: self.settings.interface.clone(),
            run_state: shared.run_state,
            pppoe_state: shared.pppoe_state,
            link_up: self.link_up,
            have_ip_address: self.have_ip,
            obtaining_ip_address: self.obtaining_ip,
            explicitly_disabled: shared.torn_down,
            detailed_state: self.detailed,
            last_event: self.last_event,
            any_network_disabled: shared.any_network_disabled,
            disconnect_pending: self.pending_disconnect.is_some(),
        };
    }

    fn post_self(&self, msg: TrackerMsg) {
        // The tracker owns the receiver, so this only fails during shutdown.
        let _ = self.tx.send(msg);
    }

    // ------------------------------------------------------------------------
    // Broadcasts
    // ------------------------------------------------------------------------

    async fn broadcast(&self, event: Broadcast) {
        if let Err(e) = self.ports.broadcaster.broadcast(event.clone()).await {
            warn!(?event, error = %e, "Broadcast failed");
        }
    }

    async fn set_detailed_state(&mut self, state: DetailedState) {
        self.detailed = state;
        self.broadcast(Broadcast::NetworkStateChanged { detailed: state })
            .await;
    }

    async fn broadcast_session_status(&self, state: PppoeState) {
        debug!(%state, "Session status");
        self.broadcast(Broadcast::PppoeStateChanged {
            state,
            previous: None,
        })
        .await;
    }

    // ------------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------------

    async fn handle(&mut self, msg: TrackerMsg) {
        match msg {
            TrackerMsg::Event(event) => self.handle_event(event).await,
            TrackerMsg::SetAccount(account) => self.handle_set_account(account).await,
            TrackerMsg::RemoveAccount => {
                self.account = PppoeAccount::empty();
                if self.running {
                    self.handle_link_down(LinkEvent::RemoveAccount).await;
                    self.handle_link_up(LinkEvent::RemoveAccount).await;
                }
            }
            TrackerMsg::Poll(report) => self.handle_poll(report).await,
            TrackerMsg::LinkStatus { iface, up } => self.handle_link_status(&iface, up),
            TrackerMsg::InterfaceAdded(iface) => self.handle_interface_added(&iface).await,
            TrackerMsg::InterfaceRemoved(iface) => self.handle_interface_removed(&iface),
            TrackerMsg::DeferredDisconnect(id) => {
                if self.disconnect_timer.fire(id) {
                    info!(
                        target_iface = ?self.pending_disconnect,
                        "Deferred disconnect expired"
                    );
                    self.last_event = LinkEvent::DeferredDisconnect;
                    self.handle_disconnected_state().await;
                }
            }
            TrackerMsg::StartEventLoop { reply } => {
                self.start_event_loop().await;
                let _ = reply.send(());
            }
            TrackerMsg::StopEventLoop { reply } => {
                self.running = false;
                debug!("Tracker event loop stopped");
                let _ = reply.send(());
            }
            TrackerMsg::NotifyDisabled { reply } => {
                if self.running {
                    self.handle_link_down(LinkEvent::Disabled).await;
                }
                let _ = reply.send(());
            }
            TrackerMsg::ResetConnections { reply } => {
                self.reset_connections();
                let _ = reply.send(());
            }
            TrackerMsg::DisconnectAndStop { reply } => {
                let stopped = self.disconnect_and_stop().await;
                let _ = reply.send(stopped);
            }
            TrackerMsg::Restart { reply } => {
                let restarted = self.restart();
                let _ = reply.send(restarted);
            }
            TrackerMsg::Teardown { reply } => {
                let ok = if self.torn_down() {
                    true
                } else if self.disconnect_and_stop().await {
                    self.set_torn_down(true);
                    true
                } else {
                    false
                };
                let _ = reply.send(ok);
            }
            TrackerMsg::Reconnect { reply } => {
                let ok = if !self.torn_down() {
                    true
                } else if self.restart() {
                    self.set_torn_down(false);
                    true
                } else {
                    false
                };
                let _ = reply.send(ok);
            }
            TrackerMsg::EnableNetworks { reply } => {
                let was_disabled = {
                    let mut shared = lock(&self.shared);
                    std::mem::replace(&mut shared.any_network_disabled, false)
                };
                if was_disabled && self.running {
                    debug!("Re-enabling networks");
                    self.post_self(TrackerMsg::Event(LinkEvent::Enabled));
                }
                let _ = reply.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Enabled | LinkEvent::PluggedAndUp | LinkEvent::SetAccount => {
                self.handle_link_up(event).await
            }
            LinkEvent::PluggedAndDown | LinkEvent::Disabled | LinkEvent::RemoveAccount => {
                self.handle_link_down(event).await
            }
            LinkEvent::Unknown => {
                debug!("Run state unknown");
                self.set_run_state(RunState::Starting);
            }
            other => debug!(?other, "Ignoring internal event"),
        }
    }

    // ------------------------------------------------------------------------
    // Link up / down
    // ------------------------------------------------------------------------

    async fn handle_link_up(&mut self, event: LinkEvent) {
        info!(?event, "Link-up path");
        self.set_run_state(RunState::Running);

        if !self.running {
            warn!("Tracker not enabled, ignoring link-up");
            return;
        }
        if !self.link_up {
            warn!(interface = %self.settings.interface, "Waiting for physical link");
            self.broadcast_session_status(PppoeState::CheckConnect).await;
            return;
        }
        if !self.account.is_complete() {
            warn!("No account configured");
            self.broadcast_session_status(PppoeState::NoAccount).await;
            return;
        }

        if !self.pppoe_starting {
            self.pppoe_starting = true;
            let result = self
                .ports
                .session
                .start_session(self.account.username(), self.account.password())
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Failed to start session process");
                self.pppoe_starting = false;
                self.set_any_network_disabled(true);
                self.set_detailed_state(DetailedState::Failed).await;
                return;
            }
            info!(user = %self.account.username(), "Session process started");
        }

        self.restart_polling();
        self.set_torn_down(false);
        self.last_event = event;
    }

    async fn handle_link_down(&mut self, event: LinkEvent) {
        info!(?event, "Link-down path");
        self.set_run_state(RunState::Stopped);

        if !self.stop_session().await {
            return;
        }
        self.quit_polling();
        self.set_detailed_state(DetailedState::Disconnected).await;
        self.last_event = event;
    }

    async fn handle_set_account(&mut self, account: PppoeAccount) {
        let changed = account.username() != self.account.username()
            || account.password().expose_secret() != self.account.password().expose_secret();
        self.account = account;
        if !self.running {
            return;
        }
        if changed && self.pppoe_starting {
            info!("Account changed, restarting session");
            if !self.stop_session().await {
                return;
            }
            self.reset_connections();
            self.quit_polling();
        }
        self.handle_link_up(LinkEvent::SetAccount).await;
    }

    /// Stops the session process if one was started
    ///
    /// Returns false if stopping failed; the failure has been broadcast.
    async fn stop_session(&mut self) -> bool {
        if !self.pppoe_starting {
            return true;
        }
        self.pppoe_starting = false;
        match self.ports.session.stop_session().await {
            Ok(()) => {
                info!("Session process stopped");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to stop session process");
                self.set_any_network_disabled(true);
                self.set_detailed_state(DetailedState::Failed).await;
                false
            }
        }
    }

    fn handle_link_status(&mut self, iface: &str, up: bool) {
        if iface != self.settings.interface || self.link_up == up {
            return;
        }
        info!(interface = iface, up, "Link status changed");
        self.link_up = up;
        if self.running {
            let event = if up {
                LinkEvent::PluggedAndUp
            } else {
                LinkEvent::PluggedAndDown
            };
            self.post_self(TrackerMsg::Event(event));
        }
    }

    // ------------------------------------------------------------------------
    // IP polling
    // ------------------------------------------------------------------------

    fn restart_polling(&mut self) {
        self.quit_polling();
        self.next_poll_id += 1;
        let handle = IpPollWorker::spawn(
            PollId(self.next_poll_id),
            self.settings.poll.clone(),
            Arc::clone(&self.ports.props),
            self.tx.clone(),
        );
        self.poll = Some(handle);
        if !self.have_ip {
            self.obtaining_ip = true;
        }
    }

    fn quit_polling(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.cancel();
            poll.quit();
        }
    }

    async fn handle_poll(&mut self, report: PollReport) {
        if self.poll.as_ref().map(IpPollHandle::id) != Some(report.worker) {
            debug!(worker = report.worker.0, "Dropping stale poll result");
            return;
        }

        match report.outcome {
            PollOutcome::Succeeded => {
                self.have_ip = true;
                self.obtaining_ip = false;
                self.last_event = LinkEvent::ConfigSucceeded;
                if self.detailed != DetailedState::Connected {
                    info!("IP configuration succeeded");
                    self.set_detailed_state(DetailedState::Connected).await;
                } else {
                    self.broadcast(Broadcast::ConfigurationChanged {
                        detailed: self.detailed,
                    })
                    .await;
                }
            }
            PollOutcome::Failed => {
                self.set_run_state(RunState::Stopped);
                self.reset_connections();
                self.last_event = LinkEvent::ConfigFailed;
                if !self.stop_session().await {
                    return;
                }
                self.quit_polling();
                self.set_any_network_disabled(true);

                let exit_code = match self
                    .ports
                    .props
                    .get(&self.settings.exit_code_property)
                    .await
                {
                    Ok(v) => v.unwrap_or_default(),
                    Err(e) => {
                        warn!(error = %e, "Exit code unavailable");
                        String::new()
                    }
                };
                warn!(exit_code = %exit_code, "IP configuration failed");
                match exit_code.as_str() {
                    "0" => self.broadcast_session_status(PppoeState::CheckConnect).await,
                    "16" => self.broadcast_session_status(PppoeState::ModemHungUp).await,
                    "19" => {
                        self.broadcast_session_status(PppoeState::AccountIncorrect)
                            .await
                    }
                    _ => self.set_detailed_state(DetailedState::Failed).await,
                }
            }
            PollOutcome::Wait => {
                self.last_event = LinkEvent::ConfigWait;
                self.set_detailed_state(DetailedState::Connecting).await;
            }
        }
    }

    // ------------------------------------------------------------------------
    // Session interface debounce
    // ------------------------------------------------------------------------

    fn handle_interface_removed(&mut self, iface: &str) {
        if !self.running || iface == self.settings.interface {
            return;
        }
        if !self.settings.is_session_interface(iface) {
            return;
        }
        if self.pending_disconnect.is_some() {
            debug!(interface = iface, "Disconnect already pending");
            return;
        }
        debug!(
            interface = iface,
            delay_ms = self.settings.disconnect_delay.as_millis() as u64,
            "Deferring disconnect"
        );
        let handle = schedule(
            &self.tx,
            self.settings.disconnect_delay,
            TrackerMsg::DeferredDisconnect,
        );
        self.disconnect_timer.arm(handle);
        self.pending_disconnect = Some(iface.to_string());
    }

    async fn handle_interface_added(&mut self, iface: &str) {
        if !self.running || iface == self.settings.interface {
            return;
        }
        if !self.settings.is_session_interface(iface) {
            return;
        }

        match self.pending_disconnect.as_deref() {
            Some(pending) if pending == iface => {
                debug!(interface = iface, "Reconnected to same target, dropping disconnect");
                self.disconnect_timer.cancel();
                self.pending_disconnect = None;
            }
            Some(pending) => {
                info!(
                    previous = pending,
                    interface = iface,
                    "Connected to a different target, disconnecting first"
                );
                self.handle_disconnected_state().await;
            }
            None => {}
        }

        self.last_event = LinkEvent::SessionConnected;
        if !self.have_ip && self.pppoe_starting && self.poll.is_none() {
            self.restart_polling();
        }
    }

    async fn handle_disconnected_state(&mut self) {
        self.disconnect_timer.cancel();
        self.pending_disconnect = None;
        self.reset_connections();
        self.quit_polling();
        self.set_detailed_state(DetailedState::Disconnected).await;
    }

    // ------------------------------------------------------------------------
    // Lifecycle requests
    // ------------------------------------------------------------------------

    async fn start_event_loop(&mut self) {
        self.running = true;
        self.last_event = LinkEvent::UnpluggedAndDown;

        if self.link_up {
            self.post_self(TrackerMsg::Event(LinkEvent::PluggedAndUp));
        } else if let Err(e) = self
            .ports
            .monitor
            .enable_interface(&self.settings.interface)
            .await
        {
            warn!(interface = %self.settings.interface, error = %e, "Could not enable interface");
        }
        self.post_self(TrackerMsg::Event(LinkEvent::Enabled));
        debug!("Tracker event loop started");
    }

    fn reset_connections(&mut self) {
        debug!("Reset connections");
        self.have_ip = false;
        self.obtaining_ip = false;
    }

    async fn disconnect_and_stop(&mut self) -> bool {
        let run_state = self.run_state();
        if run_state.is_stopped() {
            return true;
        }
        self.reset_connections();
        let stop_driver = self.pppoe_state() == PppoeState::Enabled;
        if self.stop_session().await {
            self.quit_polling();
        }
        self.set_run_state(RunState::Stopping);
        stop_driver
    }

    fn restart(&mut self) -> bool {
        if !self.run_state().is_stopped() {
            return true;
        }
        self.set_run_state(RunState::Starting);
        self.reset_connections();
        if self.pppoe_state() != PppoeState::Enabled {
            return false;
        }
        if self.running {
            self.post_self(TrackerMsg::Event(LinkEvent::Enabled));
        }
        true
    }
}
