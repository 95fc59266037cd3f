//! Shared fakes and harness for the link manager integration tests
//!
//! Every port is replaced by an in-memory fake that records what the
//! controllers did. Tests run on a paused clock; [`settle`] lets all
//! queued work drain before assertions.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use linkmgr_core::{
    config::Config,
    domain::{CallerId, DetailedState, PppoeState, Uid, WorkSource},
    ports::{
        Broadcast, IAccessControl, IBroadcaster, ILinkMonitor, ILinkObserver, IPropertyStore,
        ISessionProcess, ISettingsStore, IWakeLockBackend, Permission,
    },
};
use linkmgr_pppoe::{
    LinkTracker, PppoeService, PppoeServiceHandle, ServicePorts, TrackerHandle, TrackerPorts,
    TrackerSettings,
};
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;

pub const SERVICE_UID: u32 = 1000;
pub const APP_UID: u32 = 10_050;

pub fn app() -> CallerId {
    CallerId::new(APP_UID, 4242)
}

/// Lets every spawned task run until the runtime is idle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ============================================================================
// Fakes
// ============================================================================

#[derive(Default)]
pub struct FakeSession {
    pub starts: Mutex<Vec<String>>,
    pub stops: AtomicUsize,
    pub fail_start: AtomicBool,
}

impl FakeSession {
    pub fn start_count(&self) -> usize {
        self.starts.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl ISessionProcess for FakeSession {
    async fn start_session(&self, username: &str, password: &SecretString) -> anyhow::Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            anyhow::bail!("pppd not found");
        }
        self.starts
            .lock()
            .unwrap()
            .push(format!("{username}:{}", password.expose_secret()));
        Ok(())
    }

    async fn stop_session(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeMonitor {
    pub link_up: AtomicBool,
    pub enable_calls: AtomicUsize,
    observer: Mutex<Option<Arc<dyn ILinkObserver>>>,
}

impl FakeMonitor {
    fn observer(&self) -> Arc<dyn ILinkObserver> {
        self.observer
            .lock()
            .unwrap()
            .clone()
            .expect("tracker subscribed")
    }

    pub fn link(&self, iface: &str, up: bool) {
        self.link_up.store(up, Ordering::SeqCst);
        self.observer().link_status_changed(iface, up);
    }

    pub fn add(&self, iface: &str) {
        self.observer().interface_added(iface);
    }

    pub fn remove(&self, iface: &str) {
        self.observer().interface_removed(iface);
    }
}

#[async_trait::async_trait]
impl ILinkMonitor for FakeMonitor {
    async fn subscribe(&self, observer: Arc<dyn ILinkObserver>) -> anyhow::Result<()> {
        *self.observer.lock().unwrap() = Some(observer);
        Ok(())
    }

    async fn is_link_up(&self, _iface: &str) -> anyhow::Result<bool> {
        Ok(self.link_up.load(Ordering::SeqCst))
    }

    async fn enable_interface(&self, _iface: &str) -> anyhow::Result<()> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeProps(Mutex<HashMap<String, String>>);

impl FakeProps {
    pub fn set(&self, key: &str, value: &str) {
        self.0.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn connected(&self) {
        self.set("net.ppp0.dns1", "10.0.0.53");
        self.set("net.ppp0.dns2", "10.0.0.54");
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

#[async_trait::async_trait]
impl IPropertyStore for FakeProps {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.0.lock().unwrap().get(key).cloned())
    }
}

#[derive(Default)]
pub struct FakeSettings {
    values: Mutex<HashMap<String, String>>,
    pub puts: Mutex<Vec<(String, String)>>,
}

impl FakeSettings {
    pub fn seed(&self, key: &str, value: &str) {
        self.values.lock().unwrap().insert(key.into(), value.into());
    }

    pub fn value(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }
}

#[async_trait::async_trait]
impl ISettingsStore for FakeSettings {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.value(key))
    }

    async fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.puts.lock().unwrap().push((key.into(), value.into()));
        self.seed(key, value);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingBroadcaster {
    events: Mutex<Vec<Broadcast>>,
}

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<Broadcast> {
        self.events.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn detailed_states(&self) -> Vec<DetailedState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Broadcast::NetworkStateChanged { detailed } => Some(detailed),
                _ => None,
            })
            .collect()
    }

    /// Session statuses and enabled-state changes, in order
    pub fn pppoe_states(&self) -> Vec<PppoeState> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Broadcast::PppoeStateChanged { state, .. } => Some(state),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl IBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, event: Broadcast) -> anyhow::Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeWakeLockBackend {
    pub calls: Mutex<Vec<String>>,
}

impl FakeWakeLockBackend {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl IWakeLockBackend for FakeWakeLockBackend {
    async fn acquire(&self, tag: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("acquire {tag}"));
        Ok(())
    }

    async fn release(&self, tag: &str) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("release {tag}"));
        Ok(())
    }

    async fn set_work_source(&self, tag: &str, ws: &WorkSource) -> anyhow::Result<()> {
        self.calls.lock().unwrap().push(format!("ws {tag} {ws}"));
        Ok(())
    }
}

/// Grants permissions per uid
#[derive(Default)]
pub struct FakeAccess {
    grants: Mutex<HashMap<u32, HashSet<Permission>>>,
}

impl FakeAccess {
    pub fn grant(&self, uid: u32, permissions: &[Permission]) {
        self.grants
            .lock()
            .unwrap()
            .entry(uid)
            .or_default()
            .extend(permissions.iter().copied());
    }
}

impl IAccessControl for FakeAccess {
    fn check(&self, caller: &CallerId, permission: Permission) -> bool {
        self.grants
            .lock()
            .unwrap()
            .get(&caller.uid.as_raw())
            .is_some_and(|p| p.contains(&permission))
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub session: Arc<FakeSession>,
    pub monitor: Arc<FakeMonitor>,
    pub props: Arc<FakeProps>,
    pub settings: Arc<FakeSettings>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub wakelock: Arc<FakeWakeLockBackend>,
    pub access: Arc<FakeAccess>,
    pub tracker: TrackerHandle,
    pub service: PppoeServiceHandle,
    pub shutdown: CancellationToken,
}

pub struct HarnessBuilder {
    config: Config,
    account: Option<(String, String)>,
    link_up: bool,
    settings: Arc<FakeSettings>,
    session: Arc<FakeSession>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            account: None,
            link_up: true,
            settings: Arc::new(FakeSettings::default()),
            session: Arc::new(FakeSession::default()),
        }
    }

    pub fn account(mut self, username: &str, password: &str) -> Self {
        self.account = Some((username.into(), password.into()));
        self
    }

    pub fn link_up(mut self, up: bool) -> Self {
        self.link_up = up;
        self
    }

    pub fn setting(self, key: &str, value: &str) -> Self {
        self.settings.seed(key, value);
        self
    }

    pub fn failing_session(self) -> Self {
        self.session.fail_start.store(true, Ordering::SeqCst);
        self
    }

    pub async fn start(self) -> Harness {
        if let Some((user, pass)) = &self.account {
            self.settings.seed("pppoe_username", user);
            self.settings.seed("pppoe_password", pass);
        }

        let monitor = Arc::new(FakeMonitor::default());
        monitor.link_up.store(self.link_up, Ordering::SeqCst);
        let props = Arc::new(FakeProps::default());
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let wakelock = Arc::new(FakeWakeLockBackend::default());
        let access = Arc::new(FakeAccess::default());
        access.grant(
            APP_UID,
            &[
                Permission::ChangePppoeState,
                Permission::AccessPppoeState,
                Permission::WakeLock,
            ],
        );

        let (mut tracker, tracker_handle) = LinkTracker::new(
            TrackerSettings::from_config(&self.config.pppoe),
            TrackerPorts {
                session: self.session.clone(),
                monitor: monitor.clone(),
                props: props.clone(),
                settings: self.settings.clone(),
                broadcaster: broadcaster.clone(),
            },
        );
        tracker
            .start_monitoring()
            .await
            .expect("monitoring starts");

        let (service, service_handle) = PppoeService::new(
            self.config.service.clone(),
            ServicePorts {
                tracker: tracker_handle.clone(),
                settings: self.settings.clone(),
                broadcaster: broadcaster.clone(),
                access: access.clone(),
                wakelock: wakelock.clone(),
            },
            Uid::new(SERVICE_UID),
        );

        let shutdown = CancellationToken::new();
        tokio::spawn(tracker.run(shutdown.clone()));
        tokio::spawn(service.run(shutdown.clone()));

        Harness {
            session: self.session,
            monitor,
            props,
            settings: self.settings,
            broadcaster,
            wakelock,
            access,
            tracker: tracker_handle,
            service: service_handle,
            shutdown,
        }
    }
}

impl Harness {
    /// Enables the link as an app and waits for the transition to finish
    pub async fn enable(&self) {
        assert!(self.service.set_enabled(&app(), true).await.unwrap());
        settle().await;
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
