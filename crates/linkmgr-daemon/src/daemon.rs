//! Daemon service: builds the adapters, starts the controllers and waits
//! for shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use linkmgr_core::{
    config::Config,
    domain::Uid,
    ports::{IAccessControl, IBroadcaster, ISettingsStore},
};
use linkmgr_display::{CommandBridge, DisplayHandle, DisplayManager, DisplayPorts};
use linkmgr_pppoe::{
    LinkTracker, PppoeService, PppoeServiceHandle, ServicePorts, TrackerPorts, TrackerSettings,
};
use linkmgr_store::{DirPropertyStore, YamlSettingsStore};
use tokio::{
    signal::unix::{signal, SignalKind},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{
    sysfs_link::DEFAULT_NET_DIR, DispdClient, DispdEvents, PowerWatcher, PppdProcess,
    SysfsLinkMonitor, SysfsWakeLockBackend, TracingBroadcaster, UidAllowList,
};

/// How often locks whose owner went away are collected
const REAP_INTERVAL: Duration = Duration::from_secs(30);
/// How long controllers get to finish after shutdown is signalled
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct DaemonService {
    config: Config,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Uid the daemon runs as; its own requests skip permission checks
fn own_uid() -> Uid {
    // SAFETY: getuid(2) has no preconditions and cannot fail
    Uid::new(unsafe { libc::getuid() })
}

impl DaemonService {
    pub fn new(config: Config, shutdown: CancellationToken) -> Self {
        Self {
            config,
            shutdown,
            tasks: Vec::new(),
        }
    }

    /// Starts the display manager and the dispd event listener
    async fn start_display(
        &mut self,
        settings: Arc<dyn ISettingsStore>,
        broadcaster: Arc<dyn IBroadcaster>,
        access: Arc<dyn IAccessControl>,
        service_uid: Uid,
    ) -> DisplayHandle {
        let socket = self.config.display.socket.clone();
        let (mut manager, display) = DisplayManager::new(
            self.config.display.clone(),
            DisplayPorts {
                bridge: CommandBridge::new(Arc::new(DispdClient::new(&socket))),
                settings,
                broadcaster,
                access,
            },
            service_uid,
        );
        manager.load_settings().await;

        self.tasks
            .push(tokio::spawn(manager.run(self.shutdown.clone())));
        self.tasks.push(tokio::spawn(
            DispdEvents::new(socket, display.clone()).run(self.shutdown.clone()),
        ));
        display
    }

    /// Starts the link tracker, the PPPoE service and its power watcher
    async fn start_pppoe(
        &mut self,
        settings: Arc<dyn ISettingsStore>,
        broadcaster: Arc<dyn IBroadcaster>,
        access: Arc<dyn IAccessControl>,
        service_uid: Uid,
    ) -> Result<PppoeServiceHandle> {
        let storage = &self.config.storage;
        tokio::fs::create_dir_all(&storage.property_dir)
            .await
            .with_context(|| format!("creating {}", storage.property_dir.display()))?;
        let props = Arc::new(DirPropertyStore::new(&storage.property_dir));

        let (mut tracker, tracker_handle) = LinkTracker::new(
            TrackerSettings::from_config(&self.config.pppoe),
            TrackerPorts {
                session: Arc::new(PppdProcess::new(&self.config.pppoe, Arc::clone(&props))),
                monitor: Arc::new(SysfsLinkMonitor::new(DEFAULT_NET_DIR, self.shutdown.clone())),
                props,
                settings: Arc::clone(&settings),
                broadcaster: Arc::clone(&broadcaster),
            },
        );
        tracker
            .start_monitoring()
            .await
            .context("Failed to start link monitoring")?;

        let (service, handle) = PppoeService::new(
            self.config.service.clone(),
            ServicePorts {
                tracker: tracker_handle,
                settings,
                broadcaster,
                access,
                wakelock: Arc::new(SysfsWakeLockBackend::default()),
            },
            service_uid,
        );

        self.tasks.push(tokio::spawn(tracker.run(self.shutdown.clone())));
        self.tasks.push(tokio::spawn(service.run(self.shutdown.clone())));
        self.tasks.push(tokio::spawn(
            PowerWatcher::new(handle.clone()).run(self.shutdown.clone()),
        ));
        Ok(handle)
    }

    /// Runs until the shutdown token is cancelled
    pub async fn run(mut self) -> Result<()> {
        let settings_file = self.config.storage.settings_file.clone();
        let settings: Arc<dyn ISettingsStore> = Arc::new(
            YamlSettingsStore::open(&settings_file)
                .await
                .with_context(|| format!("Failed to open settings {}", settings_file.display()))?,
        );
        let broadcaster: Arc<dyn IBroadcaster> = Arc::new(TracingBroadcaster);
        let access: Arc<dyn IAccessControl> =
            Arc::new(UidAllowList::new(self.config.access.allowed_uids.clone()));
        let service_uid = own_uid();
        info!(uid = service_uid.as_raw(), "Service identity");

        let display = self
            .start_display(
                Arc::clone(&settings),
                Arc::clone(&broadcaster),
                Arc::clone(&access),
                service_uid,
            )
            .await;
        let pppoe = self
            .start_pppoe(settings, broadcaster, access, service_uid)
            .await?;

        match pppoe.start_pppoe().await {
            Ok(accepted) => info!(accepted, "PPPoE boot start requested"),
            Err(e) => error!(error = %e, "PPPoE boot start failed"),
        }

        let mut dump_signal =
            signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?;
        let mut reap = tokio::time::interval(REAP_INTERVAL);
        reap.tick().await;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = dump_signal.recv() => dump_state(&pppoe, &display).await,
                _ = reap.tick() => {
                    let reaped = pppoe.registry().reap_dead_owners();
                    if reaped > 0 {
                        info!(reaped, "Released locks of departed owners");
                    }
                }
            }
        }

        info!("Stopping controllers");
        for task in self.tasks {
            if tokio::time::timeout(STOP_TIMEOUT, task).await.is_err() {
                warn!("A controller did not stop in time");
            }
        }
        Ok(())
    }
}

/// Logs the state of both controllers as one JSON document
async fn dump_state(pppoe: &PppoeServiceHandle, display: &DisplayHandle) {
    let pppoe = match pppoe.dump().await {
        Ok(dump) => serde_json::to_value(dump),
        Err(e) => Ok(serde_json::json!({ "error": e.to_string() })),
    };
    let display = match display.snapshot().await {
        Ok(snapshot) => serde_json::to_value(snapshot),
        Err(e) => Ok(serde_json::json!({ "error": e.to_string() })),
    };
    match (pppoe, display) {
        (Ok(pppoe), Ok(display)) => {
            let state = serde_json::json!({ "pppoe": pppoe, "display": display });
            info!(state = %state, "State dump");
        }
        (Err(e), _) | (_, Err(e)) => error!(error = %e, "State dump failed"),
    }
}
