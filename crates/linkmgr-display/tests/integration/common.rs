//! Fakes and harness for the display manager tests

use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use linkmgr_core::{
    config::DisplayConfig,
    domain::{CallerId, DisplayCommand, Uid},
    ports::{Broadcast, IAccessControl, IBroadcaster, IDisplayDaemon, ISettingsStore, Permission},
};
use linkmgr_display::{CommandBridge, DisplayHandle, DisplayManager, DisplayPorts};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const SERVICE_UID: u32 = 1000;
pub const SETTINGS_APP: u32 = 10_020;

pub fn settings_app() -> CallerId {
    CallerId::new(SETTINGS_APP, 77)
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn modes(list: &[&str]) -> Vec<String> {
    list.iter().map(|m| m.to_string()).collect()
}

/// Display daemon with a fixed mode list per framebuffer
#[derive(Default)]
pub struct FakeDaemon {
    modes: Mutex<HashMap<usize, Vec<String>>>,
    pub commands: Mutex<Vec<DisplayCommand>>,
    watched: Mutex<Option<PathBuf>>,
    /// Contents of the watched file as each command arrived
    pub file_at_apply: Mutex<Vec<Option<String>>>,
}

impl FakeDaemon {
    pub fn offer(&self, fb: usize, list: &[&str]) {
        self.modes.lock().unwrap().insert(fb, modes(list));
    }

    pub fn commands(&self) -> Vec<DisplayCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.commands.lock().unwrap().clear();
        self.file_at_apply.lock().unwrap().clear();
    }

    pub fn watch(&self, path: PathBuf) {
        *self.watched.lock().unwrap() = Some(path);
    }
}

#[async_trait::async_trait]
impl IDisplayDaemon for FakeDaemon {
    async fn list_modes(&self, fb: usize) -> anyhow::Result<Vec<String>> {
        self.modes
            .lock()
            .unwrap()
            .get(&fb)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such framebuffer: {fb}"))
    }

    async fn apply(&self, command: &DisplayCommand) -> anyhow::Result<()> {
        let watched = self.watched.lock().unwrap().clone();
        if let Some(path) = watched {
            let seen = std::fs::read_to_string(path).ok();
            self.file_at_apply.lock().unwrap().push(seen);
        }
        self.commands.lock().unwrap().push(command.clone());
        Ok(())
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

    pub fn puts(&self) -> Vec<(String, String)> {
        self.puts.lock().unwrap().clone()
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
pub struct RecordingBroadcaster(Mutex<Vec<Broadcast>>);

impl RecordingBroadcaster {
    pub fn events(&self) -> Vec<Broadcast> {
        self.0.lock().unwrap().clone()
    }

    pub fn plugged(&self) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Broadcast::DisplayPlugged { connected } => Some(connected),
                _ => None,
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl IBroadcaster for RecordingBroadcaster {
    async fn broadcast(&self, event: Broadcast) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(event);
        Ok(())
    }
}

/// Only the settings app may change displays
pub struct SettingsAppOnly;

impl IAccessControl for SettingsAppOnly {
    fn check(&self, caller: &CallerId, permission: Permission) -> bool {
        caller.uid.as_raw() == SETTINGS_APP && permission == Permission::ChangeDisplayState
    }
}

pub struct Harness {
    pub daemon: Arc<FakeDaemon>,
    pub settings: Arc<FakeSettings>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub display: DisplayHandle,
    pub config_file: PathBuf,
    shutdown: CancellationToken,
    _dir: TempDir,
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub struct HarnessBuilder {
    daemon: Arc<FakeDaemon>,
    settings: Arc<FakeSettings>,
    config_text: Option<String>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        let daemon = Arc::new(FakeDaemon::default());
        daemon.offer(0, &["1920x1080p-60", "1280x720p-60"]);
        Self {
            daemon,
            settings: Arc::new(FakeSettings::default()),
            config_text: None,
        }
    }

    pub fn offer(self, fb: usize, list: &[&str]) -> Self {
        self.daemon.offer(fb, list);
        self
    }

    pub fn setting(self, key: &str, value: &str) -> Self {
        self.settings.seed(key, value);
        self
    }

    pub fn config_file(mut self, text: &str) -> Self {
        self.config_text = Some(text.to_string());
        self
    }

    pub async fn start(self) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config_file = dir.path().join("display.conf");
        if let Some(text) = &self.config_text {
            std::fs::write(&config_file, text).unwrap();
        }
        self.daemon.watch(config_file.clone());

        let config = DisplayConfig {
            config_file: config_file.clone(),
            ..DisplayConfig::default()
        };
        let broadcaster = Arc::new(RecordingBroadcaster::default());
        let (mut manager, display) = DisplayManager::new(
            config,
            DisplayPorts {
                bridge: CommandBridge::new(self.daemon.clone()),
                settings: self.settings.clone(),
                broadcaster: broadcaster.clone(),
                access: Arc::new(SettingsAppOnly),
            },
            Uid::new(SERVICE_UID),
        );
        manager.load_settings().await;

        let shutdown = CancellationToken::new();
        tokio::spawn(manager.run(shutdown.clone()));

        Harness {
            daemon: self.daemon,
            settings: self.settings,
            broadcaster,
            display,
            config_file,
            shutdown,
            _dir: dir,
        }
    }
}
