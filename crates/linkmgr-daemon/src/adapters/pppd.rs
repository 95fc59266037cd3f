//! pppd session process
//!
//! Spawns `pppd` with the PPPoE plugin on the Ethernet interface. A watcher
//! task owns the child; when pppd exits on its own the exit status is
//! published under the exit-code property, which is how the IP poller
//! learns that the session failed. An explicit stop sends SIGTERM, waits
//! for a grace period, then kills.

use std::{
    path::PathBuf,
    process::{ExitStatus, Stdio},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use linkmgr_core::{config::PppoeConfig, ports::ISessionProcess};
use linkmgr_store::DirPropertyStore;
use secrecy::{ExposeSecret, SecretString};
use tokio::{
    process::{Child, Command},
    sync::{
        oneshot::{self, error::TryRecvError},
        Mutex,
    },
};
use tracing::{debug, info, warn};

const STOP_GRACE: Duration = Duration::from_secs(3);

struct Running {
    pid: Option<u32>,
    stop: oneshot::Sender<()>,
    done: oneshot::Receiver<()>,
}

pub struct PppdProcess {
    pppd: PathBuf,
    plugin: String,
    interface: String,
    exit_code_property: String,
    dns_properties: Vec<String>,
    props: Arc<DirPropertyStore>,
    running: Mutex<Option<Running>>,
}

impl PppdProcess {
    pub fn new(cfg: &PppoeConfig, props: Arc<DirPropertyStore>) -> Self {
        Self {
            pppd: cfg.pppd_path.clone(),
            plugin: cfg.pppd_plugin.clone(),
            interface: cfg.interface.clone(),
            exit_code_property: cfg.exit_code_property.clone(),
            dns_properties: cfg.dns_properties.clone(),
            props,
            running: Mutex::new(None),
        }
    }

    /// pppd arguments, without the password
    fn args(&self, username: &str) -> Vec<String> {
        [
            "nodetach",
            "noipdefault",
            "defaultroute",
            "usepeerdns",
            "persist",
            "maxfail",
            "1",
            "plugin",
            self.plugin.as_str(),
            self.interface.as_str(),
            "user",
            username,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    async fn clear_properties(&self) {
        let keys = std::iter::once(&self.exit_code_property).chain(&self.dns_properties);
        for key in keys {
            if let Err(e) = self.props.clear(key).await {
                warn!(key = %key, error = %e, "Failed to clear property");
            }
        }
    }
}

/// Numeric exit status as pppd reports it; signals map to 128+n
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|s| 128 + s))
        .unwrap_or(-1)
}

async fn terminate(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: kill(2) with a pid we own; failure only means it already exited
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc == 0 {
            if let Ok(Ok(status)) = tokio::time::timeout(STOP_GRACE, child.wait()).await {
                debug!(pid, code = exit_code(status), "pppd terminated");
                return;
            }
            warn!(pid, "pppd ignored SIGTERM, killing");
        }
    }
    if let Err(e) = child.kill().await {
        debug!(error = %e, "pppd already gone");
    }
}

#[async_trait::async_trait]
impl ISessionProcess for PppdProcess {
    async fn start_session(&self, username: &str, password: &SecretString) -> anyhow::Result<()> {
        let mut running = self.running.lock().await;
        if let Some(session) = running.as_mut() {
            if matches!(session.done.try_recv(), Err(TryRecvError::Empty)) {
                anyhow::bail!("pppd session already running");
            }
        }
        self.clear_properties().await;

        let mut child = Command::new(&self.pppd)
            .args(self.args(username))
            .arg("password")
            .arg(password.expose_secret())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", self.pppd.display()))?;
        let pid = child.id();
        info!(pid, interface = %self.interface, user = username, "pppd started");

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel::<()>();
        let props = Arc::clone(&self.props);
        let key = self.exit_code_property.clone();

        tokio::spawn(async move {
            tokio::select! {
                status = child.wait() => match status {
                    Ok(status) => {
                        let code = exit_code(status);
                        info!(pid, code, "pppd exited");
                        if let Err(e) = props.set(&key, &code.to_string()).await {
                            warn!(key = %key, error = %e, "Failed to publish pppd exit code");
                        }
                    }
                    Err(e) => warn!(pid, error = %e, "Waiting for pppd failed"),
                },
                _ = &mut stop_rx => terminate(&mut child).await,
            }
            let _ = done_tx.send(());
        });

        *running = Some(Running {
            pid,
            stop: stop_tx,
            done: done_rx,
        });
        Ok(())
    }

    async fn stop_session(&self) -> anyhow::Result<()> {
        let Some(session) = self.running.lock().await.take() else {
            debug!("No pppd session to stop");
            return Ok(());
        };
        info!(pid = session.pid, "Stopping pppd");
        // Send fails only if the watcher already saw pppd exit.
        let _ = session.stop.send(());
        let _ = session.done.await;
        Ok(())
    }
}
