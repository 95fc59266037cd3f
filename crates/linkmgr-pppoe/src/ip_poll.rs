//! IP-configuration poll worker
//!
//! After the session process is spawned, a worker polls the exit-code and
//! DNS properties until the session either publishes DNS (success), exits
//! (failure), or the attempt budget runs out. It runs on its own task so
//! the interval sleep never blocks the link state machine.
//!
//! | exit code | DNS present | outcome |
//! |-----------|-------------|---------|
//! | absent    | no          | wait    |
//! | absent    | yes         | success |
//! | `"0"`     | no          | failure |
//! | `"0"`     | yes         | success |
//! | other     | any         | failure |

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use linkmgr_core::ports::IPropertyStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Identity of one poll worker, so the tracker can drop stale reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Succeeded,
    Failed,
    Wait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub worker: PollId,
    pub outcome: PollOutcome,
}

/// Applies the decision table to one observation
///
/// Empty property values count as absent.
pub fn decide(exit_code: Option<&str>, dns: Option<&str>) -> PollOutcome {
    let exit_code = exit_code.filter(|v| !v.is_empty());
    let has_dns = dns.is_some_and(|v| !v.is_empty());
    match (exit_code, has_dns) {
        (None, false) => PollOutcome::Wait,
        (None, true) => PollOutcome::Succeeded,
        (Some("0"), true) => PollOutcome::Succeeded,
        (Some(_), _) => PollOutcome::Failed,
    }
}

/// Property names and limits the worker polls with
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub exit_code_property: String,
    pub dns_property: String,
    pub interval: Duration,
    pub max_attempts: u32,
}

enum PollMsg {
    Check,
}

/// Handle to a running poll worker
#[derive(Clone)]
pub struct IpPollHandle {
    id: PollId,
    tx: mpsc::UnboundedSender<PollMsg>,
    cancel_callback: Arc<AtomicBool>,
    quit: CancellationToken,
}

impl IpPollHandle {
    pub fn id(&self) -> PollId {
        self.id
    }

    /// Queues one poll attempt
    pub fn check(&self) {
        if self.tx.send(PollMsg::Check).is_err() {
            debug!(worker = self.id.0, "Poll worker already stopped");
        }
    }

    /// Suppresses delivery of any further results; in-flight attempts finish
    pub fn cancel(&self) {
        self.cancel_callback.store(true, Ordering::SeqCst);
    }

    /// Stops the worker task
    pub fn quit(&self) {
        self.quit.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_callback.load(Ordering::SeqCst)
    }
}

/// Sequential poll worker; reports are sent as `M::from(PollReport)`
pub struct IpPollWorker<M> {
    id: PollId,
    settings: PollSettings,
    props: Arc<dyn IPropertyStore>,
    attempts: u32,
    self_tx: mpsc::UnboundedSender<PollMsg>,
    rx: mpsc::UnboundedReceiver<PollMsg>,
    report_tx: mpsc::UnboundedSender<M>,
    cancel_callback: Arc<AtomicBool>,
    quit: CancellationToken,
}

impl<M> IpPollWorker<M>
where
    M: From<PollReport> + Send + 'static,
{
    /// Spawns a worker and queues its first attempt
    pub fn spawn(
        id: PollId,
        settings: PollSettings,
        props: Arc<dyn IPropertyStore>,
        report_tx: mpsc::UnboundedSender<M>,
    ) -> IpPollHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_callback = Arc::new(AtomicBool::new(false));
        let quit = CancellationToken::new();

        let worker = Self {
            id,
            settings,
            props,
            attempts: 0,
            self_tx: tx.clone(),
            rx,
            report_tx,
            cancel_callback: Arc::clone(&cancel_callback),
            quit: quit.clone(),
        };
        tokio::spawn(worker.run());

        let handle = IpPollHandle {
            id,
            tx,
            cancel_callback,
            quit,
        };
        handle.check();
        handle
    }

    async fn run(mut self) {
        debug!(worker = self.id.0, "Poll worker started");
        loop {
            tokio::select! {
                _ = self.quit.cancelled() => break,
                msg = self.rx.recv() => match msg {
                    Some(PollMsg::Check) => self.check().await,
                    None => break,
                },
            }
        }
        debug!(worker = self.id.0, attempts = self.attempts, "Poll worker stopped");
    }

    async fn read(&self, key: &str) -> Option<String> {
        match self.props.get(key).await {
            Ok(v) => v,
            Err(e) => {
                warn!(key, error = %e, "Property read failed, treating as absent");
                None
            }
        }
    }

    async fn check(&mut self) {
        self.attempts += 1;
        let outcome = if self.attempts < self.settings.max_attempts {
            let exit_code = self.read(&self.settings.exit_code_property).await;
            let dns = self.read(&self.settings.dns_property).await;
            decide(exit_code.as_deref(), dns.as_deref())
        } else {
            info!(
                worker = self.id.0,
                attempts = self.attempts,
                "IP configuration timed out"
            );
            PollOutcome::Failed
        };

        if self.cancel_callback.load(Ordering::SeqCst) {
            debug!(worker = self.id.0, ?outcome, "Poll result discarded");
        } else {
            let report = PollReport {
                worker: self.id,
                outcome,
            };
            if self.report_tx.send(M::from(report)).is_err() {
                debug!(worker = self.id.0, "Tracker gone, dropping poll result");
            }
        }

        if outcome == PollOutcome::Wait {
            tokio::select! {
                _ = self.quit.cancelled() => {}
                _ = tokio::time::sleep(self.settings.interval) => {
                    let _ = self.self_tx.send(PollMsg::Check);
                }
            }
        }
    }
}
