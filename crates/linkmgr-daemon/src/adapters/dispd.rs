//! Display daemon socket client
//!
//! dispd speaks a line protocol over a Unix stream socket. Every reply line
//! starts with a three-digit code:
//!
//! ```text
//!   1xx  one item of a list reply (110 = a display mode)
//!   2xx  command succeeded, end of reply
//!   4xx  command failed, end of reply
//!   5xx  command rejected, end of reply
//!   6xx  unsolicited event: "600 <iface> <fb>" connected, "601 ..." disconnected
//! ```
//!
//! Commands go out one per connection, serialized by a mutex. Events are
//! read from a separate long-lived connection by [`DispdEvents`].

use std::{path::PathBuf, time::Duration};

use anyhow::{bail, Context};
use linkmgr_core::{
    domain::DisplayCommand,
    ports::{
        display_daemon::{RESPONSE_MODE_LIST, RESPONSE_OK},
        IDisplayDaemon,
    },
};
use linkmgr_display::DisplayHandle;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::UnixStream,
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// One parsed line from dispd
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 1xx
    Item { code: u32, text: String },
    /// 2xx, 4xx or 5xx
    Done { code: u32, text: String },
    /// 6xx
    Event { code: u32, args: Vec<String> },
}

pub fn parse_line(line: &str) -> Option<Reply> {
    let line = line.trim_end();
    let (head, rest) = line.split_once(' ').unwrap_or((line, ""));
    if head.len() != 3 {
        return None;
    }
    let code: u32 = head.parse().ok()?;
    let text = rest.to_string();
    match code / 100 {
        1 => Some(Reply::Item { code, text }),
        2 | 4 | 5 => Some(Reply::Done { code, text }),
        6 => Some(Reply::Event {
            code,
            args: rest.split_whitespace().map(str::to_string).collect(),
        }),
        _ => None,
    }
}

/// Wire form of a display command
pub fn command_line(cmd: &DisplayCommand) -> String {
    format!(
        "display_command {} {} {} {} {} {} {}",
        cmd.framebuffer,
        cmd.operate,
        cmd.mode.as_deref().unwrap_or("-"),
        cmd.color_depth,
        u8::from(cmd.mirror),
        cmd.rotation,
        cmd.overscan,
    )
}

pub struct DispdClient {
    socket: PathBuf,
    serial: Mutex<()>,
}

impl DispdClient {
    pub fn new(socket: impl Into<PathBuf>) -> Self {
        Self {
            socket: socket.into(),
            serial: Mutex::new(()),
        }
    }

    /// Sends one command and collects its 1xx items until the final line
    async fn exchange(&self, command: &str) -> anyhow::Result<(u32, Vec<(u32, String)>)> {
        let _guard = self.serial.lock().await;
        let stream = UnixStream::connect(&self.socket)
            .await
            .with_context(|| format!("connecting to {}", self.socket.display()))?;
        let (read, mut write) = stream.into_split();
        write.write_all(format!("{command}\n").as_bytes()).await?;
        debug!(command, "dispd request");

        let mut lines = BufReader::new(read).lines();
        let mut items = Vec::new();
        let read_reply = async {
            while let Some(line) = lines.next_line().await? {
                match parse_line(&line) {
                    Some(Reply::Item { code, text }) => items.push((code, text)),
                    Some(Reply::Done { code, .. }) if code / 100 == 2 => return anyhow::Ok(code),
                    Some(Reply::Done { code, text }) => bail!("dispd error {code}: {text}"),
                    Some(Reply::Event { .. }) => {}
                    None => warn!(line = %line, "Unparseable dispd line"),
                }
            }
            bail!("dispd closed the connection")
        };
        let code = tokio::time::timeout(REPLY_TIMEOUT, read_reply)
            .await
            .context("dispd reply timed out")??;
        Ok((code, items))
    }
}

#[async_trait::async_trait]
impl IDisplayDaemon for DispdClient {
    async fn list_modes(&self, fb: usize) -> anyhow::Result<Vec<String>> {
        let (_, items) = self.exchange(&format!("get_display_modelist {fb}")).await?;
        Ok(items
            .into_iter()
            .filter(|(code, _)| *code == RESPONSE_MODE_LIST)
            .map(|(_, mode)| mode)
            .collect())
    }

    async fn apply(&self, command: &DisplayCommand) -> anyhow::Result<()> {
        let (code, _) = self.exchange(&command_line(command)).await?;
        if code != RESPONSE_OK {
            debug!(code, "dispd accepted with non-standard code");
        }
        Ok(())
    }
}

/// Feeds dispd events to the display manager, reconnecting when the socket drops
pub struct DispdEvents {
    socket: PathBuf,
    display: DisplayHandle,
}

impl DispdEvents {
    pub fn new(socket: impl Into<PathBuf>, display: DisplayHandle) -> Self {
        Self {
            socket: socket.into(),
            display,
        }
    }

    fn dispatch(&self, code: u32, args: &[String]) {
        let Some(fb) = args.get(1).and_then(|s| s.parse::<usize>().ok()) else {
            warn!(code, ?args, "dispd event without framebuffer id");
            return;
        };
        match self.display.daemon_event(code, fb) {
            Ok(true) => debug!(code, fb, "dispd event handled"),
            Ok(false) => debug!(code, fb, "dispd event ignored"),
            Err(e) => warn!(code, fb, error = %e, "dispd event rejected"),
        }
    }

    async fn listen(&self) -> anyhow::Result<()> {
        let stream = UnixStream::connect(&self.socket).await?;
        info!(socket = %self.socket.display(), "Connected to dispd");
        let mut lines = BufReader::new(stream).lines();
        while let Some(line) = lines.next_line().await? {
            if let Some(Reply::Event { code, args }) = parse_line(&line) {
                self.dispatch(code, &args);
            }
        }
        Ok(())
    }

    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = self.listen() => match result {
                    Ok(()) => warn!("dispd closed the event socket"),
                    Err(e) => warn!(error = %e, "dispd event socket unavailable"),
                },
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            }
        }
        debug!("dispd event listener stopped");
    }
}
