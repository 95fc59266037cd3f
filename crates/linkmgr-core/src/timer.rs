//! Delayed messages with per-timer cancellation
//!
//! [`schedule`] posts a message to a controller queue after a delay and
//! returns a [`TimerHandle`]. Cancelling the handle before the delay
//! expires suppresses the post. A message that was already posted carries
//! its [`TimerId`]; the controller keeps the live handle in a [`TimerSlot`]
//! and drops fired messages whose id no longer matches, which makes a
//! cancel effective even after the post.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::trace;

static NEXT_TIMER_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one scheduled timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(NEXT_TIMER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Cancels a pending delayed message. Dropping the handle does not cancel.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    id: TimerId,
    token: CancellationToken,
}

impl TimerHandle {
    pub fn id(&self) -> TimerId {
        self.id
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Posts `make(id)` to `tx` once `delay` has elapsed
pub fn schedule<M, F>(tx: &mpsc::UnboundedSender<M>, delay: Duration, make: F) -> TimerHandle
where
    M: Send + 'static,
    F: FnOnce(TimerId) -> M + Send + 'static,
{
    let id = TimerId::next();
    let token = CancellationToken::new();
    let handle = TimerHandle {
        id,
        token: token.clone(),
    };
    let tx = tx.clone();

    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {
                trace!(timer = id.0, "Timer cancelled");
            }
            _ = tokio::time::sleep(delay) => {
                if !token.is_cancelled() {
                    let _ = tx.send(make(id));
                }
            }
        }
    });

    handle
}

/// Holds at most one pending timer
#[derive(Debug, Default)]
pub struct TimerSlot {
    current: Option<TimerHandle>,
}

impl TimerSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the pending timer, cancelling the previous one
    pub fn arm(&mut self, handle: TimerHandle) {
        if let Some(old) = self.current.replace(handle) {
            old.cancel();
        }
    }

    /// Cancels the pending timer; returns true if one was pending
    pub fn cancel(&mut self) -> bool {
        match self.current.take() {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.current.is_some()
    }

    /// Accepts a fired timer message; false means it is stale and must be ignored
    pub fn fire(&mut self, id: TimerId) -> bool {
        match &self.current {
            Some(handle) if handle.id == id => {
                self.current = None;
                true
            }
            _ => false,
        }
    }
}
