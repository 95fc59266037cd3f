//! Keep-awake lock registry
//!
//! Callers create a [`LockHandle`] bound to an [`OwnerBinding`] and then
//! acquire/release it, optionally reference counted. A handle is
//! *registered* while it is held; the registry caps the number of
//! registered locks and reports every registration change to the service
//! as a [`LockActivity`].
//!
//! ```text
//!   LockHandle ──(per-handle Mutex)──► HandleState {ref_count, held, ws}
//!        │                                   ▲
//!        │ register / unregister             │ Weak (reset on owner death)
//!        ▼                                   │
//!   LockRegistry ──(registry Mutex)──► entries: LockId → LockEntry
//!        │                                   │
//!        └── LockActivity ──► service        └── Weak<()> owner liveness
//! ```
//!
//! Lock order is handle state first, then the registry.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, Weak},
};

use chrono::{DateTime, Utc};
use linkmgr_core::domain::{CallerId, LockId, OwnerId, WorkSource};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    error::{LinkError, Result},
    lock,
};

// ============================================================================
// OwnerBinding
// ============================================================================

/// The caller-side object whose lifetime bounds its locks
///
/// The registry only keeps a weak reference. Once every clone of the
/// binding is dropped, [`LockRegistry::reap_dead_owners`] releases the
/// owner's locks.
#[derive(Debug, Clone)]
pub struct OwnerBinding {
    id: OwnerId,
    alive: Arc<()>,
}

impl OwnerBinding {
    pub fn new() -> Self {
        Self {
            id: OwnerId::new(),
            alive: Arc::new(()),
        }
    }

    pub fn id(&self) -> OwnerId {
        self.id
    }

    fn liveness(&self) -> Weak<()> {
        Arc::downgrade(&self.alive)
    }
}

impl Default for OwnerBinding {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// LockActivity
// ============================================================================

/// Registration changes reported to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockActivity {
    Acquired(LockId),
    Released(LockId),
    WorkSourceChanged(LockId),
}

// ============================================================================
// LockHandle
// ============================================================================

#[derive(Debug)]
struct HandleState {
    ref_counted: bool,
    /// Acquires minus releases, counted in both modes
    ref_count: u32,
    held: bool,
    work_source: Option<WorkSource>,
}

/// A caller's keep-awake lock
pub struct LockHandle {
    id: LockId,
    tag: String,
    caller: CallerId,
    owner: OwnerId,
    liveness: Weak<()>,
    state: Arc<Mutex<HandleState>>,
    registry: Arc<LockRegistry>,
}

impl LockHandle {
    pub fn id(&self) -> LockId {
        self.id
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn caller(&self) -> CallerId {
        self.caller
    }

    /// Keeps the link awake until released
    ///
    /// Reference-counted handles register on the first acquire and count
    /// the rest. Non-reference-counted handles register once and ignore
    /// further acquires while held; the calls are still counted so that
    /// excess releases can be detected.
    pub fn acquire(&self) -> Result<()> {
        let mut st = lock(&self.state);
        let register = if st.ref_counted {
            st.ref_count == 0
        } else {
            !st.held
        };

        if register {
            self.registry.register(self, st.work_source.clone())?;
            st.held = true;
        }
        st.ref_count += 1;
        Ok(())
    }

    /// Undoes an acquire
    ///
    /// Reference-counted handles unregister when the count drops to zero,
    /// one-shot handles on the first release while held. Releasing more
    /// often than acquiring is reported as an
    /// [`LinkError::InvariantViolation`] and leaves the handle unchanged.
    pub fn release(&self) -> Result<()> {
        let mut st = lock(&self.state);
        if st.ref_count == 0 {
            return Err(LinkError::InvariantViolation(format!(
                "keep-awake lock under-locked: {}",
                self.tag
            )));
        }
        st.ref_count -= 1;
        let unregister = if st.ref_counted {
            st.ref_count == 0
        } else {
            st.held
        };

        if unregister {
            self.registry.unregister(self.id);
            st.held = false;
        }
        Ok(())
    }

    /// Replaces the attribution set; an empty set means "the caller"
    pub fn set_work_source(&self, ws: Option<WorkSource>) -> Result<()> {
        let mut st = lock(&self.state);
        let ws = WorkSource::non_empty(ws);
        let changed = st.work_source != ws;
        st.work_source = ws;
        if changed && st.held {
            self.registry
                .update_work_source(self.id, st.work_source.clone(), self.caller)?;
        }
        Ok(())
    }

    /// Switches between reference-counted and one-shot semantics
    pub fn set_reference_counted(&self, ref_counted: bool) {
        lock(&self.state).ref_counted = ref_counted;
    }

    pub fn is_held(&self) -> bool {
        lock(&self.state).held
    }

    pub fn ref_count(&self) -> u32 {
        lock(&self.state).ref_count
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = lock(&self.state);
        f.debug_struct("LockHandle")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("caller", &self.caller)
            .field("held", &st.held)
            .field("ref_counted", &st.ref_counted)
            .field("ref_count", &st.ref_count)
            .finish()
    }
}

// ============================================================================
// LockRegistry
// ============================================================================

struct LockEntry {
    tag: String,
    caller: CallerId,
    owner: OwnerId,
    liveness: Weak<()>,
    work_source: WorkSource,
    state: Weak<Mutex<HandleState>>,
    since: DateTime<Utc>,
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<LockId, LockEntry>,
    acquired: u64,
    released: u64,
}

/// A registered lock, as shown in state dumps
#[derive(Debug, Clone, Serialize)]
pub struct LockInfo {
    pub id: LockId,
    pub tag: String,
    pub uid: u32,
    pub pid: u32,
    pub work_source: WorkSource,
    pub since: DateTime<Utc>,
}

/// Acquire/release counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LockStats {
    pub acquired: u64,
    pub released: u64,
    pub active: usize,
}

/// Process-wide registry of held keep-awake locks
pub struct LockRegistry {
    max_active: usize,
    inner: Mutex<RegistryInner>,
    activity: mpsc::UnboundedSender<LockActivity>,
}

impl LockRegistry {
    /// Creates a registry capped at `max_active` concurrently held locks
    pub fn new(max_active: usize, activity: mpsc::UnboundedSender<LockActivity>) -> Arc<Self> {
        Arc::new(Self {
            max_active,
            inner: Mutex::new(RegistryInner::default()),
            activity,
        })
    }

    /// Creates an unheld lock owned by `owner`
    pub fn new_lock(
        self: &Arc<Self>,
        caller: CallerId,
        owner: &OwnerBinding,
        tag: impl Into<String>,
        ref_counted: bool,
        work_source: Option<WorkSource>,
    ) -> LockHandle {
        LockHandle {
            id: LockId::new(),
            tag: tag.into(),
            caller,
            owner: owner.id(),
            liveness: owner.liveness(),
            state: Arc::new(Mutex::new(HandleState {
                ref_counted,
                ref_count: 0,
                held: false,
                work_source: WorkSource::non_empty(work_source),
            })),
            registry: Arc::clone(self),
        }
    }

    fn notify(&self, activity: LockActivity) {
        if self.activity.send(activity).is_err() {
            debug!(?activity, "Lock activity receiver gone");
        }
    }

    fn register(&self, handle: &LockHandle, ws: Option<WorkSource>) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            inner.entries.insert(
                handle.id,
                LockEntry {
                    tag: handle.tag.clone(),
                    caller: handle.caller,
                    owner: handle.owner,
                    liveness: handle.liveness.clone(),
                    work_source: ws.unwrap_or_else(|| WorkSource::single(handle.caller.uid)),
                    state: Arc::downgrade(&handle.state),
                    since: Utc::now(),
                },
            );
            if inner.entries.len() > self.max_active {
                inner.entries.remove(&handle.id);
                warn!(
                    tag = %handle.tag,
                    caller = %handle.caller,
                    max = self.max_active,
                    "Exceeded maximum number of keep-awake locks"
                );
                return Err(LinkError::ResourceExhausted {
                    max: self.max_active,
                });
            }
            inner.acquired += 1;
        }

        debug!(lock = %handle.id, tag = %handle.tag, caller = %handle.caller, "Lock acquired");
        self.notify(LockActivity::Acquired(handle.id));
        Ok(())
    }

    fn unregister(&self, id: LockId) -> bool {
        let removed = {
            let mut inner = lock(&self.inner);
            let removed = inner.entries.remove(&id).is_some();
            if removed {
                inner.released += 1;
            }
            removed
        };
        if removed {
            debug!(lock = %id, "Lock released");
        }
        self.notify(LockActivity::Released(id));
        removed
    }

    fn update_work_source(
        &self,
        id: LockId,
        ws: Option<WorkSource>,
        caller: CallerId,
    ) -> Result<()> {
        {
            let mut inner = lock(&self.inner);
            let entry = inner
                .entries
                .get_mut(&id)
                .ok_or_else(|| LinkError::InvariantViolation("lock not active".into()))?;
            entry.work_source = ws.unwrap_or_else(|| WorkSource::single(caller.uid));
        }
        self.notify(LockActivity::WorkSourceChanged(id));
        Ok(())
    }

    /// Releases every lock of an owner that is known to be gone
    ///
    /// Returns the number of locks released.
    pub fn owner_died(&self, owner: OwnerId) -> usize {
        self.release_where(|e| e.owner == owner)
    }

    /// Releases every lock whose owner binding has been dropped
    pub fn reap_dead_owners(&self) -> usize {
        self.release_where(|e| e.liveness.strong_count() == 0)
    }

    fn release_where(&self, dead: impl Fn(&LockEntry) -> bool) -> usize {
        let removed: Vec<(LockId, LockEntry)> = {
            let mut inner = lock(&self.inner);
            let ids: Vec<LockId> = inner
                .entries
                .iter()
                .filter(|(_, e)| dead(e))
                .map(|(id, _)| *id)
                .collect();
            let removed: Vec<_> = ids
                .into_iter()
                .filter_map(|id| inner.entries.remove(&id).map(|e| (id, e)))
                .collect();
            inner.released += removed.len() as u64;
            removed
        };

        for (id, entry) in &removed {
            if let Some(state) = entry.state.upgrade() {
                let mut st = lock(&state);
                st.held = false;
                st.ref_count = 0;
            }
            info!(lock = %id, tag = %entry.tag, caller = %entry.caller, "Released lock of dead owner");
            self.notify(LockActivity::Released(*id));
        }
        removed.len()
    }

    /// True if any lock is held
    pub fn has_locks(&self) -> bool {
        !lock(&self.inner).entries.is_empty()
    }

    pub fn active_count(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    /// Union of the work sources of every held lock
    pub fn combined_work_source(&self) -> WorkSource {
        let inner = lock(&self.inner);
        let mut ws = WorkSource::new();
        for entry in inner.entries.values() {
            ws.add(&entry.work_source);
        }
        ws
    }

    pub fn stats(&self) -> LockStats {
        let inner = lock(&self.inner);
        LockStats {
            acquired: inner.acquired,
            released: inner.released,
            active: inner.entries.len(),
        }
    }

    /// Held locks, oldest first
    pub fn snapshot(&self) -> Vec<LockInfo> {
        let inner = lock(&self.inner);
        let mut locks: Vec<LockInfo> = inner
            .entries
            .iter()
            .map(|(id, e)| LockInfo {
                id: *id,
                tag: e.tag.clone(),
                uid: e.caller.uid.as_raw(),
                pid: e.caller.pid,
                work_source: e.work_source.clone(),
                since: e.since,
            })
            .collect();
        locks.sort_by_key(|l| l.since);
        locks
    }
}
