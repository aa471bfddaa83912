//! Single-flight lease per `(app, user, session)` (§5). `Run` acquires the
//! lease before doing anything observable and releases it on every exit
//! path, including an early-dropped stream or a panic unwind, via an RAII
//! guard — grounded on the teacher's `DashMap`-keyed `SessionRegistry`
//! (`crates/agenticlaw-agent/src/session.rs`), restructured here to hold
//! presence rather than session state.

use agenticlaw_core::SessionKey;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// The process-wide table of in-progress session runs.
#[derive(Clone, Default)]
pub struct LeaseTable {
    inner: Arc<DashMap<SessionKey, ()>>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to acquire the lease for `key`. Returns `None` if a run is
    /// already in progress for this session — the caller must fail with
    /// `SessionBusy` and must not have emitted anything yet.
    pub fn try_acquire(&self, key: &SessionKey) -> Option<LeaseGuard> {
        match self.inner.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(());
                Some(LeaseGuard {
                    table: self.inner.clone(),
                    key: key.clone(),
                })
            }
        }
    }
}

/// Releases its session's lease on drop, regardless of how the holding
/// scope exits.
pub struct LeaseGuard {
    table: Arc<DashMap<SessionKey, ()>>,
    key: SessionKey,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}
