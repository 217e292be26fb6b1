use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/// A stable identity for a connection, independent of the connection's
/// own type or address. Minted once per connector call and carried
/// alongside the connection for the rest of its life in the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct ConnId(u64);

/// The set of every connection the pool currently owns, keyed by
/// [`ConnId`], paired with the instant it was created.
///
/// This is the source of truth for total connection count and for
/// "is this connection part of this pool?" — it is consulted, not
/// derived, on both the borrow and return paths.
#[allow(missing_debug_implementations)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ConnId, Instant>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Registry {
            next_id: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Mints a fresh, never-before-used id.
    pub(crate) fn mint_id(&self) -> ConnId {
        ConnId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn insert(&self, id: ConnId, created_at: Instant) {
        self.entries.lock().unwrap().insert(id, created_at);
    }

    /// Removes `id`, returning `true` if it was present.
    pub(crate) fn remove(&self, id: ConnId) -> bool {
        self.entries.lock().unwrap().remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: ConnId) -> bool {
        self.entries.lock().unwrap().contains_key(&id)
    }

    pub(crate) fn count(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Empties the registry, for use by `close`. Returns nothing: the
    /// connections themselves live in the idle queue or with borrowers,
    /// not here, so there is nothing further to hand back.
    pub(crate) fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
