//! [`StateStore`] – single owner of the authoritative security state.
//!
//! A plain guarded record: no validation lives here. The only writer is
//! [`SecurityGate`][crate::gate::SecurityGate], which takes the write lock for
//! the duration of one policy evaluation.

use std::sync::{PoisonError, RwLock};

use centinela_types::{SecurityMode, Snapshot};

pub struct StateStore {
    inner: RwLock<Snapshot>,
}

impl StateStore {
    /// Create a store with every sensor unknown, the alarm silent, and the
    /// arming mode set to `initial_mode`.
    pub fn new(initial_mode: SecurityMode) -> Self {
        Self {
            inner: RwLock::new(Snapshot::initial(initial_mode)),
        }
    }

    /// Copy of the full state, taken under the read lock.
    pub fn snapshot(&self) -> Snapshot {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Atomic read-modify-write.
    ///
    /// `f` runs with the write lock held; concurrent readers see either the
    /// state before or the state after, never a partial update.
    pub fn update<R>(&self, f: impl FnOnce(&mut Snapshot) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(SecurityMode::default())
    }
}
