//! The replicated integer and its generation counter.
//!
//! Every node owns exactly one [`VersionedValue`]. Local writes bump the
//! generation by one; remote notifications are merged with
//! last-writer-wins-by-generation. Both fields live behind a single
//! `RwLock` so a reader never sees a value from one write paired with the
//! generation of another.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::message::Snapshot;

#[derive(Debug)]
struct Versioned {
    value: i64,
    generation: u64,
}

/// Thread-safe container for the node's replicated state.
///
/// # Why RwLock instead of Mutex?
///
/// Reads happen on every gossip push, every debug report and every `GET`,
/// while writes only happen on `SET` and accepted notifications. Readers
/// can share the lock; writers hold it for two integer stores.
#[derive(Debug)]
pub struct VersionedValue {
    inner: RwLock<Versioned>,
}

impl VersionedValue {
    /// Creates the container with the seed value at generation 0.
    pub fn new(initial: i64) -> Self {
        Self {
            inner: RwLock::new(Versioned {
                value: initial,
                generation: 0,
            }),
        }
    }

    /// Returns the current `(value, generation)` pair.
    pub fn get(&self) -> Snapshot {
        let guard = self.read();
        Snapshot::new(guard.value, guard.generation)
    }

    /// Stores a new local value and advances the generation by exactly one.
    ///
    /// Writing the same value again still advances the generation, so the
    /// write displaces any replica that diverged in the meantime.
    pub fn set(&self, value: i64) -> Snapshot {
        let mut guard = self.write();
        guard.value = value;
        guard.generation += 1;
        Snapshot::new(guard.value, guard.generation)
    }

    /// Merges a remote `(value, generation)` pair.
    ///
    /// Returns `true` only when `generation` is strictly greater than the
    /// local one. Equal generations are treated as re-delivery and lower
    /// ones as stale; both leave the state untouched.
    pub fn reconcile(&self, value: i64, generation: u64) -> bool {
        // Cheap shared check first so stale gossip never contends with writers.
        let observed = self.read().generation;
        if generation <= observed {
            return false;
        }

        let mut guard = self.write();
        // Another writer may have moved ahead between the two locks.
        if generation <= guard.generation {
            return false;
        }
        guard.value = value;
        guard.generation = generation;
        true
    }

    // The guarded data is two integers that are always written together, so a
    // panic in another holder cannot leave it half-updated.
    fn read(&self) -> RwLockReadGuard<'_, Versioned> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Versioned> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
