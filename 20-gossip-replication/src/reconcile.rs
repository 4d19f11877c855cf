use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tracing::{debug, info};

use crate::{message::Notification, register::VersionedValue};

/// Applies notifications received from peers to the local value.
///
/// Merging is synchronous and idempotent, so there is nothing to retry:
/// a notification either carries a newer generation and wins, or it is
/// dropped.
pub struct ReconciliationEngine {
    value: Arc<VersionedValue>,
    stale_drops: AtomicU64,
}

impl ReconciliationEngine {
    pub fn new(value: Arc<VersionedValue>) -> Self {
        Self {
            value,
            stale_drops: AtomicU64::new(0),
        }
    }

    /// Merges `notification` and reports whether local state changed.
    pub fn apply(&self, notification: &Notification) -> bool {
        let changed = self
            .value
            .reconcile(notification.value, notification.generation);

        if changed {
            info!(
                value = notification.value,
                generation = notification.generation,
                origin = %notification.origin,
                "accepted newer state from peer"
            );
        } else {
            self.stale_drops.fetch_add(1, Ordering::Relaxed);
            debug!(
                generation = notification.generation,
                origin = %notification.origin,
                "dropped stale notification"
            );
        }

        changed
    }

    /// Number of notifications dropped because they were not newer.
    pub fn stale_drops(&self) -> u64 {
        self.stale_drops.load(Ordering::Relaxed)
    }

    pub fn value(&self) -> &Arc<VersionedValue> {
        &self.value
    }
}
