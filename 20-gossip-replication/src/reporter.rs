use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use crate::{membership::MembershipView, message::Snapshot, reconcile::ReconciliationEngine};

pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugReport {
    pub members: Vec<String>,
    pub state: Snapshot,
    pub stale_drops: u64,
}

/// Periodically logs membership and the replicated value. Never writes.
pub struct DebugReporter<M> {
    membership: Arc<M>,
    engine: Arc<ReconciliationEngine>,
    interval: Duration,
}

impl<M: MembershipView> DebugReporter<M> {
    pub fn new(membership: Arc<M>, engine: Arc<ReconciliationEngine>, interval: Duration) -> Self {
        Self {
            membership,
            engine,
            interval,
        }
    }

    pub fn report(&self) -> DebugReport {
        DebugReport {
            members: self.membership.members(),
            state: self.engine.value().get(),
            stale_drops: self.engine.stale_drops(),
        }
    }

    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let report = self.report();
                    debug!(
                        members = ?report.members,
                        value = report.state.value,
                        generation = report.state.generation,
                        stale_drops = report.stale_drops,
                        "node status"
                    );
                }
            }
        }
    }
}
