//! Push-based anti-entropy.
//!
//! Every `interval`, the disseminator picks up to `fanout` live peers at
//! random and pushes the local `(value, generation)` to each. There is no
//! pull path and no acknowledgment: a missed push is repaired by a later
//! cycle, either from this node or from any other node that has already
//! caught up.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::time::{MissedTickBehavior, interval, timeout};
use tracing::{debug, warn};

use crate::{
    membership::MembershipView,
    message::Notification,
    register::VersionedValue,
    transport::Transport,
};

pub const DEFAULT_FANOUT: usize = 2;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_PUSH_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct GossipConfig {
    /// Peers contacted per cycle.
    pub fanout: usize,
    /// Time between cycles.
    pub interval: Duration,
    /// Upper bound on a single push to a single peer.
    pub push_timeout: Duration,
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            fanout: DEFAULT_FANOUT,
            interval: DEFAULT_INTERVAL,
            push_timeout: DEFAULT_PUSH_TIMEOUT,
        }
    }
}

/// Outcome of one dissemination cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub targeted: Vec<String>,
    pub delivered: usize,
    pub failed: usize,
}

/// Picks the peers to push to this cycle.
///
/// The local address and duplicates are removed first. If what remains fits
/// within `fanout`, every peer is returned; otherwise `fanout` peers are
/// drawn uniformly without replacement.
pub fn select_peers<R: Rng + ?Sized>(
    members: &[String],
    local: &str,
    fanout: usize,
    rng: &mut R,
) -> Vec<String> {
    let mut peers: Vec<String> = members
        .iter()
        .filter(|addr| addr.as_str() != local)
        .cloned()
        .collect();
    peers.sort_unstable();
    peers.dedup();

    if peers.len() <= fanout {
        return peers;
    }
    peers.choose_multiple(rng, fanout).cloned().collect()
}

pub struct AntiEntropyDisseminator<M, T> {
    local: String,
    value: Arc<VersionedValue>,
    membership: Arc<M>,
    transport: Arc<T>,
    config: GossipConfig,
}

impl<M, T> AntiEntropyDisseminator<M, T>
where
    M: MembershipView,
    T: Transport,
{
    pub fn new(
        local: impl Into<String>,
        value: Arc<VersionedValue>,
        membership: Arc<M>,
        transport: Arc<T>,
        config: GossipConfig,
    ) -> Self {
        Self {
            local: local.into(),
            value,
            membership,
            transport,
            config,
        }
    }

    /// Runs a single dissemination cycle.
    ///
    /// Pushes run concurrently, each bounded by `push_timeout`, so an
    /// unreachable peer costs at most one timeout and never delays the
    /// others.
    pub async fn run_cycle(&self) -> CycleReport {
        let members = self.membership.members();
        let targeted = select_peers(
            &members,
            &self.local,
            self.config.fanout,
            &mut rand::thread_rng(),
        );
        if targeted.is_empty() {
            debug!("no peers to gossip with");
            return CycleReport::default();
        }

        let pushes = targeted.iter().map(|peer| self.push_to(peer));
        let results = join_all(pushes).await;
        let delivered = results.iter().filter(|ok| **ok).count();

        CycleReport {
            failed: targeted.len() - delivered,
            delivered,
            targeted,
        }
    }

    async fn push_to(&self, peer: &str) -> bool {
        // Fresh snapshot per peer so a write mid-cycle is picked up immediately.
        let notification = Notification::from_snapshot(self.value.get(), self.local.as_str());
        let generation = notification.generation;

        match timeout(
            self.config.push_timeout,
            self.transport.push(peer, notification),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(%peer, generation, "pushed state");
                true
            }
            Ok(Err(err)) => {
                warn!(%peer, error = %err, "gossip push failed");
                false
            }
            Err(_) => {
                warn!(%peer, timeout = ?self.config.push_timeout, "gossip push timed out");
                false
            }
        }
    }

    /// Runs cycles every `interval` until `shutdown` resolves.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let report = self.run_cycle().await;
                    if report.failed > 0 {
                        debug!(?report, "gossip cycle finished with failures");
                    }
                }
            }
        }
        debug!("dissemination stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::membership::StaticMembership;
    use crate::message::Snapshot;
    use crate::transport::TransportError;

    fn addrs(ports: &[u16]) -> Vec<String> {
        ports.iter().map(|p| format!("127.0.0.1:{p}")).collect()
    }

    #[test]
    fn select_excludes_self_and_returns_everyone_when_small() {
        let members = addrs(&[7000, 7001, 7002]);
        let mut rng = StdRng::seed_from_u64(1);

        let mut picked = select_peers(&members, "127.0.0.1:7000", 5, &mut rng);
        picked.sort();
        assert_eq!(picked, addrs(&[7001, 7002]));
    }

    #[test]
    fn select_never_repeats_a_peer() {
        let members = addrs(&[7000, 7001, 7001, 7002, 7003, 7004, 7005]);
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..100 {
            let picked = select_peers(&members, "127.0.0.1:7000", 3, &mut rng);
            assert_eq!(picked.len(), 3);
            let unique: HashSet<_> = picked.iter().collect();
            assert_eq!(unique.len(), 3);
            assert!(!picked.contains(&"127.0.0.1:7000".to_string()));
        }
    }

    #[test]
    fn select_reaches_every_peer_over_time() {
        let members = addrs(&[7000, 7001, 7002, 7003, 7004]);
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = HashSet::new();

        for _ in 0..200 {
            seen.extend(select_peers(&members, "127.0.0.1:7000", 1, &mut rng));
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn select_with_no_peers_is_empty() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(select_peers(&addrs(&[7000]), "127.0.0.1:7000", 2, &mut rng).is_empty());
    }

    #[derive(Default)]
    struct RecordingTransport {
        pushes: Mutex<Vec<(String, Notification)>>,
        failing: HashSet<String>,
    }

    impl Transport for RecordingTransport {
        async fn push(&self, peer: &str, notification: Notification) -> Result<(), TransportError> {
            if self.failing.contains(peer) {
                return Err(TransportError::Unreachable(peer.to_string()));
            }
            self.pushes
                .lock()
                .expect("pushes lock")
                .push((peer.to_string(), notification));
            Ok(())
        }
    }

    fn disseminator(
        fanout: usize,
        peers: &[u16],
        transport: Arc<RecordingTransport>,
    ) -> (Arc<VersionedValue>, AntiEntropyDisseminator<StaticMembership, RecordingTransport>) {
        let membership = Arc::new(StaticMembership::new("127.0.0.1:7000"));
        for peer in addrs(peers) {
            membership.add_member(peer);
        }
        let value = Arc::new(VersionedValue::new(0));
        let config = GossipConfig {
            fanout,
            ..GossipConfig::default()
        };
        let gossip = AntiEntropyDisseminator::new(
            "127.0.0.1:7000",
            Arc::clone(&value),
            membership,
            transport,
            config,
        );
        (value, gossip)
    }

    #[tokio::test]
    async fn large_fanout_pushes_to_each_peer_exactly_once() {
        let transport = Arc::new(RecordingTransport::default());
        let (value, gossip) = disseminator(10, &[7001, 7002, 7003], Arc::clone(&transport));
        value.set(12);

        let report = gossip.run_cycle().await;
        assert_eq!(report.delivered, 3);
        assert_eq!(report.failed, 0);

        let pushes = transport.pushes.lock().expect("pushes lock");
        let mut peers: Vec<_> = pushes.iter().map(|(peer, _)| peer.clone()).collect();
        peers.sort();
        assert_eq!(peers, addrs(&[7001, 7002, 7003]));
        for (_, notification) in pushes.iter() {
            assert_eq!(
                Snapshot::new(notification.value, notification.generation),
                Snapshot::new(12, 1)
            );
            assert_eq!(notification.origin, "127.0.0.1:7000");
        }
    }

    #[tokio::test]
    async fn a_failing_peer_does_not_block_the_rest() {
        let transport = Arc::new(RecordingTransport {
            failing: HashSet::from(["127.0.0.1:7002".to_string()]),
            ..RecordingTransport::default()
        });
        let (_, gossip) = disseminator(3, &[7001, 7002, 7003], Arc::clone(&transport));

        let report = gossip.run_cycle().await;
        assert_eq!(report.targeted.len(), 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
    }

    #[tokio::test]
    async fn singleton_cycle_targets_nobody() {
        let transport = Arc::new(RecordingTransport::default());
        let (_, gossip) = disseminator(2, &[], Arc::clone(&transport));

        assert_eq!(gossip.run_cycle().await, CycleReport::default());
        assert!(transport.pushes.lock().expect("pushes lock").is_empty());
    }

    struct StalledTransport;

    impl Transport for StalledTransport {
        async fn push(&self, peer: &str, _: Notification) -> Result<(), TransportError> {
            if peer == "127.0.0.1:7001" {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_peer_is_cut_off_by_push_timeout() {
        let membership = Arc::new(StaticMembership::new("127.0.0.1:7000"));
        membership.add_member("127.0.0.1:7001");
        membership.add_member("127.0.0.1:7002");
        let gossip = AntiEntropyDisseminator::new(
            "127.0.0.1:7000",
            Arc::new(VersionedValue::new(0)),
            membership,
            Arc::new(StalledTransport),
            GossipConfig {
                fanout: 2,
                push_timeout: Duration::from_millis(50),
                ..GossipConfig::default()
            },
        );

        let report = gossip.run_cycle().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
    }
}
