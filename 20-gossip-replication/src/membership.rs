//! Cluster membership as seen by the replication engine.
//!
//! Failure detection is someone else's job: the engine only asks "who is
//! alive right now?" and needs a way to join and leave. [`StaticMembership`]
//! covers that contract with a seed list that an embedding program can
//! update as members come and go.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum MembershipError {
    #[error("invalid seed address '{0}'")]
    InvalidSeed(String),
    #[error("membership view has already left the cluster")]
    AlreadyLeft,
}

/// Live-member view consumed by the dissemination loop.
pub trait MembershipView: Send + Sync + 'static {
    /// Addresses currently believed alive. May include the local node.
    fn members(&self) -> Vec<String>;

    /// Joins the cluster through `seed`.
    fn join(&self, seed: &str) -> Result<(), MembershipError>;

    /// Records `addr` as alive because it just contacted this node.
    ///
    /// Joining through a seed only teaches the joiner about the seed; the
    /// seed learns about the joiner from the joiner's first push.
    fn observe(&self, addr: &str);

    /// Leaves the cluster. Called once on shutdown.
    fn leave(&self);
}

#[derive(Debug, Default)]
struct MembershipState {
    peers: BTreeSet<String>,
    left: bool,
}

/// Membership built from configured seeds plus explicit add/remove calls.
#[derive(Debug)]
pub struct StaticMembership {
    local: String,
    state: RwLock<MembershipState>,
}

impl StaticMembership {
    pub fn new(local: impl Into<String>) -> Self {
        Self {
            local: local.into(),
            state: RwLock::new(MembershipState::default()),
        }
    }

    /// Records a member reported alive by an external failure detector.
    pub fn add_member(&self, addr: impl Into<String>) {
        let addr = addr.into();
        if addr == self.local {
            return;
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.left {
            state.peers.insert(addr);
        }
    }

    /// Forgets a member reported dead by an external failure detector.
    pub fn remove_member(&self, addr: &str) -> bool {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .peers
            .remove(addr)
    }
}

impl MembershipView for StaticMembership {
    fn members(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        let mut members = Vec::with_capacity(state.peers.len() + 1);
        members.push(self.local.clone());
        members.extend(state.peers.iter().cloned());
        members
    }

    fn join(&self, seed: &str) -> Result<(), MembershipError> {
        if !is_socket_address(seed) {
            return Err(MembershipError::InvalidSeed(seed.to_string()));
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.left {
            return Err(MembershipError::AlreadyLeft);
        }
        if seed != self.local {
            state.peers.insert(seed.to_string());
        }
        Ok(())
    }

    fn observe(&self, addr: &str) {
        if !is_socket_address(addr) {
            debug!(%addr, "ignoring malformed origin");
            return;
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if !state.left && addr != self.local && state.peers.insert(addr.to_string()) {
            info!(%addr, "learned new member");
        }
    }

    fn leave(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.peers.clear();
        state.left = true;
    }
}

fn is_socket_address(addr: &str) -> bool {
    if addr.parse::<SocketAddr>().is_ok() {
        return true;
    }
    // Accept `host:port` names without resolving them up front.
    match addr.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}

/// Keeps the node in the cluster until dropped.
pub struct MembershipGuard<M: MembershipView> {
    view: Arc<M>,
}

impl<M: MembershipView> MembershipGuard<M> {
    pub fn view(&self) -> &Arc<M> {
        &self.view
    }
}

impl<M: MembershipView> Drop for MembershipGuard<M> {
    fn drop(&mut self) {
        self.view.leave();
        info!("left cluster");
    }
}

/// Joins through every seed and returns a guard that leaves on drop.
///
/// Seed failures are logged and skipped. A node whose seeds all fail still
/// runs, as a cluster of one, until membership recovers.
pub fn join_cluster<M: MembershipView>(view: Arc<M>, seeds: &[String]) -> MembershipGuard<M> {
    let mut joined = 0;
    for seed in seeds {
        match view.join(seed) {
            Ok(()) => joined += 1,
            Err(err) => warn!(%seed, error = %err, "failed to join through seed"),
        }
    }

    if !seeds.is_empty() && joined == 0 {
        warn!("no seed reachable; running as a singleton cluster");
    }
    info!(joined, members = view.members().len(), "joined cluster");

    MembershipGuard { view }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_include_local_address_first() {
        let view = StaticMembership::new("127.0.0.1:7000");
        view.join("127.0.0.1:7002").expect("join");
        view.join("127.0.0.1:7001").expect("join");

        assert_eq!(
            view.members(),
            vec!["127.0.0.1:7000", "127.0.0.1:7001", "127.0.0.1:7002"]
        );
    }

    #[test]
    fn join_rejects_malformed_seed() {
        let view = StaticMembership::new("127.0.0.1:7000");
        assert!(matches!(
            view.join("not-an-address"),
            Err(MembershipError::InvalidSeed(_))
        ));
        assert!(matches!(
            view.join("node-a:99999"),
            Err(MembershipError::InvalidSeed(_))
        ));
        assert!(view.join("node-a:7000").is_ok());
    }

    #[test]
    fn joining_self_is_a_no_op() {
        let view = StaticMembership::new("127.0.0.1:7000");
        view.join("127.0.0.1:7000").expect("join self");
        assert_eq!(view.members(), vec!["127.0.0.1:7000"]);
    }

    #[test]
    fn failed_seeds_leave_a_singleton() {
        let view = Arc::new(StaticMembership::new("127.0.0.1:7000"));
        let guard = join_cluster(Arc::clone(&view), &["bogus".to_string()]);
        assert_eq!(guard.view().members(), vec!["127.0.0.1:7000"]);
    }

    #[test]
    fn guard_leaves_on_drop() {
        let view = Arc::new(StaticMembership::new("127.0.0.1:7000"));
        let guard = join_cluster(
            Arc::clone(&view),
            &["127.0.0.1:7001".to_string(), "127.0.0.1:7002".to_string()],
        );
        assert_eq!(view.members().len(), 3);

        drop(guard);

        assert_eq!(view.members(), vec!["127.0.0.1:7000"]);
        assert!(matches!(
            view.join("127.0.0.1:7001"),
            Err(MembershipError::AlreadyLeft)
        ));
        view.add_member("127.0.0.1:7003");
        assert_eq!(view.members().len(), 1);
    }

    #[test]
    fn observe_learns_peers_that_contact_us() {
        let view = StaticMembership::new("127.0.0.1:7000");
        view.observe("127.0.0.1:7005");
        view.observe("127.0.0.1:7005");
        view.observe("127.0.0.1:7000");
        view.observe("not-an-address");

        assert_eq!(view.members(), vec!["127.0.0.1:7000", "127.0.0.1:7005"]);

        view.leave();
        view.observe("127.0.0.1:7006");
        assert_eq!(view.members(), vec!["127.0.0.1:7000"]);
    }

    #[test]
    fn remove_member_reflects_failures() {
        let view = StaticMembership::new("127.0.0.1:7000");
        view.add_member("127.0.0.1:7001");
        assert!(view.remove_member("127.0.0.1:7001"));
        assert!(!view.remove_member("127.0.0.1:7001"));
        assert_eq!(view.members(), vec!["127.0.0.1:7000"]);
    }
}
