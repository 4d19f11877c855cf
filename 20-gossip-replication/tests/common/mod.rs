use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gossip_replication::{
    message::Notification,
    reconcile::ReconciliationEngine,
    transport::{Transport, TransportError},
};

/// Delivers pushes straight into the target node's engine, in process.
#[derive(Default)]
pub struct LoopbackTransport {
    nodes: Mutex<HashMap<String, Arc<ReconciliationEngine>>>,
}

impl LoopbackTransport {
    pub fn register(&self, addr: &str, engine: Arc<ReconciliationEngine>) {
        self.nodes
            .lock()
            .expect("loopback registry")
            .insert(addr.to_string(), engine);
    }

    pub fn unregister(&self, addr: &str) {
        self.nodes.lock().expect("loopback registry").remove(addr);
    }
}

impl Transport for LoopbackTransport {
    async fn push(&self, peer: &str, notification: Notification) -> Result<(), TransportError> {
        let engine = self
            .nodes
            .lock()
            .expect("loopback registry")
            .get(peer)
            .cloned()
            .ok_or_else(|| TransportError::Unreachable(peer.to_string()))?;
        engine.apply(&notification);
        Ok(())
    }
}
