//! JSON payloads exchanged between nodes and with control-plane clients.

use serde::{Deserialize, Serialize};

/// A consistent `(value, generation)` pair read from a node.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Snapshot {
    pub value: i64,
    pub generation: u64,
}

impl Snapshot {
    pub fn new(value: i64, generation: u64) -> Self {
        Self { value, generation }
    }
}

/// State pushed from one node to another during a gossip cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub value: i64,
    pub generation: u64,
    /// Address of the node that sent this notification.
    pub origin: String,
}

impl Notification {
    pub fn from_snapshot(snapshot: Snapshot, origin: impl Into<String>) -> Self {
        Self {
            value: snapshot.value,
            generation: snapshot.generation,
            origin: origin.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetRequest {
    pub value: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotifyResponse {
    pub changed: bool,
}
