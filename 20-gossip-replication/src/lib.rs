//! A single integer replicated across a cluster by gossip.
//!
//! Each node owns one [`register::VersionedValue`]: an `i64` plus a
//! generation counter. Local writes bump the generation; every couple of
//! seconds each node pushes its current pair to a few random peers, and a
//! peer keeps whichever pair carries the higher generation. Absent permanent
//! partitions, every node converges on the highest generation written
//! anywhere. This is eventual consistency, not linearizability.
//!
//! # Modules
//!
//! - [`register`]: the lock-protected value and its merge rule
//! - [`reconcile`]: applies notifications received from peers
//! - [`gossip`]: periodic push-based anti-entropy
//! - [`membership`]: the live-member view and scoped join/leave
//! - [`reporter`]: periodic read-only status logging
//! - [`transport`]: pushes a notification to one peer over HTTP
//! - [`http`]: axum routes for `get`, `set` and `notify`
//! - [`node`]: runs all of the above as independent tasks
//! - [`cli`]: command-line and environment configuration
//! - [`message`]: JSON payloads

pub mod cli;
pub mod gossip;
pub mod http;
pub mod membership;
pub mod message;
pub mod node;
pub mod reconcile;
pub mod register;
pub mod reporter;
pub mod transport;
