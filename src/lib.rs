//! HerdStore library: replicated key-value store node.
//!
//! This crate provides the core components for running one node of a
//! leader/follower key-value cluster: durable snapshot + WAL storage,
//! leader-side replication fan-out, peer liveness tracking, bully
//! leader election, and the node's HTTP surface.

use std::sync::Arc;
use tokio::task::JoinHandle;

pub mod cluster;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod node;
pub mod server;
pub mod storage;

pub use config::Config;
pub use errors::NodeError;
pub use node::{Node, NodeId, Role};

/// Spawn the node's background work: the role supervisor (which owns
/// the liveness loop for the current role) and the WAL compaction loop.
///
/// The tasks run until the process exits; the returned handles exist so
/// embedders (tests) can abort them when tearing a node down early.
pub fn spawn_background(node: Arc<Node>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(cluster::liveness::run_supervisor(Arc::clone(&node))),
        tokio::spawn(node::run_compaction_loop(node)),
    ]
}
