//! Leader-side replication fan-out.

use std::sync::Arc;

use crate::node::{Node, NodeId, WriteRequest};

/// Fan a committed write out to `targets`.
///
/// At-most-once: one detached task per target posts `/replicate` once,
/// logs a failure and never retries.  A peer that was not in the alive
/// set when the write committed is simply not in `targets` and never
/// sees the write.
pub fn fan_out(node: Arc<Node>, targets: Vec<NodeId>, write: WriteRequest) {
    for peer in targets {
        let node = Arc::clone(&node);
        let write = write.clone();
        tokio::spawn(async move {
            let url = node.peer_url(peer, "/replicate");
            match node.http_client().post(&url).json(&write).send().await {
                Ok(_) => {
                    tracing::debug!(id = node.id, peer, key = %write.key, "replicated write")
                }
                Err(e) => {
                    tracing::error!(id = node.id, peer, error = %e, "failed to replicate write")
                }
            }
        });
    }
}
