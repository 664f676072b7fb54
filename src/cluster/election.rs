//! Bully leader election.
//!
//! The highest reachable node identifier wins, always.  A node that
//! finds no higher peer alive takes leadership itself; otherwise it
//! adopts the highest responder and announces the result to everyone.
//! Elections are not globally coordinated: concurrent rounds converge
//! because every node applies the same deterministic rule.

use crate::node::{LeaderInfo, Node, NodeId};

/// Winner among the higher peers that answered, if any.
fn highest_responder(responders: impl IntoIterator<Item = NodeId>) -> Option<NodeId> {
    responders.into_iter().max()
}

/// Run one bully election round.
///
/// Skipped when a round is already in flight.  Probes every peer with
/// an identifier greater than this node's; the highest responder is
/// elected, or this node elects itself when none answer.
pub async fn run_election(node: &Node) {
    if !node.try_begin_election() {
        tracing::debug!(id = node.id, "election already in progress, skipping");
        return;
    }
    tracing::info!(id = node.id, "starting election");

    let peers = node.peers().await;
    let mut responders = Vec::new();
    for peer in peers.iter().copied().filter(|p| *p > node.id) {
        let url = node.peer_url(peer, "/health");
        match node.http_client().get(&url).send().await {
            Ok(resp) if resp.status().is_success() => responders.push(peer),
            Ok(resp) => {
                tracing::warn!(id = node.id, peer, status = %resp.status(), "election probe rejected")
            }
            Err(e) => {
                tracing::warn!(id = node.id, peer, error = %e, "election probe failed")
            }
        }
    }

    match highest_responder(responders) {
        None => {
            // No higher peer is alive; leadership falls to this node.
            tracing::info!(id = node.id, "electing self as new leader");
            node.set_leadership(LeaderInfo {
                is_leader: true,
                leader_id: node.id,
            })
            .await;
            for peer in peers {
                notify(node, peer, LeaderInfo {
                    is_leader: false,
                    leader_id: node.id,
                })
                .await;
            }
        }
        Some(winner) => {
            tracing::info!(id = node.id, winner, "electing highest alive peer as new leader");
            node.set_leadership(LeaderInfo {
                is_leader: false,
                leader_id: winner,
            })
            .await;
            notify(node, winner, LeaderInfo {
                is_leader: true,
                leader_id: winner,
            })
            .await;
            for peer in peers.into_iter().filter(|p| *p != winner) {
                notify(node, peer, LeaderInfo {
                    is_leader: false,
                    leader_id: winner,
                })
                .await;
            }
        }
    }

    node.finish_election();
}

/// Tell `peer` who the new leader is.  Best-effort: a refusal or a
/// timeout is logged and the remaining notifications still go out.
async fn notify(node: &Node, peer: NodeId, info: LeaderInfo) {
    let url = node.peer_url(peer, "/new_leader");
    match node.http_client().post(&url).json(&info).send().await {
        Ok(_) => {
            tracing::info!(id = node.id, peer, leader_id = info.leader_id, "notified peer of new leader")
        }
        Err(e) => {
            tracing::error!(id = node.id, peer, error = %e, "failed to notify peer of new leader")
        }
    }
}
