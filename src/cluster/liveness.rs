//! Peer liveness: the heartbeat and leader-check loops, and the role
//! supervisor that keeps exactly one of them running.

use std::sync::Arc;
use std::time::Duration;

use crate::cluster::election;
use crate::node::{Node, NodeId, Role};

/// Probe `peer`'s `/health`; true when it answers successfully in time.
async fn probe(node: &Node, peer: NodeId) -> bool {
    let url = node.peer_url(peer, "/health");
    match node.http_client().get(&url).send().await {
        Ok(resp) => resp.status().is_success(),
        Err(_) => false,
    }
}

/// Leader loop: probe every configured peer on a fixed interval and
/// fold the results into the alive set.
pub async fn heartbeat_loop(node: Arc<Node>) {
    let interval = Duration::from_secs(node.config.cluster.heartbeat_interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        for peer in node.peers().await {
            if probe(&node, peer).await {
                tracing::debug!(id = node.id, peer, "heartbeat ok");
                node.mark_alive(peer).await;
            } else {
                tracing::warn!(id = node.id, peer, "heartbeat failed");
                node.mark_dead(peer).await;
            }
        }
    }
}

/// Follower loop: watch the current leader and start an election when
/// it stops answering.
///
/// The election runs as a detached task: if this node wins, the
/// resulting role flip makes the supervisor abort this loop, and the
/// election must outlive it to finish notifying peers.
pub async fn leader_check_loop(node: Arc<Node>) {
    let interval = Duration::from_secs(node.config.cluster.leader_check_interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        let leader = node.leader_id().await;
        if !probe(&node, leader).await {
            tracing::warn!(id = node.id, leader, "leader unreachable, starting election");
            let node = Arc::clone(&node);
            tokio::spawn(async move {
                election::run_election(&node).await;
            });
        }
    }
}

/// Run the liveness loop matching the node's role, restarting it on
/// every role change.
///
/// The previous loop is aborted and joined before the next one starts,
/// so repeated promotions can never stack heartbeat loops.  The active
/// loop lives in a [`JoinSet`] owned by this task: tearing down the
/// supervisor tears down the loop with it.
///
/// [`JoinSet`]: tokio::task::JoinSet
pub async fn run_supervisor(node: Arc<Node>) {
    let mut role_rx = node.subscribe_role();
    let mut active = tokio::task::JoinSet::new();
    spawn_for_role(&mut active, *role_rx.borrow_and_update(), Arc::clone(&node));

    while role_rx.changed().await.is_ok() {
        let role = *role_rx.borrow_and_update();
        active.abort_all();
        while active.join_next().await.is_some() {}
        spawn_for_role(&mut active, role, Arc::clone(&node));
    }
}

fn spawn_for_role(active: &mut tokio::task::JoinSet<()>, role: Role, node: Arc<Node>) {
    tracing::info!(id = node.id, %role, "starting liveness loop");
    match role {
        Role::Leader => {
            active.spawn(heartbeat_loop(node));
        }
        Role::Follower => {
            active.spawn(leader_check_loop(node));
        }
    }
}
