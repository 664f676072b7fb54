//! Cluster control endpoints: health, leadership, membership, metrics.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::node::{LeaderInfo, MetricsDoc, NewPeerInfo, Node};

/// `GET /health`: liveness probe.  Also reports the role so election
/// probes and dashboards get it in one call.
pub async fn health(State(node): State<Arc<Node>>) -> Json<Value> {
    Json(json!({
        "status": "alive",
        "is_leader": node.is_leader().await,
    }))
}

/// `POST /new_leader`: adopt a leadership change announced by a peer.
///
/// A promotion or demotion here flips the liveness loop via the role
/// supervisor; the announcing node does not wait for that to happen.
pub async fn new_leader(State(node): State<Arc<Node>>, Json(info): Json<LeaderInfo>) -> Json<Value> {
    node.set_leadership(info).await;
    Json(json!({ "status": "updated" }))
}

/// `POST /new_peer`: register a node the orchestrator just started.
pub async fn new_peer(State(node): State<Arc<Node>>, Json(info): Json<NewPeerInfo>) -> Json<Value> {
    node.add_peer(info.peer_id).await;
    Json(json!({ "status": "updated" }))
}

/// `GET /metrics`: the JSON counter document.
pub async fn metrics(State(node): State<Arc<Node>>) -> Json<MetricsDoc> {
    Json(node.metrics().await)
}
