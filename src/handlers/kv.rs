//! Key-value endpoints: write, read, replicate, dump.

use axum::extract::{Path, State};
use axum::Json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::cluster::replication;
use crate::errors::NodeError;
use crate::node::{Node, WriteOutcome, WriteRequest};

/// `POST /write`: client write, accepted only on the leader.
///
/// Responds `true` once the write is durable locally, `false` from a
/// non-leader (nothing touched).  Fan-out to followers starts after
/// the commit and does not delay or fail the response.
pub async fn write(
    State(node): State<Arc<Node>>,
    Json(req): Json<WriteRequest>,
) -> Result<Json<bool>, NodeError> {
    match node.apply_write(&req).await? {
        WriteOutcome::NotLeader => Ok(Json(false)),
        WriteOutcome::Committed { replicate_to } => {
            replication::fan_out(Arc::clone(&node), replicate_to, req);
            Ok(Json(true))
        }
    }
}

/// `GET /read/{key}`: local lookup, 404 when the key is absent.
pub async fn read(
    State(node): State<Arc<Node>>,
    Path(key): Path<String>,
) -> Result<Json<String>, NodeError> {
    Ok(Json(node.read(&key).await?))
}

/// `POST /replicate`: apply a write replicated from the leader.
///
/// Unconditional: a follower trusts whatever the leader fans out,
/// whoever it currently believes the leader is.
pub async fn replicate(State(node): State<Arc<Node>>, Json(req): Json<WriteRequest>) -> Json<bool> {
    node.apply_replicated(&req).await;
    Json(true)
}

/// `GET /dump`: the raw in-memory map, for diagnostics.
pub async fn dump(State(node): State<Arc<Node>>) -> Json<HashMap<String, String>> {
    Json(node.dump().await)
}
