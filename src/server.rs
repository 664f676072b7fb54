//! Axum router construction and route mapping.
//!
//! The [`app`] function wires every node endpoint to its handler and
//! returns a ready-to-serve [`axum::Router`].  The same surface serves
//! clients, peers and the metrics dashboard; nothing distinguishes an
//! inter-node call from an external one.

use axum::http::HeaderValue;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{cluster, kv};
use crate::metrics::{metrics_middleware, prometheus_handler};
use crate::node::Node;

/// Build the axum [`Router`] with all node routes.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(node: Arc<Node>) -> Router {
    let cors = cors_layer(&node.config.server.cors_origins);

    Router::new()
        // Key-value surface.
        .route("/write", post(kv::write))
        .route("/read/:key", get(kv::read))
        .route("/replicate", post(kv::replicate))
        .route("/dump", get(kv::dump))
        // Cluster control surface.
        .route("/health", get(cluster::health))
        .route("/new_leader", post(cluster::new_leader))
        .route("/new_peer", post(cluster::new_peer))
        // Counters as JSON, plus Prometheus exposition for scrapers.
        .route("/metrics", get(cluster::metrics))
        .route("/metrics/prometheus", get(prometheus_handler))
        // Node state shared across all handlers.
        .with_state(node)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        // metrics_middleware is outermost so it captures the full
        // request lifecycle.
        .layer(middleware::from_fn(metrics_middleware))
}

/// CORS for the browser dashboard: configured origins, any method and
/// header.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}
