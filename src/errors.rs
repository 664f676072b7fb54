//! Node error types.
//!
//! Every variant maps to one class of failure a node operation can hit.
//! The enum implements [`axum::response::IntoResponse`] so handlers can
//! simply return `Err(NodeError::KeyNotFound { .. })`.
//!
//! Peer-unreachable conditions are deliberately absent: probe,
//! replication and election notification failures are absorbed into the
//! alive-peer set or dropped after logging, and never surface to the
//! node's own HTTP clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The requested key does not exist. An ordinary outcome, not a fault.
    #[error("key not found: {key}")]
    KeyNotFound { key: String },

    /// A WAL line failed to parse during startup replay. The node must
    /// not come up with partial data.
    #[error("malformed WAL entry at line {line}: {source}")]
    WalCorrupt {
        line: usize,
        source: serde_json::Error,
    },

    /// Snapshot or WAL I/O failure.
    #[error("storage failure: {0}")]
    Storage(#[from] std::io::Error),

    /// Snapshot or WAL encoding failure outside replay.
    #[error("storage encoding failure: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl NodeError {
    /// Return the stable error code string used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            NodeError::KeyNotFound { .. } => "KeyNotFound",
            NodeError::WalCorrupt { .. } => "WalCorrupt",
            NodeError::Storage(_) => "StorageFailure",
            NodeError::Encoding(_) => "StorageFailure",
            NodeError::Internal(_) => "InternalError",
        }
    }

    /// Return the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NodeError::KeyNotFound { .. } => StatusCode::NOT_FOUND,
            NodeError::WalCorrupt { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Encoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
            NodeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the durable state may be inconsistent after this error.
    pub fn is_storage_fault(&self) -> bool {
        matches!(
            self,
            NodeError::WalCorrupt { .. } | NodeError::Storage(_) | NodeError::Encoding(_)
        )
    }
}

impl IntoResponse for NodeError {
    fn into_response(self) -> Response {
        // A write that failed to reach the WAL must be loud: the caller
        // sees a 500 and the entry was not committed.
        if self.is_storage_fault() {
            tracing::error!(error = %self, "storage fault");
        }

        let status = self.status_code();
        let body = json!({
            "error": self.code(),
            "message": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_not_found_is_404() {
        let err = NodeError::KeyNotFound {
            key: "missing".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.code(), "KeyNotFound");
        assert!(!err.is_storage_fault());
    }

    #[test]
    fn test_storage_errors_are_500s() {
        let err = NodeError::Storage(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "wal.log unwritable",
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_storage_fault());

        let err = NodeError::WalCorrupt {
            line: 3,
            source: serde_json::from_str::<serde_json::Value>("{not json").unwrap_err(),
        };
        assert_eq!(err.code(), "WalCorrupt");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.is_storage_fault());
    }
}
