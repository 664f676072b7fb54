//! Shared helpers for integration tests.
//!
//! Spawns real nodes inside the test process: each node gets its own
//! temp data directory, its background tasks, and an axum server bound
//! to a localhost port.  Tests drive the cluster exclusively over HTTP,
//! the way the orchestrator and peers do.  Every test uses its own port
//! range so test binaries can run in parallel.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use herdstore::{Config, Node, NodeId, Role};
use tokio::task::JoinHandle;

/// How long `wait_for_*` helpers poll before giving up.
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

struct RunningNode {
    tasks: Vec<JoinHandle<()>>,
    /// The serve task; completes once every connection has closed.
    server: JoinHandle<()>,
    /// Firing this starts the server's graceful shutdown.
    shutdown: tokio::sync::oneshot::Sender<()>,
}

/// A cluster of in-process nodes, addressed by port.
pub struct TestCluster {
    running: HashMap<NodeId, RunningNode>,
    /// Data directories outlive kills so a restarted node recovers.
    dirs: HashMap<NodeId, tempfile::TempDir>,
    client: reqwest::Client,
    /// Compaction interval applied to nodes started after the change.
    pub compaction_interval_secs: u64,
}

impl TestCluster {
    pub fn new() -> Self {
        // Same process-wide recorder the real binary installs.
        herdstore::metrics::init_metrics();
        Self {
            running: HashMap::new(),
            dirs: HashMap::new(),
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(2))
                .build()
                .expect("failed to build test client"),
            compaction_interval_secs: 3600,
        }
    }

    /// Start (or restart) a node on `port` with fast liveness timing.
    ///
    /// The data directory is created on first start and reused on
    /// restarts, so kills behave like process crashes.
    pub async fn start(&mut self, role: Role, port: NodeId, peers: Vec<NodeId>) {
        let dir = self
            .dirs
            .entry(port)
            .or_insert_with(|| tempfile::tempdir().expect("failed to create temp dir"));

        let mut config = Config::default();
        config.node.port = port;
        config.node.role = role;
        config.cluster.peers = peers;
        config.cluster.heartbeat_interval_secs = 1;
        config.cluster.leader_check_interval_secs = 1;
        config.cluster.probe_timeout_secs = 1;
        config.storage.data_dir = dir.path().to_string_lossy().into_owned();
        config.storage.compaction_interval_secs = self.compaction_interval_secs;

        let node = Arc::new(Node::new(config).expect("failed to build node"));
        let tasks = herdstore::spawn_background(Arc::clone(&node));

        let app = herdstore::server::app(node);
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .expect("failed to bind test port");
        // Serve with a shutdown signal: plain `axum::serve` detaches one
        // task per connection, so aborting the serve task alone would
        // leave established keep-alive connections answering for a node
        // that `kill` is supposed to have taken down.
        let (shutdown, shutdown_rx) = tokio::sync::oneshot::channel();
        let server = tokio::spawn(async move {
            let _ = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
        });

        self.running.insert(
            port,
            RunningNode {
                tasks,
                server,
                shutdown,
            },
        );
    }

    /// Kill a node the way the orchestrator does: everything stops, the
    /// data directory stays.
    pub async fn kill(&mut self, port: NodeId) {
        if let Some(node) = self.running.remove(&port) {
            // A process death severs every connection; waiting for the
            // serve task guarantees peers and the test client can no
            // longer reach the node through pooled keep-alive sockets.
            let _ = node.shutdown.send(());
            let mut server = node.server;
            if tokio::time::timeout(Duration::from_secs(5), &mut server)
                .await
                .is_err()
            {
                server.abort();
                let _ = server.await;
            }
            for task in node.tasks {
                task.abort();
                let _ = task.await;
            }
        }
    }

    /// Abort every running node.
    pub async fn shutdown(mut self) {
        let ports: Vec<NodeId> = self.running.keys().copied().collect();
        for port in ports {
            self.kill(port).await;
        }
    }

    /// The node's data directory on disk.
    #[allow(dead_code)]
    pub fn data_dir(&self, port: NodeId) -> PathBuf {
        self.dirs[&port].path().to_path_buf()
    }

    fn url(&self, port: NodeId, path: &str) -> String {
        format!("http://127.0.0.1:{port}{path}")
    }

    // -- HTTP drivers ---------------------------------------------------------

    /// `POST /write`; the returned bool is the node's accept/reject answer.
    pub async fn write(&self, port: NodeId, key: &str, value: &str) -> bool {
        self.client
            .post(self.url(port, "/write"))
            .json(&serde_json::json!({ "key": key, "value": value }))
            .send()
            .await
            .expect("write request failed")
            .json()
            .await
            .expect("write response was not a bool")
    }

    /// `GET /read/{key}`; `None` when the node answers 404.
    pub async fn read(&self, port: NodeId, key: &str) -> Option<String> {
        let resp = self
            .client
            .get(self.url(port, &format!("/read/{key}")))
            .send()
            .await
            .expect("read request failed");
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return None;
        }
        Some(resp.json().await.expect("read response was not a string"))
    }

    /// `GET /metrics` as a JSON document.
    pub async fn metrics(&self, port: NodeId) -> serde_json::Value {
        self.client
            .get(self.url(port, "/metrics"))
            .send()
            .await
            .expect("metrics request failed")
            .json()
            .await
            .expect("metrics response was not JSON")
    }

    /// `POST` a JSON body to an arbitrary path.
    pub async fn post_json(
        &self,
        port: NodeId,
        path: &str,
        body: serde_json::Value,
    ) -> serde_json::Value {
        self.client
            .post(self.url(port, path))
            .json(&body)
            .send()
            .await
            .expect("post request failed")
            .json()
            .await
            .expect("post response was not JSON")
    }

    // -- Wait helpers ---------------------------------------------------------

    /// Wait until the node reports `role` in its metrics document.
    pub async fn wait_for_role(&self, port: NodeId, role: Role, timeout: Duration) {
        let want = role.to_string();
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timeout waiting for node {port} to report role {want}");
            }
            let metrics = self.metrics(port).await;
            if metrics["node"]["role"] == want.as_str() {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until the node points at `leader` as the current leader.
    pub async fn wait_for_leader_view(&self, port: NodeId, leader: NodeId, timeout: Duration) {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timeout waiting for node {port} to see leader {leader}");
            }
            let metrics = self.metrics(port).await;
            if metrics["leadership"]["leader_id"] == leader {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until the node's alive-peer count reaches `alive`.
    pub async fn wait_for_alive_count(&self, port: NodeId, alive: usize, timeout: Duration) {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timeout waiting for node {port} to see {alive} alive peers");
            }
            let metrics = self.metrics(port).await;
            if metrics["peers"]["alive"] == alive {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until a read of `key` on the node returns `value`
    /// (replication is asynchronous).
    pub async fn wait_for_value(&self, port: NodeId, key: &str, value: &str, timeout: Duration) {
        let start = Instant::now();
        loop {
            if start.elapsed() > timeout {
                panic!("timeout waiting for node {port} to hold {key}={value}");
            }
            if self.read(port, key).await.as_deref() == Some(value) {
                return;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}
