//! Node runtime state and the write/read core.
//!
//! A [`Node`] owns everything one cluster member knows: its identity,
//! role, leader pointer, peer membership, the in-memory map and the
//! durable store behind it.  All mutable state lives behind a single
//! async mutex; the write path holds that lock across the WAL append
//! and compaction holds it across the snapshot write, so WAL file
//! order equals wall-clock order and no write can land inside a
//! compaction window.
//!
//! Outbound calls (replication, probes, notifications) never run under
//! the lock; callers snapshot what they need and release it first.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};

use crate::config::Config;
use crate::errors::NodeError;
use crate::storage::{DurableStore, WalEntry};

/// Node identifier: the port the node listens on.
pub type NodeId = u16;

/// Cluster role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Leader,
    Follower,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Follower => write!(f, "follower"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "leader" => Ok(Role::Leader),
            "follower" => Ok(Role::Follower),
            other => Err(format!(
                "unknown role {other:?}, expected \"leader\" or \"follower\""
            )),
        }
    }
}

/// A client write: `{key, value}`.  The node stamps the timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRequest {
    pub key: String,
    pub value: String,
}

/// Leadership notification exchanged between peers.
///
/// `is_leader` tells the *recipient* whether it is the new leader;
/// `leader_id` identifies the leader either way.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LeaderInfo {
    pub is_leader: bool,
    pub leader_id: NodeId,
}

/// Membership notification: a new node joined under `peer_id`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NewPeerInfo {
    pub peer_id: NodeId,
}

/// Result of a write attempt against this node.
#[derive(Debug)]
pub enum WriteOutcome {
    /// Only the leader accepts writes; the caller is told `false`.
    NotLeader,
    /// Durably committed; fan the write out to these alive peers.
    Committed { replicate_to: Vec<NodeId> },
}

// -- Metrics document --------------------------------------------------------

/// The JSON document served at `/metrics`.
#[derive(Debug, Serialize)]
pub struct MetricsDoc {
    pub node: NodeMetrics,
    pub peers: PeerMetrics,
    pub writes: CounterMetrics,
    pub reads: CounterMetrics,
    pub leadership: LeadershipMetrics,
    pub storage: StorageMetrics,
}

#[derive(Debug, Serialize)]
pub struct NodeMetrics {
    pub id: NodeId,
    pub role: Role,
    pub uptime_seconds: u64,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct PeerMetrics {
    pub total: usize,
    pub alive: usize,
    pub ids: Vec<NodeId>,
}

#[derive(Debug, Serialize)]
pub struct CounterMetrics {
    pub total: u64,
}

#[derive(Debug, Serialize)]
pub struct LeadershipMetrics {
    pub leader_id: NodeId,
    pub time_as_leader_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct StorageMetrics {
    pub keys_count: usize,
    pub wal_size_bytes: u64,
}

// -- Node --------------------------------------------------------------------

/// Mutable node state, guarded by the [`Node`] mutex.
struct NodeState {
    role: Role,
    leader_id: NodeId,
    peers: Vec<NodeId>,
    alive: HashSet<NodeId>,
    map: HashMap<String, String>,
    became_leader_at: Option<Instant>,
}

/// One cluster member: identity, state, storage and the shared HTTP
/// client used for all peer traffic.
pub struct Node {
    pub config: Config,
    /// This node's identifier (its listening port).
    pub id: NodeId,
    client: reqwest::Client,
    store: DurableStore,
    state: Mutex<NodeState>,
    writes: AtomicU64,
    reads: AtomicU64,
    started_at: Instant,
    role_tx: watch::Sender<Role>,
    electing: AtomicBool,
}

impl Node {
    /// Build a node from validated configuration, recovering the map
    /// from the durable store.
    ///
    /// A follower initially points at its lowest-numbered peer as the
    /// leader; the first leader-check corrects the guess via election
    /// if it is wrong.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let id = config.node.port;
        let role = config.node.role;

        let store = DurableStore::new(&config.storage.data_dir)?;
        let map = store.load()?;

        let leader_id = match role {
            Role::Leader => id,
            Role::Follower => config.cluster.peers.iter().copied().min().unwrap_or(id),
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.cluster.probe_timeout_secs))
            .build()?;

        let (role_tx, _) = watch::channel(role);

        tracing::info!(
            id,
            %role,
            leader_id,
            peers = ?config.cluster.peers,
            keys = map.len(),
            "node initialized"
        );

        Ok(Self {
            state: Mutex::new(NodeState {
                role,
                leader_id,
                peers: config.cluster.peers.clone(),
                alive: HashSet::new(),
                map,
                became_leader_at: (role == Role::Leader).then(Instant::now),
            }),
            id,
            client,
            store,
            writes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            started_at: Instant::now(),
            role_tx,
            electing: AtomicBool::new(false),
            config,
        })
    }

    /// Shared HTTP client for all peer traffic (short request timeout).
    pub fn http_client(&self) -> &reqwest::Client {
        &self.client
    }

    /// URL of `path` on `peer`.  Peers are addressed on this node's own
    /// host: the cluster is a set of co-located processes told apart by
    /// port.
    pub fn peer_url(&self, peer: NodeId, path: &str) -> String {
        format!("http://{}:{}{}", self.config.node.host, peer, path)
    }

    /// Watch the node's role; the supervisor restarts liveness loops on
    /// every change.
    pub fn subscribe_role(&self) -> watch::Receiver<Role> {
        self.role_tx.subscribe()
    }

    pub async fn role(&self) -> Role {
        self.state.lock().await.role
    }

    pub async fn is_leader(&self) -> bool {
        self.state.lock().await.role == Role::Leader
    }

    pub async fn leader_id(&self) -> NodeId {
        self.state.lock().await.leader_id
    }

    /// All configured peers, in membership order.
    pub async fn peers(&self) -> Vec<NodeId> {
        self.state.lock().await.peers.clone()
    }

    /// Commit a write on the leader.
    ///
    /// Holds the state lock across the WAL append so concurrent writes
    /// serialize and file order matches commit order.  Returns the
    /// alive peers to replicate to, snapshotted at commit time; callers
    /// fan out after releasing the lock.
    pub async fn apply_write(&self, req: &WriteRequest) -> Result<WriteOutcome, NodeError> {
        let mut state = self.state.lock().await;
        if state.role != Role::Leader {
            tracing::info!(id = self.id, key = %req.key, "rejecting write, not leader");
            return Ok(WriteOutcome::NotLeader);
        }

        let entry = WalEntry::write_now(req.key.clone(), req.value.clone());
        self.store.append(&entry)?;
        entry.apply(&mut state.map);
        self.writes.fetch_add(1, Ordering::Relaxed);

        let replicate_to: Vec<NodeId> = state.alive.iter().copied().collect();
        tracing::info!(id = self.id, key = %req.key, targets = replicate_to.len(), "write committed");
        Ok(WriteOutcome::Committed { replicate_to })
    }

    /// Apply a write replicated from the leader.
    ///
    /// Unconditional and memory-only: replicated writes do not touch
    /// this node's WAL and become durable at its next compaction.
    pub async fn apply_replicated(&self, req: &WriteRequest) {
        let mut state = self.state.lock().await;
        state.map.insert(req.key.clone(), req.value.clone());
        tracing::debug!(id = self.id, key = %req.key, "applied replicated write");
    }

    /// Look up a key.  Counts every read request, hit or miss.
    pub async fn read(&self, key: &str) -> Result<String, NodeError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let state = self.state.lock().await;
        state
            .map
            .get(key)
            .cloned()
            .ok_or_else(|| NodeError::KeyNotFound {
                key: key.to_string(),
            })
    }

    /// Full copy of the in-memory map, for diagnostics.
    pub async fn dump(&self) -> HashMap<String, String> {
        self.state.lock().await.map.clone()
    }

    /// Adopt a leadership notification (from an election or a peer).
    ///
    /// Updates role and leader pointer, stamps the leadership start
    /// time on promotion, and signals the role supervisor so exactly
    /// one liveness loop runs for the new role.
    pub async fn set_leadership(&self, info: LeaderInfo) {
        let mut state = self.state.lock().await;
        let role = if info.is_leader {
            Role::Leader
        } else {
            Role::Follower
        };
        state.role = role;
        state.leader_id = info.leader_id;
        if info.is_leader {
            state.became_leader_at = Some(Instant::now());
        }
        tracing::info!(id = self.id, %role, leader_id = info.leader_id, "leadership updated");

        self.role_tx.send_if_modified(|current| {
            if *current != role {
                *current = role;
                true
            } else {
                false
            }
        });
    }

    /// Register a peer announced at runtime.  Returns `false` when the
    /// peer was already known (or is this node itself).
    pub async fn add_peer(&self, peer: NodeId) -> bool {
        if peer == self.id {
            return false;
        }
        let mut state = self.state.lock().await;
        if state.peers.contains(&peer) {
            return false;
        }
        state.peers.push(peer);
        tracing::info!(id = self.id, peer, "registered new peer");
        true
    }

    /// Record a successful probe of `peer`.
    pub async fn mark_alive(&self, peer: NodeId) {
        self.state.lock().await.alive.insert(peer);
    }

    /// Record a failed probe of `peer`.
    pub async fn mark_dead(&self, peer: NodeId) {
        self.state.lock().await.alive.remove(&peer);
    }

    /// Claim the right to run an election.  Returns `false` when one is
    /// already in progress, in which case the caller must skip.
    pub(crate) fn try_begin_election(&self) -> bool {
        self.electing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn finish_election(&self) {
        self.electing.store(false, Ordering::Release);
    }

    /// Assemble the `/metrics` JSON document.
    pub async fn metrics(&self) -> MetricsDoc {
        let state = self.state.lock().await;
        MetricsDoc {
            node: NodeMetrics {
                id: self.id,
                role: state.role,
                uptime_seconds: self.started_at.elapsed().as_secs(),
                status: "healthy",
            },
            peers: PeerMetrics {
                total: state.peers.len(),
                alive: state.alive.len(),
                ids: state.peers.clone(),
            },
            writes: CounterMetrics {
                total: self.writes.load(Ordering::Relaxed),
            },
            reads: CounterMetrics {
                total: self.reads.load(Ordering::Relaxed),
            },
            leadership: LeadershipMetrics {
                leader_id: state.leader_id,
                time_as_leader_seconds: state
                    .became_leader_at
                    .map(|t| t.elapsed().as_secs())
                    .unwrap_or(0),
            },
            storage: StorageMetrics {
                keys_count: state.map.len(),
                wal_size_bytes: self.store.wal_size_bytes(),
            },
        }
    }

    /// Fold the WAL into the snapshot.
    ///
    /// Holds the state lock for the whole serialize-then-delete window,
    /// so no write can commit between the snapshot capture and the WAL
    /// deletion.  Writes queue behind the compaction for its duration.
    pub async fn compact(&self) -> Result<(), NodeError> {
        let state = self.state.lock().await;
        self.store.compact(&state.map)
    }
}

/// Periodic WAL compaction, for the life of the process.
pub async fn run_compaction_loop(node: Arc<Node>) {
    let interval = Duration::from_secs(node.config.storage.compaction_interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = node.compact().await {
            tracing::error!(id = node.id, error = %e, "compaction failed");
        }
    }
}
