//! Snapshot + write-ahead log persistence.
//!
//! On-disk layout under the data directory:
//!
//! ```text
//! snapshot.json   full JSON map as of the last compaction
//! wal.log         one JSON object per line, appended per write
//! .tmp/           staging area for atomic snapshot writes
//! ```
//!
//! Recovery invariant: the in-memory map always equals the snapshot with
//! the WAL entries applied on top in file order, last write per key wins.
//! Replay is idempotent, so a crash between fsync and response at worst
//! re-applies entries that were already in the map.
//!
//! Snapshot writes follow crash-only design: write to temp file, fsync,
//! rename.  The WAL is deleted only after the renamed snapshot already
//! contains everything the WAL recorded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::errors::NodeError;

/// One record in the write-ahead log.
///
/// Serialized as a single JSON line,
/// `{"type":"write","key":"k","value":"v","timestamp":1700000000}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalEntry {
    Write {
        key: String,
        value: String,
        /// Epoch seconds at append time.
        timestamp: u64,
    },
}

impl WalEntry {
    /// Build a write entry stamped with the current wall-clock time.
    pub fn write_now(key: String, value: String) -> Self {
        WalEntry::Write {
            key,
            value,
            timestamp: epoch_secs(),
        }
    }

    /// Apply this entry to a map.
    pub fn apply(&self, map: &mut HashMap<String, String>) {
        match self {
            WalEntry::Write { key, value, .. } => {
                map.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Current wall-clock time as epoch seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Snapshot + WAL files for one node.
pub struct DurableStore {
    /// Directory holding the snapshot, WAL and temp staging area.
    data_dir: PathBuf,
}

impl DurableStore {
    /// Open a durable store rooted at `data_dir`.
    ///
    /// The directory (and its `.tmp/` staging area) is created if it
    /// does not exist.
    pub fn new(data_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        std::fs::create_dir_all(data_dir.join(".tmp"))?;
        Ok(Self { data_dir })
    }

    fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("snapshot.json")
    }

    fn wal_path(&self) -> PathBuf {
        self.data_dir.join("wal.log")
    }

    /// Generate a temp file path under .tmp/ for atomic snapshot writes.
    fn temp_path(&self) -> PathBuf {
        let id = uuid::Uuid::new_v4();
        self.data_dir.join(".tmp").join(format!("snapshot-{}", id))
    }

    /// Recover the map: load the snapshot, then replay the WAL on top.
    ///
    /// A missing snapshot or WAL is a fresh start, not an error.  A
    /// malformed snapshot or WAL line IS an error: the caller must
    /// refuse to serve rather than come up with partial data.
    pub fn load(&self) -> Result<HashMap<String, String>, NodeError> {
        let mut map: HashMap<String, String> = match std::fs::read_to_string(self.snapshot_path())
        {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no snapshot found, starting with an empty map");
                HashMap::new()
            }
            Err(e) => return Err(e.into()),
        };
        let snapshot_keys = map.len();

        let wal = match std::fs::read_to_string(self.wal_path()) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(snapshot_keys, "recovery complete, no WAL to replay");
                return Ok(map);
            }
            Err(e) => return Err(e.into()),
        };

        let mut replayed = 0usize;
        for (idx, line) in wal.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: WalEntry = serde_json::from_str(line).map_err(|source| {
                NodeError::WalCorrupt {
                    line: idx + 1,
                    source,
                }
            })?;
            entry.apply(&mut map);
            replayed += 1;
        }

        tracing::info!(
            snapshot_keys,
            replayed,
            total_keys = map.len(),
            "recovery complete"
        );
        Ok(map)
    }

    /// Append one entry to the WAL, durably.
    ///
    /// The entry is on disk (written, flushed, fsynced) before this
    /// returns.  Callers serialize appends through the node state lock,
    /// which makes file order equal append order.
    pub fn append(&self, entry: &WalEntry) -> Result<(), NodeError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.wal_path())?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Fold the current map into the snapshot and drop the WAL.
    ///
    /// The snapshot lands via temp-fsync-rename, so a crash at any point
    /// leaves either the old snapshot + WAL or the new snapshot (the WAL
    /// then re-applies entries the new snapshot already holds, which is
    /// harmless by replay idempotence).  Callers must hold the node
    /// state lock so no write slips in between the serialization and the
    /// WAL deletion.
    pub fn compact(&self, map: &HashMap<String, String>) -> Result<(), NodeError> {
        let contents = serde_json::to_vec(map)?;

        let tmp_path = self.temp_path();
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(&contents)?;
        file.sync_all()?;
        std::fs::rename(&tmp_path, self.snapshot_path())?;

        // Everything in the WAL is now in the snapshot.
        match std::fs::remove_file(self.wal_path()) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        tracing::debug!(keys = map.len(), "compacted WAL into snapshot");
        Ok(())
    }

    /// Current WAL size in bytes, 0 when the file does not exist.
    pub fn wal_size_bytes(&self) -> u64 {
        std::fs::metadata(self.wal_path())
            .map(|m| m.len())
            .unwrap_or(0)
    }
}

// ── Tests ───────────────────────────────────────────────────────────
