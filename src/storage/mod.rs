//! Durable storage for the node's key-value map.
//!
//! A node persists its map as a full JSON snapshot plus an append-only
//! write-ahead log of the writes since the last snapshot.  Startup
//! recovery loads the snapshot and replays the WAL on top of it;
//! compaction folds the WAL back into the snapshot.

pub mod durable;

pub use durable::{DurableStore, WalEntry};
