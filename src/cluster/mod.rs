//! Cluster coordination: replication fan-out, peer liveness and
//! leader election.
//!
//! All peer traffic is plain HTTP against the node surface, best-effort
//! with a short timeout.  A broken peer costs a probe failure, never a
//! stuck node.

pub mod election;
pub mod liveness;
pub mod replication;
