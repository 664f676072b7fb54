//! HTTP request handlers for the node surface.

pub mod cluster;
pub mod kv;
