//! Adapters - Concrete implementations of ports plus the inbound HTTP API.

pub mod ffprobe;
pub mod http;
pub mod sqlite;
