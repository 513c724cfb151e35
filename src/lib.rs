//! Baton - Transcoding farm coordination server
//!
//! Hexagonal Architecture:
//! - domain/: Pure planning logic (argument synthesis, request decomposition)
//! - ports/: Trait definitions (job repository, media probe)
//! - adapters/: Concrete implementations (SQLite store, ffprobe, HTTP API)
//! - application/: Services (request submission, job dispatch)
//! - config: Environment configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use config::Config;
