//! Configuration loaded from the environment.

use std::env;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    /// Path of the SQLite job store
    pub database_path: String,
    /// Lease timeout in seconds; jobs whose heartbeat is older than this
    /// are handed out again on the next poll
    pub timeout_seconds: u64,
    /// Use constant-rate-factor video encoding instead of constant bitrate
    /// (ignored for DASH requests)
    pub enable_crf: bool,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| String::from("./baton.db")),
            timeout_seconds: env::var("TIMEOUT_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(120),
            enable_crf: env::var("ENABLE_CRF")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
        }
    }
}
