//! SQLite adapter for the job repository port.
//!
//! One connection behind an async mutex; every mutating operation runs in
//! an immediate transaction so claimers never observe a half-inserted
//! request.

mod repository;

use crate::ports::repository::RepositoryError;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS requests (
    correlation_id TEXT PRIMARY KEY,
    video_source   TEXT,
    audio_source   TEXT,
    destination    TEXT NOT NULL,
    needed         INTEGER NOT NULL,
    created        INTEGER NOT NULL,
    enable_dash    INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS jobs (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    correlation_id TEXT NOT NULL,
    arguments      TEXT NOT NULL,
    needed         INTEGER NOT NULL,
    kind           TEXT NOT NULL,
    source         TEXT NOT NULL,
    chunk_duration INTEGER NOT NULL,
    active         INTEGER NOT NULL DEFAULT 1,
    taken          INTEGER NOT NULL DEFAULT 0,
    done           INTEGER NOT NULL DEFAULT 0,
    failure        TEXT,
    heartbeat      INTEGER
);
CREATE INDEX IF NOT EXISTS idx_jobs_dispatch ON jobs (active, done, needed, id);
CREATE TABLE IF NOT EXISTS parts (
    correlation_id TEXT NOT NULL,
    target_index   INTEGER NOT NULL,
    number         INTEGER NOT NULL,
    filename       TEXT NOT NULL,
    PRIMARY KEY (correlation_id, target_index, number)
);
CREATE TABLE IF NOT EXISTS worker_heartbeats (
    machine   TEXT PRIMARY KEY,
    last_seen INTEGER NOT NULL
);
";

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}

/// SQLite-backed implementation of `JobRepository`.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRepository {
    /// Open (or create) the job store at the given path.
    pub fn open(path: &Path) -> Result<Self, RepositoryError> {
        Self::initialise(Connection::open(path)?)
    }

    /// An isolated store that lives for the lifetime of the connection.
    pub fn open_in_memory() -> Result<Self, RepositoryError> {
        Self::initialise(Connection::open_in_memory()?)
    }

    fn initialise(conn: Connection) -> Result<Self, RepositoryError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}
