use crate::domain::jobs::{
    LeaseState, Part, PlannedJob, Request, TranscodingJob, WorkerHeartbeat,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::fmt;
use uuid::Uuid;

#[derive(Debug)]
pub enum RepositoryError {
    /// The conditional update of claim-next affected zero rows: another
    /// claimer won the race. Callers do not retry within the same call.
    ClaimLost,
    Storage(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::ClaimLost => write!(f, "job claim lost to a concurrent claimer"),
            RepositoryError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for RepositoryError {}

/// Durable persistence for requests, jobs, parts and worker liveness.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist a request together with its jobs and parts in one
    /// transaction; on any failure nothing is committed.
    async fn add_request(
        &self,
        request: &Request,
        jobs: &[PlannedJob],
        parts: &[Part],
    ) -> Result<(), RepositoryError>;

    /// Select and lease one dispatchable job: active, unfinished and either
    /// never taken or with a heartbeat older than the lease timeout, ordered
    /// by deadline then id. The lease is written with an atomic conditional
    /// update; a lost race surfaces as [`RepositoryError::ClaimLost`].
    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<Option<TranscodingJob>, RepositoryError>;

    /// Refresh the heartbeat of a claimed job.
    async fn heartbeat(&self, job_id: i64, now: DateTime<Utc>) -> Result<(), RepositoryError>;

    async fn mark_done(&self, job_id: i64) -> Result<(), RepositoryError>;

    async fn mark_failed(&self, job_id: i64, reason: &str) -> Result<(), RepositoryError>;

    /// Deactivate every job of a request that is neither done nor currently
    /// taken. Returns the number of jobs affected.
    async fn pause(&self, correlation_id: Uuid) -> Result<u64, RepositoryError>;

    /// Upsert a worker liveness row.
    async fn record_worker_heartbeat(
        &self,
        machine: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;

    /// Lease flags of every job belonging to one request, in id order.
    /// Empty for an unknown correlation id. Interpreting the flags is the
    /// dispatch state machine's business, not the store's.
    async fn job_leases(&self, correlation_id: Uuid)
        -> Result<Vec<LeaseState>, RepositoryError>;

    async fn list_workers(&self) -> Result<Vec<WorkerHeartbeat>, RepositoryError>;
}
