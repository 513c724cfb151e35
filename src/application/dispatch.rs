//! Lease-based job dispatch for polling workers.
//!
//! State machine per job, derived from the persisted flags: Queued →
//! Leased (claim), Leased → Leased (heartbeat), Leased → Done / failed
//! (terminal), Leased → Expired (heartbeat older than the lease timeout),
//! Expired → Leased (ordinary reclaim via claim-next), untaken states →
//! Paused. Resume is not exposed.

use crate::domain::jobs::{RequestProgress, TranscodingJob};
use crate::ports::repository::{JobRepository, RepositoryError};
use chrono::{Duration, Utc};
use std::fmt;
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub enum DispatchError {
    BadRequest(String),
    Repository(RepositoryError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::BadRequest(e) => write!(f, "bad request: {}", e),
            DispatchError::Repository(e) => write!(f, "repository error: {}", e),
        }
    }
}

impl std::error::Error for DispatchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DispatchError::BadRequest(_) => None,
            DispatchError::Repository(e) => Some(e),
        }
    }
}

impl From<RepositoryError> for DispatchError {
    fn from(err: RepositoryError) -> Self {
        DispatchError::Repository(err)
    }
}

/// Hands out at most one runnable job per poll.
pub struct Dispatcher<R> {
    repo: R,
    lease_timeout: Duration,
}

impl<R> Dispatcher<R>
where
    R: JobRepository,
{
    pub fn new(repo: R, lease_timeout_seconds: u64) -> Self {
        Self {
            repo,
            lease_timeout: Duration::seconds(lease_timeout_seconds as i64),
        }
    }

    /// Record the worker's liveness and lease the next dispatchable job to
    /// it. A claim lost to a concurrent poller is indistinguishable from an
    /// empty queue: the worker simply polls again later.
    pub async fn next_job(&self, machine: &str) -> Result<Option<TranscodingJob>, DispatchError> {
        if machine.trim().is_empty() {
            return Err(DispatchError::BadRequest(
                "machine name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        self.repo.record_worker_heartbeat(machine, now).await?;

        match self.repo.claim_next(now, self.lease_timeout).await {
            Ok(Some(job)) => {
                info!(job_id = job.id, machine, "leased job");
                Ok(Some(job))
            }
            Ok(None) => Ok(None),
            Err(RepositoryError::ClaimLost) => Ok(None),
            Err(err) => Err(DispatchError::Repository(err)),
        }
    }

    pub async fn heartbeat(&self, job_id: i64) -> Result<(), DispatchError> {
        self.repo.heartbeat(job_id, Utc::now()).await?;
        Ok(())
    }

    pub async fn complete(&self, job_id: i64) -> Result<(), DispatchError> {
        self.repo.mark_done(job_id).await?;
        info!(job_id, "job done");
        Ok(())
    }

    pub async fn fail(&self, job_id: i64, reason: &str) -> Result<(), DispatchError> {
        self.repo.mark_failed(job_id, reason).await?;
        info!(job_id, reason, "job failed");
        Ok(())
    }

    /// Pause every not-yet-taken, unfinished job of a request. Returns the
    /// number of jobs paused.
    pub async fn pause(&self, correlation_id: Uuid) -> Result<u64, DispatchError> {
        let paused = self.repo.pause(correlation_id).await?;
        info!(%correlation_id, paused, "paused request");
        Ok(paused)
    }

    /// Per-state job counts for one request, as the lease state machine
    /// sees the persisted flags right now. `None` for an unknown
    /// correlation id.
    pub async fn progress(
        &self,
        correlation_id: Uuid,
    ) -> Result<Option<RequestProgress>, DispatchError> {
        let leases = self.repo.job_leases(correlation_id).await?;
        if leases.is_empty() {
            return Ok(None);
        }
        Ok(Some(RequestProgress::tally(
            &leases,
            Utc::now(),
            self.lease_timeout,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::repository::MockJobRepository;
    use mockall::predicate::eq;

    #[tokio::test]
    async fn a_blank_machine_name_is_rejected_without_touching_the_store() {
        let dispatcher = Dispatcher::new(MockJobRepository::new(), 120);

        let result = dispatcher.next_job("  ").await;

        assert!(matches!(result, Err(DispatchError::BadRequest(_))));
    }

    #[tokio::test]
    async fn polling_records_liveness_and_passes_the_configured_lease() {
        let mut repo = MockJobRepository::new();
        repo.expect_record_worker_heartbeat()
            .withf(|machine, _| machine == "encoder-01")
            .once()
            .returning(|_, _| Ok(()));
        repo.expect_claim_next()
            .withf(|_, lease_timeout| *lease_timeout == Duration::seconds(90))
            .once()
            .returning(|_, _| Ok(None));

        let dispatcher = Dispatcher::new(repo, 90);
        let job = dispatcher.next_job("encoder-01").await.unwrap();

        assert!(job.is_none());
    }

    #[tokio::test]
    async fn a_lost_claim_reads_as_an_empty_queue() {
        let mut repo = MockJobRepository::new();
        repo.expect_record_worker_heartbeat().returning(|_, _| Ok(()));
        repo.expect_claim_next()
            .returning(|_, _| Err(RepositoryError::ClaimLost));

        let dispatcher = Dispatcher::new(repo, 120);
        let job = dispatcher.next_job("encoder-02").await.unwrap();

        assert!(job.is_none());
    }

    #[tokio::test]
    async fn storage_failures_are_not_swallowed() {
        let mut repo = MockJobRepository::new();
        repo.expect_record_worker_heartbeat().returning(|_, _| Ok(()));
        repo.expect_claim_next()
            .returning(|_, _| Err(RepositoryError::Storage("io".to_string())));

        let dispatcher = Dispatcher::new(repo, 120);

        assert!(matches!(
            dispatcher.next_job("encoder-03").await,
            Err(DispatchError::Repository(_))
        ));
    }

    #[tokio::test]
    async fn progress_tallies_leases_through_the_state_machine() {
        use crate::domain::jobs::LeaseState;

        let correlation_id = Uuid::new_v4();
        let mut repo = MockJobRepository::new();
        repo.expect_job_leases()
            .with(eq(correlation_id))
            .returning(|_| {
                Ok(vec![
                    // queued
                    LeaseState {
                        active: true,
                        taken: false,
                        done: false,
                        heartbeat: None,
                    },
                    // leased right now
                    LeaseState {
                        active: true,
                        taken: true,
                        done: false,
                        heartbeat: Some(Utc::now()),
                    },
                    // lease long expired
                    LeaseState {
                        active: true,
                        taken: true,
                        done: false,
                        heartbeat: Some(Utc::now() - Duration::seconds(600)),
                    },
                    // done
                    LeaseState {
                        active: true,
                        taken: true,
                        done: true,
                        heartbeat: Some(Utc::now()),
                    },
                ])
            });

        let dispatcher = Dispatcher::new(repo, 120);
        let progress = dispatcher.progress(correlation_id).await.unwrap().unwrap();

        assert_eq!(progress.total, 4);
        assert_eq!(progress.queued, 1);
        assert_eq!(progress.leased, 1);
        assert_eq!(progress.expired, 1);
        assert_eq!(progress.done, 1);
        assert_eq!(progress.paused, 0);
    }

    #[tokio::test]
    async fn progress_of_an_unknown_request_is_none() {
        let mut repo = MockJobRepository::new();
        repo.expect_job_leases().returning(|_| Ok(vec![]));

        let dispatcher = Dispatcher::new(repo, 120);

        assert!(dispatcher.progress(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn pause_reports_the_affected_count() {
        let correlation_id = Uuid::new_v4();
        let mut repo = MockJobRepository::new();
        repo.expect_pause()
            .with(eq(correlation_id))
            .once()
            .returning(|_| Ok(3));

        let dispatcher = Dispatcher::new(repo, 120);

        assert_eq!(dispatcher.pause(correlation_id).await.unwrap(), 3);
    }
}
