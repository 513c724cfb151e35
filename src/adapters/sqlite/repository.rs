use super::SqliteRepository;
use crate::domain::jobs::{
    LeaseState, Part, PlannedJob, Request, TranscodingJob, WorkerHeartbeat,
};
use crate::ports::repository::{JobRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

fn parse_correlation(raw: &str) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(raw)
        .map_err(|e| RepositoryError::Storage(format!("bad correlation id {:?}: {}", raw, e)))
}

#[async_trait]
impl JobRepository for SqliteRepository {
    async fn add_request(
        &self,
        request: &Request,
        jobs: &[PlannedJob],
        parts: &[Part],
    ) -> Result<(), RepositoryError> {
        let correlation = request.correlation_id.to_string();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO requests (correlation_id, video_source, audio_source, destination, needed, created, enable_dash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                correlation,
                request.video_source.as_ref().map(|p| p.display().to_string()),
                request.audio_source.as_ref().map(|p| p.display().to_string()),
                request.destination.display().to_string(),
                request.needed.timestamp(),
                request.created.timestamp(),
                request.enable_dash as i64,
            ],
        )?;

        for job in jobs {
            tx.execute(
                "INSERT INTO jobs (correlation_id, arguments, needed, kind, source, chunk_duration)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    correlation,
                    job.arguments,
                    request.needed.timestamp(),
                    job.kind.to_string(),
                    job.source.display().to_string(),
                    job.chunk_duration as i64,
                ],
            )?;
        }

        for part in parts {
            tx.execute(
                "INSERT INTO parts (correlation_id, target_index, number, filename)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    part.correlation_id.to_string(),
                    part.target_index,
                    part.number,
                    part.filename,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    async fn claim_next(
        &self,
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> Result<Option<TranscodingJob>, RepositoryError> {
        let cutoff = (now - lease_timeout).timestamp();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate: Option<(i64, i64, Option<i64>)> = tx
            .query_row(
                "SELECT id, taken, heartbeat FROM jobs
                 WHERE active = 1 AND done = 0 AND (taken = 0 OR heartbeat < ?1)
                 ORDER BY needed ASC, id ASC
                 LIMIT 1",
                params![cutoff],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let Some((id, taken, heartbeat)) = candidate else {
            return Ok(None);
        };

        // The lease state read above is re-checked in the WHERE clause, so
        // two claimers racing on the same row cannot both succeed.
        let changed = tx.execute(
            "UPDATE jobs SET taken = 1, heartbeat = ?1
             WHERE id = ?2 AND taken = ?3 AND heartbeat IS ?4",
            params![now.timestamp(), id, taken, heartbeat],
        )?;
        if changed != 1 {
            return Err(RepositoryError::ClaimLost);
        }

        let (id, arguments, correlation): (i64, String, String) = tx.query_row(
            "SELECT id, arguments, correlation_id FROM jobs WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        tx.commit()?;

        Ok(Some(TranscodingJob {
            id,
            arguments,
            job_correlation_id: parse_correlation(&correlation)?,
        }))
    }

    async fn heartbeat(&self, job_id: i64, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE jobs SET heartbeat = ?1 WHERE id = ?2 AND taken = 1 AND done = 0",
            params![now.timestamp(), job_id],
        )?;
        Ok(())
    }

    async fn mark_done(&self, job_id: i64) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "UPDATE jobs SET done = 1 WHERE id = ?1 AND taken = 1 AND done = 0",
            params![job_id],
        )?;
        Ok(())
    }

    async fn mark_failed(&self, job_id: i64, reason: &str) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        // Done is terminal: a report from a worker whose lease was already
        // reclaimed and finished by someone else must not touch the row.
        conn.execute(
            "UPDATE jobs SET done = 1, failure = ?2 WHERE id = ?1 AND taken = 1 AND done = 0",
            params![job_id, reason],
        )?;
        Ok(())
    }

    async fn pause(&self, correlation_id: Uuid) -> Result<u64, RepositoryError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE jobs SET active = 0
             WHERE correlation_id = ?1 AND done = 0 AND taken = 0",
            params![correlation_id.to_string()],
        )?;
        Ok(changed as u64)
    }

    async fn record_worker_heartbeat(
        &self,
        machine: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO worker_heartbeats (machine, last_seen) VALUES (?1, ?2)
             ON CONFLICT (machine) DO UPDATE SET last_seen = excluded.last_seen",
            params![machine, now.timestamp()],
        )?;
        Ok(())
    }

    async fn job_leases(
        &self,
        correlation_id: Uuid,
    ) -> Result<Vec<LeaseState>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT active, taken, done, heartbeat FROM jobs
             WHERE correlation_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![correlation_id.to_string()], |row| {
            Ok((
                row.get::<_, bool>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, bool>(2)?,
                row.get::<_, Option<i64>>(3)?,
            ))
        })?;

        let mut leases = Vec::new();
        for row in rows {
            let (active, taken, done, heartbeat) = row?;
            leases.push(LeaseState {
                active,
                taken,
                done,
                heartbeat: heartbeat.and_then(|ts| DateTime::from_timestamp(ts, 0)),
            });
        }
        Ok(leases)
    }

    async fn list_workers(&self) -> Result<Vec<WorkerHeartbeat>, RepositoryError> {
        let conn = self.conn.lock().await;
        let mut stmt =
            conn.prepare("SELECT machine, last_seen FROM worker_heartbeats ORDER BY machine")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut workers = Vec::new();
        for row in rows {
            let (machine, last_seen) = row?;
            workers.push(WorkerHeartbeat {
                machine,
                last_seen: DateTime::from_timestamp(last_seen, 0).unwrap_or_default(),
            });
        }
        Ok(workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::jobs::JobKind;
    use chrono::TimeZone;
    use std::path::PathBuf;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    const LEASE: i64 = 120;

    fn lease() -> Duration {
        Duration::seconds(LEASE)
    }

    fn request(needed: DateTime<Utc>) -> Request {
        Request {
            correlation_id: Uuid::new_v4(),
            video_source: Some(PathBuf::from("/in/movie.mov")),
            audio_source: None,
            destination: PathBuf::from("/out/movie.mp4"),
            needed,
            created: at(0),
            enable_dash: false,
        }
    }

    fn job(arguments: &str) -> PlannedJob {
        PlannedJob {
            kind: JobKind::Video,
            arguments: arguments.to_string(),
            source: PathBuf::from("/in/movie.mov"),
            chunk_duration: 60,
        }
    }

    fn part(correlation_id: Uuid, target_index: u32, number: u32) -> Part {
        Part {
            correlation_id,
            target_index,
            number,
            filename: format!("/out/movie_{}_{}.mp4", target_index, number),
        }
    }

    #[tokio::test]
    async fn add_request_persists_jobs_and_parts_atomically() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        let jobs = vec![job("-y a"), job("-y b")];
        let parts = vec![part(req.correlation_id, 0, 0), part(req.correlation_id, 0, 1)];

        repo.add_request(&req, &jobs, &parts).await.unwrap();

        let leases = repo.job_leases(req.correlation_id).await.unwrap();
        assert_eq!(leases.len(), 2);
        assert!(leases
            .iter()
            .all(|l| l.active && !l.taken && !l.done && l.heartbeat.is_none()));
    }

    #[tokio::test]
    async fn a_failed_insert_commits_nothing() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        // Duplicate part identity violates the primary key after the jobs
        // have already been inserted.
        let parts = vec![part(req.correlation_id, 0, 0), part(req.correlation_id, 0, 0)];

        let result = repo.add_request(&req, &[job("-y a")], &parts).await;

        assert!(result.is_err());
        assert!(repo.job_leases(req.correlation_id).await.unwrap().is_empty());
        assert!(repo.claim_next(at(0), lease()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_orders_by_deadline_then_id() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let late = request(at(7200));
        let early = request(at(3600));
        repo.add_request(&late, &[job("-y late")], &[]).await.unwrap();
        repo.add_request(&early, &[job("-y early-1"), job("-y early-2")], &[])
            .await
            .unwrap();

        let first = repo.claim_next(at(0), lease()).await.unwrap().unwrap();
        let second = repo.claim_next(at(0), lease()).await.unwrap().unwrap();
        let third = repo.claim_next(at(0), lease()).await.unwrap().unwrap();

        assert_eq!(first.arguments, "-y early-1");
        assert_eq!(first.job_correlation_id, early.correlation_id);
        assert_eq!(second.arguments, "-y early-2");
        assert_eq!(third.arguments, "-y late");
    }

    #[tokio::test]
    async fn a_claimed_job_is_not_handed_out_twice() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y only")], &[]).await.unwrap();

        assert!(repo.claim_next(at(0), lease()).await.unwrap().is_some());
        assert!(repo.claim_next(at(1), lease()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn a_stale_lease_is_reclaimed_only_after_the_timeout() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y stale")], &[]).await.unwrap();

        let claimed = repo.claim_next(at(0), lease()).await.unwrap().unwrap();

        // Not dispatchable at heartbeat + T_lease exactly.
        assert!(repo.claim_next(at(LEASE), lease()).await.unwrap().is_none());
        // Dispatchable one second later, as the same job id.
        let reclaimed = repo.claim_next(at(LEASE + 1), lease()).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, claimed.id);
        // The new lease fences out further claimers again.
        assert!(repo.claim_next(at(LEASE + 2), lease()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn heartbeat_extends_the_lease() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y beating")], &[]).await.unwrap();

        let claimed = repo.claim_next(at(0), lease()).await.unwrap().unwrap();
        repo.heartbeat(claimed.id, at(60)).await.unwrap();

        assert!(repo.claim_next(at(LEASE + 1), lease()).await.unwrap().is_none());
        assert!(repo
            .claim_next(at(60 + LEASE + 1), lease())
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn done_jobs_never_come_back() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y finish")], &[]).await.unwrap();

        let claimed = repo.claim_next(at(0), lease()).await.unwrap().unwrap();
        repo.mark_done(claimed.id).await.unwrap();

        assert!(repo.claim_next(at(LEASE + 1), lease()).await.unwrap().is_none());
        let leases = repo.job_leases(req.correlation_id).await.unwrap();
        assert!(leases[0].done && leases[0].taken);
    }

    #[tokio::test]
    async fn failed_jobs_are_terminal_too() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y broken")], &[]).await.unwrap();

        let claimed = repo.claim_next(at(0), lease()).await.unwrap().unwrap();
        repo.mark_failed(claimed.id, "encoder exited with 1").await.unwrap();

        assert!(repo.claim_next(at(LEASE + 1), lease()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn a_stale_report_cannot_touch_a_finished_job() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y contested")], &[]).await.unwrap();

        // Worker A claims and goes silent; worker B reclaims and finishes.
        let first = repo.claim_next(at(0), lease()).await.unwrap().unwrap();
        let reclaimed = repo.claim_next(at(LEASE + 1), lease()).await.unwrap().unwrap();
        assert_eq!(reclaimed.id, first.id);
        repo.mark_done(reclaimed.id).await.unwrap();

        // A's late failure report lands on a terminal job and changes nothing.
        repo.mark_failed(first.id, "stale worker report").await.unwrap();

        let leases = repo.job_leases(req.correlation_id).await.unwrap();
        assert!(leases[0].done);
        assert!(repo.claim_next(at(LEASE * 2 + 2), lease()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_done_on_an_unclaimed_job_is_a_no_op() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y untouched")], &[]).await.unwrap();

        repo.mark_done(1).await.unwrap();

        let leases = repo.job_leases(req.correlation_id).await.unwrap();
        assert!(!leases[0].done);
    }

    #[tokio::test]
    async fn pause_skips_taken_jobs_and_reports_the_count() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let req = request(at(3600));
        repo.add_request(&req, &[job("-y taken"), job("-y queued")], &[])
            .await
            .unwrap();

        repo.claim_next(at(0), lease()).await.unwrap().unwrap();
        let paused = repo.pause(req.correlation_id).await.unwrap();

        assert_eq!(paused, 1);
        // The untaken job is now inactive; the taken one keeps its lease and
        // nothing else is dispatchable.
        assert!(repo.claim_next(at(1), lease()).await.unwrap().is_none());
        // Even an expired lease stays with its (still active) job only.
        let reclaimed = repo.claim_next(at(LEASE + 1), lease()).await.unwrap().unwrap();
        assert_eq!(reclaimed.arguments, "-y taken");
    }

    #[tokio::test]
    async fn pause_of_an_unknown_request_touches_nothing() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        assert_eq!(repo.pause(Uuid::new_v4()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn worker_heartbeats_upsert_by_machine_name() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.record_worker_heartbeat("encoder-01", at(0)).await.unwrap();
        repo.record_worker_heartbeat("encoder-02", at(1)).await.unwrap();
        repo.record_worker_heartbeat("encoder-01", at(30)).await.unwrap();

        let workers = repo.list_workers().await.unwrap();
        assert_eq!(workers.len(), 2);
        assert_eq!(workers[0].machine, "encoder-01");
        assert_eq!(workers[0].last_seen, at(30));
        assert_eq!(workers[1].machine, "encoder-02");
    }
}
