use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// What a single external-tool invocation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Audio,
    Video,
    Mux,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobKind::Audio => write!(f, "audio"),
            JobKind::Video => write!(f, "video"),
            JobKind::Mux => write!(f, "mux"),
        }
    }
}

/// A persisted user submission. Created once, never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub correlation_id: Uuid,
    pub video_source: Option<PathBuf>,
    pub audio_source: Option<PathBuf>,
    pub destination: PathBuf,
    pub needed: DateTime<Utc>,
    pub created: DateTime<Utc>,
    pub enable_dash: bool,
}

/// A unit job as produced by the planner, before the store assigns its id
/// and lease state. Correlation id and deadline come from the owning request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedJob {
    pub kind: JobKind,
    pub arguments: String,
    pub source: PathBuf,
    /// Seconds of source material this job covers; the full source duration
    /// for audio and mux jobs.
    pub chunk_duration: u64,
}

/// A planned output fragment on disk. Write-once metadata; the file itself
/// is materialised later by a worker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub correlation_id: Uuid,
    pub target_index: u32,
    pub number: u32,
    pub filename: String,
}

/// What a polling worker receives for one claimed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingJob {
    pub id: i64,
    pub arguments: String,
    pub job_correlation_id: Uuid,
}

/// Probed source metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MediaInfo {
    /// Whole seconds of material
    pub duration: u64,
    pub framerate: f64,
}

/// Per-state job counts for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RequestProgress {
    pub total: u64,
    pub done: u64,
    pub queued: u64,
    pub leased: u64,
    pub expired: u64,
    pub paused: u64,
}

impl RequestProgress {
    /// Tally persisted lease flags through the dispatch state machine.
    pub fn tally(
        leases: &[LeaseState],
        now: DateTime<Utc>,
        lease_timeout: Duration,
    ) -> RequestProgress {
        let mut progress = RequestProgress {
            total: leases.len() as u64,
            ..RequestProgress::default()
        };
        for lease in leases {
            match JobState::of(lease, now, lease_timeout) {
                JobState::Queued => progress.queued += 1,
                JobState::Leased => progress.leased += 1,
                JobState::Expired => progress.expired += 1,
                JobState::Done => progress.done += 1,
                JobState::Paused => progress.paused += 1,
            }
        }
        progress
    }
}

/// Worker liveness row, refreshed on every poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerHeartbeat {
    pub machine: String,
    pub last_seen: DateTime<Utc>,
}

/// Lease flags as persisted on a job row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaseState {
    pub active: bool,
    pub taken: bool,
    pub done: bool,
    pub heartbeat: Option<DateTime<Utc>>,
}

/// The dispatch state machine, derived from the lease flags.
///
/// An `Expired` job is selected again by claim-next exactly like a `Queued`
/// one; there is no distinct reclaim path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Leased,
    Expired,
    Done,
    Paused,
}

impl JobState {
    pub fn of(lease: &LeaseState, now: DateTime<Utc>, lease_timeout: Duration) -> JobState {
        if lease.done {
            return JobState::Done;
        }
        if !lease.active {
            return JobState::Paused;
        }
        if !lease.taken {
            return JobState::Queued;
        }
        match lease.heartbeat {
            Some(heartbeat) if now - heartbeat <= lease_timeout => JobState::Leased,
            _ => JobState::Expired,
        }
    }
}
