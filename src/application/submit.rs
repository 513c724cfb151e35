//! Request intake: validate, probe, plan, persist.

use crate::domain::jobs::MediaInfo;
use crate::domain::planner::{plan_encode, plan_mux, plan_transcode, Destination, Plan};
use crate::domain::requests::{EncodeJobRequest, JobRequest, MuxJobRequest};
use crate::ports::probe::{MediaProbe, ProbeError};
use crate::ports::repository::{JobRepository, RepositoryError};
use chrono::Utc;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

#[derive(Debug)]
pub enum SubmitError {
    BadRequest(String),
    SourceNotFound(PathBuf),
    DestinationInvalid(PathBuf),
    ProbeFailed(ProbeError),
    Repository(RepositoryError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmitError::BadRequest(e) => write!(f, "bad request: {}", e),
            SubmitError::SourceNotFound(p) => write!(f, "source not found: {}", p.display()),
            SubmitError::DestinationInvalid(p) => {
                write!(f, "destination folder does not exist: {}", p.display())
            }
            SubmitError::ProbeFailed(e) => write!(f, "probe failed: {}", e),
            SubmitError::Repository(e) => write!(f, "repository error: {}", e),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SubmitError::ProbeFailed(e) => Some(e),
            SubmitError::Repository(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ProbeError> for SubmitError {
    fn from(err: ProbeError) -> Self {
        SubmitError::ProbeFailed(err)
    }
}

impl From<RepositoryError> for SubmitError {
    fn from(err: RepositoryError) -> Self {
        SubmitError::Repository(err)
    }
}

/// Turns submissions into persisted job sets. Decomposition and persistence
/// are atomic: a failure at any step leaves no rows behind.
pub struct RequestService<P, R> {
    probe: P,
    repo: R,
    enable_crf: bool,
}

impl<P, R> RequestService<P, R>
where
    P: MediaProbe,
    R: JobRepository,
{
    pub fn new(probe: P, repo: R, enable_crf: bool) -> Self {
        Self {
            probe,
            repo,
            enable_crf,
        }
    }

    pub async fn submit(&self, submission: JobRequest) -> Result<Uuid, SubmitError> {
        let destination = validate_transcode(&submission)?;

        let media = match submission.video_source_filename.as_deref() {
            Some(video) => self.probe.probe(Path::new(video)).await?,
            None => MediaInfo::default(),
        };

        let correlation_id = Uuid::new_v4();
        let plan = plan_transcode(
            correlation_id,
            &submission,
            &destination,
            media,
            self.enable_crf,
            Utc::now(),
        );
        self.persist(plan, "transcode").await?;
        Ok(correlation_id)
    }

    pub async fn submit_mux(&self, submission: MuxJobRequest) -> Result<Uuid, SubmitError> {
        validate_mux(&submission)?;

        let media = self
            .probe
            .probe(Path::new(&submission.video_source_filename))
            .await?;

        let correlation_id = Uuid::new_v4();
        let plan = plan_mux(correlation_id, &submission, media, Utc::now());
        self.persist(plan, "mux").await?;
        Ok(correlation_id)
    }

    pub async fn submit_encode(&self, submission: EncodeJobRequest) -> Result<Uuid, SubmitError> {
        validate_encode(&submission)?;

        let media = self
            .probe
            .probe(Path::new(&submission.source_filename))
            .await?;

        let correlation_id = Uuid::new_v4();
        let plan = plan_encode(correlation_id, &submission, media, Utc::now());
        self.persist(plan, "encode").await?;
        Ok(correlation_id)
    }

    async fn persist(&self, plan: Plan, kind: &str) -> Result<(), SubmitError> {
        self.repo
            .add_request(&plan.request, &plan.jobs, &plan.parts)
            .await?;
        info!(
            correlation_id = %plan.request.correlation_id,
            jobs = plan.jobs.len(),
            parts = plan.parts.len(),
            "accepted {} request", kind
        );
        Ok(())
    }
}

fn validate_transcode(submission: &JobRequest) -> Result<Destination, SubmitError> {
    if submission.video_source_filename.is_none() && submission.audio_source_filename.is_none() {
        return Err(SubmitError::BadRequest(
            "at least one of video source and audio source is required".to_string(),
        ));
    }
    if submission.has_alternate_audio && submission.audio_source_filename.is_none() {
        return Err(SubmitError::BadRequest(
            "alternate audio requested without an audio source".to_string(),
        ));
    }
    if !submission.has_alternate_audio && submission.audio_source_filename.is_some() {
        return Err(SubmitError::BadRequest(
            "audio source given without the alternate-audio flag".to_string(),
        ));
    }
    if submission.targets.is_empty() {
        return Err(SubmitError::BadRequest(
            "at least one target rendition is required".to_string(),
        ));
    }

    for source in [
        submission.video_source_filename.as_deref(),
        submission.audio_source_filename.as_deref(),
    ]
    .into_iter()
    .flatten()
    {
        require_source(source)?;
    }

    let destination = Destination::parse(&submission.destination_filename).ok_or_else(|| {
        SubmitError::BadRequest(format!(
            "destination filename {:?} has no usable file stem",
            submission.destination_filename
        ))
    })?;
    if !destination.folder.is_dir() {
        return Err(SubmitError::DestinationInvalid(destination.folder));
    }

    Ok(destination)
}

fn validate_mux(submission: &MuxJobRequest) -> Result<(), SubmitError> {
    if submission.destination_filename.is_empty() {
        return Err(SubmitError::BadRequest(
            "destination filename is required".to_string(),
        ));
    }
    require_source(&submission.video_source_filename)?;
    require_source(&submission.audio_source_filename)?;

    let folder = Path::new(&submission.output_folder);
    if !folder.is_dir() {
        return Err(SubmitError::DestinationInvalid(folder.to_path_buf()));
    }
    Ok(())
}

fn validate_encode(submission: &EncodeJobRequest) -> Result<(), SubmitError> {
    if submission.video.is_none() && submission.audio.is_none() {
        return Err(SubmitError::BadRequest(
            "an encode request needs video or audio settings".to_string(),
        ));
    }
    require_source(&submission.source_filename)?;

    let folder = Path::new(&submission.destination_filename)
        .parent()
        .unwrap_or_else(|| Path::new(""));
    if !folder.is_dir() {
        return Err(SubmitError::DestinationInvalid(folder.to_path_buf()));
    }
    Ok(())
}

fn require_source(source: &str) -> Result<(), SubmitError> {
    let path = Path::new(source);
    if !path.exists() {
        return Err(SubmitError::SourceNotFound(path.to_path_buf()));
    }
    Ok(())
}
