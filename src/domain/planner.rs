//! Request decomposition: one submission becomes a deterministic set of
//! unit jobs plus the part records naming their future output files.

use crate::domain::encoder_args::{build_args, EncodingParams};
use crate::domain::jobs::{JobKind, MediaInfo, Part, PlannedJob, Request};
use crate::domain::requests::{EncodeJobRequest, JobRequest, MuxJobRequest, TargetRendition};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Fixed length of one video chunk in seconds.
pub const CHUNK_SECONDS: u64 = 60;

/// The destination filename split into the pieces output names are built from.
#[derive(Debug, Clone, PartialEq)]
pub struct Destination {
    pub folder: PathBuf,
    pub prefix: String,
    /// Dot-prefixed, or empty when the destination has no extension.
    pub extension: String,
}

impl Destination {
    pub fn parse(filename: &str) -> Option<Destination> {
        let path = Path::new(filename);
        let prefix = path.file_stem()?.to_str()?.to_string();
        let folder = path.parent()?.to_path_buf();
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e))
            .unwrap_or_default();

        Some(Destination {
            folder,
            prefix,
            extension,
        })
    }
}

/// Everything one submission persists, produced in a single pure step.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub request: Request,
    pub jobs: Vec<PlannedJob>,
    pub parts: Vec<Part>,
}

/// Decompose a transcode submission into per-target audio jobs followed by
/// chunked multi-output video jobs.
///
/// Audio jobs come first: they cannot be chunked, so they have the longest
/// single-worker runtime per target and dispatching them early lets them
/// finish in parallel with the video chunks.
pub fn plan_transcode(
    correlation_id: Uuid,
    submission: &JobRequest,
    destination: &Destination,
    media: MediaInfo,
    enable_crf: bool,
    created: DateTime<Utc>,
) -> Plan {
    let mut jobs = Vec::new();
    let mut parts = Vec::new();

    let audio_source = if submission.has_alternate_audio {
        submission.audio_source_filename.as_deref()
    } else {
        submission.video_source_filename.as_deref()
    };

    if let Some(source) = audio_source {
        for (index, target) in submission.targets.iter().enumerate() {
            let output = destination
                .folder
                .join(format!("{}_{}_audio.mp4", destination.prefix, index));
            let output = output.display().to_string();

            parts.push(Part {
                correlation_id,
                target_index: index as u32,
                number: 0,
                filename: output.clone(),
            });
            jobs.push(PlannedJob {
                kind: JobKind::Audio,
                arguments: format!(
                    "-y -i \"{}\" -c:a aac -b:a {}k -vn \"{}\"",
                    source, target.audio_bitrate, output
                ),
                source: PathBuf::from(source),
                chunk_duration: media.duration,
            });
        }
    }

    if let Some(video) = submission.video_source_filename.as_deref() {
        let mut start = 0u64;
        while start < media.duration {
            let mut arguments = format!(
                "-y -ss {} -t {} -i \"{}\"",
                format_chunk_start(start),
                CHUNK_SECONDS,
                video
            );

            for (index, target) in submission.targets.iter().enumerate() {
                let chunk_file = destination.folder.join(format!(
                    "{}_{}_{}{}",
                    destination.prefix, index, start, destination.extension
                ));
                let chunk_file = chunk_file.display().to_string();

                arguments.push(' ');
                arguments.push_str(&rendition_tail(
                    target,
                    media.framerate,
                    submission.enable_dash,
                    enable_crf,
                    &chunk_file,
                ));
                parts.push(Part {
                    correlation_id,
                    target_index: index as u32,
                    number: (start / CHUNK_SECONDS) as u32,
                    filename: chunk_file,
                });
            }

            jobs.push(PlannedJob {
                kind: JobKind::Video,
                arguments,
                source: PathBuf::from(video),
                chunk_duration: CHUNK_SECONDS,
            });
            start += CHUNK_SECONDS;
        }
    }

    Plan {
        request: Request {
            correlation_id,
            video_source: submission.video_source_filename.as_deref().map(PathBuf::from),
            audio_source: submission.audio_source_filename.as_deref().map(PathBuf::from),
            destination: PathBuf::from(&submission.destination_filename),
            needed: submission.needed,
            created,
            enable_dash: submission.enable_dash,
        },
        jobs,
        parts,
    }
}

/// Plan a mux submission: exactly one stream-copy job, no parts.
pub fn plan_mux(
    correlation_id: Uuid,
    submission: &MuxJobRequest,
    media: MediaInfo,
    created: DateTime<Utc>,
) -> Plan {
    let output = Path::new(&submission.output_folder).join(&submission.destination_filename);

    let mut arguments = String::new();
    if let Some(inpoint) = submission.inpoint_seconds {
        arguments.push_str(&format!("-ss {} ", format_inpoint(inpoint)));
    }
    arguments.push_str(&format!(
        "-xerror -i \"{}\" -i \"{}\" -map 0:v:0 -map 1:a:0 -c copy -y \"{}\"",
        submission.video_source_filename,
        submission.audio_source_filename,
        output.display()
    ));

    Plan {
        request: Request {
            correlation_id,
            video_source: Some(PathBuf::from(&submission.video_source_filename)),
            audio_source: Some(PathBuf::from(&submission.audio_source_filename)),
            destination: output,
            needed: submission.needed.unwrap_or(created),
            created,
            enable_dash: false,
        },
        jobs: vec![PlannedJob {
            kind: JobKind::Mux,
            arguments,
            source: PathBuf::from(&submission.video_source_filename),
            chunk_duration: media.duration,
        }],
        parts: vec![],
    }
}

/// Plan a single custom encode job from structured encoder parameters.
pub fn plan_encode(
    correlation_id: Uuid,
    submission: &EncodeJobRequest,
    media: MediaInfo,
    created: DateTime<Utc>,
) -> Plan {
    let params = EncodingParams {
        input: submission.source_filename.clone(),
        video: submission.video.clone(),
        audio: submission.audio.clone(),
        deinterlace: submission.deinterlace,
    };
    let kind = if submission.video.is_some() {
        JobKind::Video
    } else {
        JobKind::Audio
    };

    Plan {
        request: Request {
            correlation_id,
            video_source: Some(PathBuf::from(&submission.source_filename)),
            audio_source: None,
            destination: PathBuf::from(&submission.destination_filename),
            needed: submission.needed.unwrap_or(created),
            created,
            enable_dash: false,
        },
        jobs: vec![PlannedJob {
            kind,
            arguments: format!(
                "{} -y \"{}\"",
                build_args(&params),
                submission.destination_filename
            ),
            source: PathBuf::from(&submission.source_filename),
            chunk_duration: media.duration,
        }],
        parts: vec![Part {
            correlation_id,
            target_index: 0,
            number: 0,
            filename: submission.destination_filename.clone(),
        }],
    }
}

fn rendition_tail(
    target: &TargetRendition,
    framerate: f64,
    enable_dash: bool,
    enable_crf: bool,
    output: &str,
) -> String {
    if enable_dash {
        let gop = (framerate * 4.0).round() as u32;
        format!(
            "-s {}x{} -c:v libx264 -g {} -keyint_min {} -profile:v high -b:v {}k -level 4.1 -pix_fmt yuv420p -an \"{}\"",
            target.width, target.height, gop, gop, target.video_bitrate, output
        )
    } else if enable_crf {
        let bufsize = target.video_bitrate / 8 * CHUNK_SECONDS as u32;
        format!(
            "-s {}x{} -c:v libx264 -profile:v high -crf 18 -preset medium -maxrate {}k -bufsize {}k -level 4.1 -pix_fmt yuv420p -an \"{}\"",
            target.width, target.height, target.video_bitrate, bufsize, output
        )
    } else {
        format!(
            "-s {}x{} -c:v libx264 -profile:v high -b:v {}k -level 4.1 -pix_fmt yuv420p -an \"{}\"",
            target.width, target.height, target.video_bitrate, output
        )
    }
}

fn format_chunk_start(seconds: u64) -> String {
    format!(
        "{:02}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}

fn format_inpoint(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
