//! Submission payloads accepted by the coordination API.

use crate::domain::encoder_args::{AudioParams, DeinterlaceParams, VideoParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One desired output profile. The position in the request's target list is
/// stable and referenced by part records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetRendition {
    pub width: u32,
    pub height: u32,
    /// kbps
    pub video_bitrate: u32,
    /// kbps
    pub audio_bitrate: u32,
}

/// A transcode submission: one source, many renditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub video_source_filename: Option<String>,
    /// Only set together with `has_alternate_audio`; otherwise the audio
    /// passes read from the video source.
    pub audio_source_filename: Option<String>,
    pub destination_filename: String,
    /// Deadline the request should be completed by; sole dispatch ordering key.
    pub needed: DateTime<Utc>,
    #[serde(default)]
    pub enable_dash: bool,
    #[serde(default)]
    pub has_alternate_audio: bool,
    pub targets: Vec<TargetRendition>,
}

/// A mux submission: copy one video track and one audio track into a
/// single container.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MuxJobRequest {
    pub video_source_filename: String,
    pub audio_source_filename: String,
    pub destination_filename: String,
    pub output_folder: String,
    /// Seconds to seek into both inputs before copying.
    #[serde(default)]
    pub inpoint_seconds: Option<u64>,
    /// Defaults to the submission time when omitted.
    #[serde(default)]
    pub needed: Option<DateTime<Utc>>,
}

/// A single custom encode built from structured encoder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeJobRequest {
    pub source_filename: String,
    pub destination_filename: String,
    #[serde(default)]
    pub needed: Option<DateTime<Utc>>,
    #[serde(default)]
    pub video: Option<VideoParams>,
    #[serde(default)]
    pub audio: Option<AudioParams>,
    #[serde(default)]
    pub deinterlace: Option<DeinterlaceParams>,
}
