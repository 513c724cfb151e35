//! Argument synthesis for the external media tool.
//!
//! The emitted string is the interface contract between the server and the
//! tool launcher on each worker: token order and formatting are observable
//! and must stay byte-stable for identical inputs.

use serde::{Deserialize, Serialize};

const DEFAULT_PRESET: &str = "medium";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoParams {
    pub codec: String,
    /// bits per second
    pub bitrate: u64,
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub size: Option<FrameSize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioParams {
    pub codec: String,
    /// bits per second
    pub bitrate: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeinterlaceMode {
    SendFrame,
    SendField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldParity {
    Auto,
    TopFirst,
    BottomFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeinterlaceParams {
    #[serde(default)]
    pub mode: Option<DeinterlaceMode>,
    #[serde(default)]
    pub parity: Option<FieldParity>,
    #[serde(default)]
    pub all_frames: bool,
}

/// Structured input of [`build_args`]. The input filename is emitted
/// verbatim between double quotes; callers must not embed literal quotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingParams {
    pub input: String,
    #[serde(default)]
    pub video: Option<VideoParams>,
    #[serde(default)]
    pub audio: Option<AudioParams>,
    #[serde(default)]
    pub deinterlace: Option<DeinterlaceParams>,
}

/// Render a parameter record as an argument string for the media tool.
///
/// Total on well-formed records; a record with no settings at all yields
/// just the `-i` prefix. Deinterlacing and scaling are mutually exclusive
/// in the output: the yadif stage wins whenever mode and parity are known,
/// because scaling would have to be composed into the filter graph and
/// that composition is not exposed yet.
pub fn build_args(params: &EncodingParams) -> String {
    let mut args = vec![format!("-i \"{}\"", params.input)];

    if let Some(filter) = filter_expression(params) {
        args.push(format!("-filter_complex \"{}\"", filter));
    }

    if let Some(video) = &params.video {
        args.push(format!(
            "-codec:v {} -preset {} -b:v {}k",
            video.codec.to_lowercase(),
            video.preset.as_deref().unwrap_or(DEFAULT_PRESET),
            video.bitrate / 1000
        ));
    }

    if let Some(audio) = &params.audio {
        args.push(format!(
            "-codec:a {} -b:a {}k",
            audio.codec.to_lowercase(),
            audio.bitrate / 1000
        ));
    }

    args.join(" ")
}

fn filter_expression(params: &EncodingParams) -> Option<String> {
    if let Some(deinterlace) = &params.deinterlace {
        if let (Some(mode), Some(parity)) = (deinterlace.mode, deinterlace.parity) {
            let mode = match mode {
                DeinterlaceMode::SendFrame => 0,
                DeinterlaceMode::SendField => 1,
            };
            let parity = match parity {
                FieldParity::Auto => -1,
                FieldParity::TopFirst => 0,
                FieldParity::BottomFirst => 1,
            };
            let all = if deinterlace.all_frames { 1 } else { 0 };
            return Some(format!("yadif={}:{}:{}", mode, parity, all));
        }
    }

    params
        .video
        .as_ref()
        .and_then(|v| v.size)
        .map(|size| format!("scale={}:{}", size.width, size.height))
}
