//! Media metadata probing via the ffprobe binary.

use crate::domain::jobs::MediaInfo;
use crate::ports::probe::{MediaProbe, ProbeError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use tokio::process::Command;

/// Probes files by spawning `ffprobe` and reading its JSON report.
#[derive(Clone, Copy)]
pub struct FfprobeProbe;

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError> {
        let output = Command::new("ffprobe")
            .arg("-v")
            .arg("error")
            .arg("-show_format")
            .arg("-show_streams")
            .arg("-print_format")
            .arg("json")
            .arg(path)
            .output()
            .await
            .map_err(ProbeError::Spawn)?;

        if !output.status.success() {
            return Err(ProbeError::Unreadable(format!(
                "ffprobe failed with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        parse_probe_report(&output.stdout)
    }
}

fn parse_probe_report(raw: &[u8]) -> Result<MediaInfo, ProbeError> {
    let report: Value = serde_json::from_slice(raw)
        .map_err(|e| ProbeError::Unreadable(format!("bad ffprobe JSON: {}", e)))?;

    let duration = report
        .get("format")
        .and_then(|f| f.get("duration"))
        .and_then(|d| d.as_str())
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ProbeError::Unreadable("no duration in ffprobe report".to_string()))?;

    // Framerate comes from the first video stream; a pure audio file simply
    // has none.
    let framerate = report
        .get("streams")
        .and_then(|s| s.as_array())
        .and_then(|streams| {
            streams
                .iter()
                .find(|s| s.get("codec_type").and_then(|c| c.as_str()) == Some("video"))
        })
        .and_then(|s| s.get("r_frame_rate"))
        .and_then(|r| r.as_str())
        .and_then(parse_frame_rate)
        .unwrap_or(0.0);

    Ok(MediaInfo {
        duration: duration as u64,
        framerate,
    })
}

fn parse_frame_rate(raw: &str) -> Option<f64> {
    match raw.split_once('/') {
        Some((numerator, denominator)) => {
            let numerator: f64 = numerator.parse().ok()?;
            let denominator: f64 = denominator.parse().ok()?;
            if denominator == 0.0 {
                None
            } else {
                Some(numerator / denominator)
            }
        }
        None => raw.parse().ok(),
    }
}
