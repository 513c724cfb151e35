use crate::domain::jobs::MediaInfo;
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

#[derive(Debug)]
pub enum ProbeError {
    Spawn(std::io::Error),
    Unreadable(String),
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::Spawn(e) => write!(f, "failed to run the media prober: {}", e),
            ProbeError::Unreadable(e) => write!(f, "could not read media metadata: {}", e),
        }
    }
}

impl std::error::Error for ProbeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProbeError::Spawn(e) => Some(e),
            ProbeError::Unreadable(_) => None,
        }
    }
}

/// Inspect a media file for duration and framerate.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, path: &Path) -> Result<MediaInfo, ProbeError>;
}
