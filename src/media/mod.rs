// Media handling
//
// - Discovery: finds compressible files under an input path
// - Commands: ffmpeg command builder with timeout-aware execution
// - Processor: the ffmpeg-backed compression invoker
//
// The job manager only sees the `CompressionInvoker` trait, so tests and other
// encoders can stand in for ffmpeg.

pub mod commands;
pub mod discovery;
pub mod processor;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use commands::*;
pub use discovery::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::profile::ProfileParams;

pub const VIDEO_EXTENSIONS: [&str; 13] = [
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "3gp", "ogv", "ts", "mts", "m2ts",
];

pub const IMAGE_EXTENSIONS: [&str; 9] = [
    "jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif", "avif",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// Classify a path by its extension (case-insensitive)
    pub fn detect(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else {
            None
        }
    }

    /// Output extension for this kind under the given parameters
    pub fn target_extension(&self, params: &ProfileParams) -> &'static str {
        match self {
            Self::Video => params.video.format.extension(),
            Self::Image => params.image.format.extension(),
        }
    }
}

/// Which media kinds a job picks up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    #[default]
    All,
    Video,
    Image,
}

impl KindFilter {
    pub fn accepts(&self, kind: MediaKind) -> bool {
        match self {
            Self::All => true,
            Self::Video => kind == MediaKind::Video,
            Self::Image => kind == MediaKind::Image,
        }
    }
}

/// One file handed to the invoker
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionRequest {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: MediaKind,
    pub params: ProfileParams,
}

/// What the invoker produced for a file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionOutcome {
    pub output_path: PathBuf,
    pub output_size: u64,
}

/// Performs one external compression synchronously from the caller's view
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompressionInvoker: Send + Sync {
    /// Compress `request.source` into `request.destination`
    async fn compress(&self, request: &CompressionRequest) -> Result<CompressionOutcome>;

    /// Check if the external tool is available
    fn check_availability(&self) -> Result<()>;

    /// Get external tool version information
    async fn get_version_info(&self) -> Result<String>;
}

/// Factory for creating invoker instances
pub struct InvokerFactory;

impl InvokerFactory {
    /// Create the default invoker (ffmpeg-based)
    pub fn create_invoker(config: MediaConfig) -> Box<dyn CompressionInvoker> {
        Box::new(processor::FfmpegInvoker::new(config))
    }
}
