use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressifyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Corrupt job record for {job_id} at {}: {reason}", path.display())]
    CorruptJobRecord {
        job_id: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Profile mismatch for job {job_id}: {detail} (use --force to override)")]
    ProfileMismatch { job_id: String, detail: String },

    #[error("External tool error: {0}")]
    ExternalTool(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Timed out after {seconds}s while compressing {}", path.display())]
    Timeout { path: PathBuf, seconds: u64 },
}

pub type Result<T> = std::result::Result<T, CompressifyError>;
