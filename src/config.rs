use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use crate::error::{Result, CompressifyError};

/// Environment variable that overrides the job record directory
pub const JOBS_DIR_ENV: &str = "COMPRESSIFY_JOBS_DIR";

fn default_workers() -> usize {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root for records, logs and custom profiles
    pub data_dir: PathBuf,
    pub jobs: JobsConfig,
    pub media: MediaConfig,
    pub profiles: ProfilesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Directory holding job records; defaults to `<data_dir>/jobs`
    pub dir: Option<PathBuf>,
    /// Number of files compressed concurrently within one job
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Keep completed job records active instead of archiving them
    #[serde(default)]
    pub keep_completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// Per-file timeout in seconds; no limit when absent
    pub timeout_secs: Option<u64>,
    /// Additional options appended to every video encode
    /// e.g. ["-pix_fmt", "yuv420p"]
    #[serde(default)]
    pub extra_video_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilesConfig {
    /// Directory holding custom profiles; defaults to `<data_dir>/profiles`
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".compressify"),
            jobs: JobsConfig {
                dir: None,
                workers: default_workers(),
                keep_completed: false,
            },
            media: MediaConfig {
                binary_path: "ffmpeg".to_string(),
                timeout_secs: None,
                extra_video_options: vec![],
            },
            profiles: ProfilesConfig { dir: None },
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CompressifyError::Config(format!("Failed to read config file: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| CompressifyError::Config(format!("Failed to parse config file: {}", e)))
    }

    /// Job record directory, honoring `COMPRESSIFY_JOBS_DIR`
    pub fn jobs_dir(&self) -> PathBuf {
        if let Some(dir) = std::env::var_os(JOBS_DIR_ENV).filter(|v| !v.is_empty()) {
            return PathBuf::from(dir);
        }
        self.jobs.dir.clone().unwrap_or_else(|| self.data_dir.join("jobs"))
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.profiles.dir.clone().unwrap_or_else(|| self.data_dir.join("profiles"))
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("log")
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs.workers == 0 {
            return Err(CompressifyError::Config("jobs.workers must be at least 1".to_string()));
        }
        if self.media.binary_path.trim().is_empty() {
            return Err(CompressifyError::Config("media.binary_path must not be empty".to_string()));
        }
        if self.media.timeout_secs == Some(0) {
            return Err(CompressifyError::Config("media.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
