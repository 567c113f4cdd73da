use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use super::model::JobStatus;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub queued: usize,
    pub in_progress: usize,
    pub done: usize,
    pub skipped: usize,
    pub error: usize,
}

/// Outcome of a `run_job` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub job_id: String,
    pub status: JobStatus,
    pub done: usize,
    pub skipped: usize,
    pub errors: usize,
    /// Tasks left QUEUED, non-zero only for a paused job
    pub remaining: usize,
    /// Input bytes of DONE tasks
    pub input_bytes: u64,
    /// Output bytes of DONE tasks
    pub output_bytes: u64,
}

impl JobResult {
    /// Bytes saved; negative when outputs grew
    pub fn saved_bytes(&self) -> i64 {
        self.input_bytes as i64 - self.output_bytes as i64
    }

    pub fn savings_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        self.saved_bytes() as f64 / self.input_bytes as f64 * 100.0
    }
}

/// Row for job listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub id: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub input_path: PathBuf,
    pub output_root: PathBuf,
    pub profile_name: String,
    pub total: usize,
    pub counts: TaskCounts,
    pub archived: bool,
}

/// Format file size in human-readable form
pub fn format_file_size(size_bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    if size_bytes < 1024 {
        return format!("{} B", size_bytes);
    }

    let mut size = size_bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", size, UNITS[unit])
}

/// Signed variant for savings that may be negative
pub fn format_signed_size(bytes: i64) -> String {
    if bytes < 0 {
        format!("-{}", format_file_size(bytes.unsigned_abs()))
    } else {
        format_file_size(bytes as u64)
    }
}

/// Format duration in seconds to human readable string
pub fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Wall time of one file, empty until it has run
pub fn format_task_time(duration_ms: Option<u64>) -> String {
    match duration_ms {
        None => String::new(),
        Some(ms) if ms < 1000 => "<1s".to_string(),
        Some(ms) => format_duration(ms / 1000),
    }
}
