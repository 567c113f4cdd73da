use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::summary::{JobResult, JobSummary, TaskCounts};
use crate::media::{KindFilter, MediaKind};
use crate::profile::ProfileParams;

/// Current on-disk record format
pub const RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Queued,
    InProgress,
    Done,
    Skipped,
    Error,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Skipped | Self::Error)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::InProgress => "in progress",
            Self::Done => "done",
            Self::Skipped => "skipped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One input file's unit of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTask {
    /// Source path relative to the job's input root
    pub source: PathBuf,
    pub destination: PathBuf,
    pub kind: MediaKind,
    pub status: TaskStatus,
    /// Present iff status is ERROR
    pub error: Option<String>,
    /// Present iff status is SKIPPED
    pub skip_reason: Option<String>,
    /// Present iff status is DONE
    pub input_size: Option<u64>,
    /// Present iff status is DONE
    pub output_size: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Wall time of the last invocation in milliseconds
    pub duration_ms: Option<u64>,
}

impl FileTask {
    pub fn queued(source: PathBuf, destination: PathBuf, kind: MediaKind) -> Self {
        Self {
            source,
            destination,
            kind,
            status: TaskStatus::Queued,
            error: None,
            skip_reason: None,
            input_size: None,
            output_size: None,
            started_at: None,
            finished_at: None,
            duration_ms: None,
        }
    }

    pub fn start(&mut self) {
        debug_assert_eq!(self.status, TaskStatus::Queued);
        self.status = TaskStatus::InProgress;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub fn complete(&mut self, input_size: u64, output_size: u64, duration_ms: u64) {
        debug_assert_eq!(self.status, TaskStatus::InProgress);
        self.status = TaskStatus::Done;
        self.input_size = Some(input_size);
        self.output_size = Some(output_size);
        self.duration_ms = Some(duration_ms);
        self.finished_at = Some(Utc::now());
    }

    pub fn fail<S: Into<String>>(&mut self, message: S, duration_ms: Option<u64>) {
        debug_assert_eq!(self.status, TaskStatus::InProgress);
        self.status = TaskStatus::Error;
        self.error = Some(message.into());
        self.duration_ms = duration_ms;
        self.finished_at = Some(Utc::now());
    }

    /// QUEUED -> SKIPPED when no work is needed
    pub fn skip<S: Into<String>>(&mut self, reason: S) {
        debug_assert_eq!(self.status, TaskStatus::Queued);
        self.status = TaskStatus::Skipped;
        self.skip_reason = Some(reason.into());
        self.finished_at = Some(Utc::now());
    }

    /// Recovery transition: IN_PROGRESS or ERROR back to QUEUED.
    /// Returns whether anything changed.
    pub fn requeue(&mut self) -> bool {
        if !matches!(self.status, TaskStatus::InProgress | TaskStatus::Error) {
            return false;
        }
        self.status = TaskStatus::Queued;
        self.error = None;
        self.started_at = None;
        self.finished_at = None;
        self.duration_ms = None;
        true
    }

    /// Check the field-presence rules tied to the status
    pub fn check_consistency(&self) -> Result<(), String> {
        let name = self.source.display();
        if self.error.is_some() != (self.status == TaskStatus::Error) {
            return Err(format!("task {} has error message inconsistent with status {:?}", name, self.status));
        }
        let done = self.status == TaskStatus::Done;
        if self.input_size.is_some() != done || self.output_size.is_some() != done {
            return Err(format!("task {} has sizes inconsistent with status {:?}", name, self.status));
        }
        Ok(())
    }
}

/// Options fixed when a job is created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobOptions {
    pub kind_filter: KindFilter,
    pub overwrite: bool,
    /// Keep the record active after a clean completion
    pub keep_record: bool,
}

/// A batch compression run and all of its file tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub version: u32,
    pub id: String,
    /// Path given by the user, file or directory
    pub input_path: PathBuf,
    /// Root that task sources are relative to
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    /// Frozen at creation
    pub params: ProfileParams,
    /// Bumped when a forced resume replaces `params`
    #[serde(default)]
    pub params_revision: u32,
    pub kind_filter: KindFilter,
    pub overwrite: bool,
    pub keep_record: bool,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub tasks: Vec<FileTask>,
}

impl Job {
    /// Identifier that sorts by creation time
    pub fn generate_id(created_at: DateTime<Utc>) -> String {
        let tag = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{}", created_at.format("%Y%m%d-%H%M%S%3f"), &tag[..8])
    }

    pub fn counts(&self) -> TaskCounts {
        let mut counts = TaskCounts::default();
        for task in &self.tasks {
            match task.status {
                TaskStatus::Queued => counts.queued += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Done => counts.done += 1,
                TaskStatus::Skipped => counts.skipped += 1,
                TaskStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    /// Index of the first QUEUED task in discovery order
    pub fn next_queued(&self) -> Option<usize> {
        self.tasks.iter().position(|t| t.status == TaskStatus::Queued)
    }

    pub fn has_pending_work(&self) -> bool {
        self.tasks
            .iter()
            .any(|t| matches!(t.status, TaskStatus::Queued | TaskStatus::InProgress))
    }

    pub fn result(&self) -> JobResult {
        let counts = self.counts();
        let (input_bytes, output_bytes) = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Done)
            .fold((0u64, 0u64), |(i, o), t| {
                (i + t.input_size.unwrap_or(0), o + t.output_size.unwrap_or(0))
            });

        JobResult {
            job_id: self.id.clone(),
            status: self.status,
            done: counts.done,
            skipped: counts.skipped,
            errors: counts.error,
            remaining: counts.queued + counts.in_progress,
            input_bytes,
            output_bytes,
        }
    }

    pub fn summary(&self, archived: bool) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            status: self.status,
            created_at: self.created_at,
            input_path: self.input_path.clone(),
            output_root: self.output_root.clone(),
            profile_name: self.params.profile_name.clone(),
            total: self.tasks.len(),
            counts: self.counts(),
            archived,
        }
    }

    /// Structural checks applied after a record is parsed
    pub fn check_consistency(&self) -> Result<(), String> {
        if self.version != RECORD_VERSION {
            return Err(format!("unsupported record version {}", self.version));
        }
        if self.tasks.is_empty() {
            return Err("record has no file tasks".to_string());
        }
        self.params.validate().map_err(|e| e.to_string())?;
        for task in &self.tasks {
            task.check_consistency()?;
        }
        Ok(())
    }
}
