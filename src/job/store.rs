use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::model::Job;
use super::summary::JobSummary;
use crate::error::{Result, CompressifyError};

const RECORD_EXTENSION: &str = "json";
const PAUSE_EXTENSION: &str = "pause";
const ARCHIVE_DIR: &str = "archive";

/// Where a record was found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordLocation {
    Active,
    Archived,
}

/// Filesystem store for job records, one JSON document per job.
///
/// Records are replaced atomically (write to a temp file in the same
/// directory, then rename), so a crash never leaves a half-written record
/// at the final path.
pub struct JobStore {
    dir: PathBuf,
}

impl JobStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn archive_dir(&self) -> PathBuf {
        self.dir.join(ARCHIVE_DIR)
    }

    pub fn record_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", job_id, RECORD_EXTENSION))
    }

    fn archived_path(&self, job_id: &str) -> PathBuf {
        self.archive_dir().join(format!("{}.{}", job_id, RECORD_EXTENSION))
    }

    fn pause_path(&self, job_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", job_id, PAUSE_EXTENSION))
    }

    /// Write-through persist of the full record
    pub fn save(&self, job: &Job) -> Result<()> {
        write_atomically(&self.dir, &self.record_path(&job.id), job)?;
        debug!("Persisted job record {}", job.id);
        Ok(())
    }

    pub fn locate(&self, job_id: &str) -> Option<(PathBuf, RecordLocation)> {
        let active = self.record_path(job_id);
        if active.is_file() {
            return Some((active, RecordLocation::Active));
        }
        let archived = self.archived_path(job_id);
        if archived.is_file() {
            return Some((archived, RecordLocation::Archived));
        }
        None
    }

    /// Load a record from the active set, falling back to the archive
    pub fn load(&self, job_id: &str) -> Result<(Job, RecordLocation)> {
        let (path, location) = self
            .locate(job_id)
            .ok_or_else(|| CompressifyError::JobNotFound(job_id.to_string()))?;
        let job = read_record(&path, job_id)?;
        Ok((job, location))
    }

    /// Move a record into the archive directory
    pub fn archive(&self, job: &Job) -> Result<()> {
        let archive_dir = self.archive_dir();
        write_atomically(&archive_dir, &self.archived_path(&job.id), job)?;
        remove_if_present(&self.record_path(&job.id))?;
        self.clear_pause(&job.id)?;
        info!("Archived job record {}", job.id);
        Ok(())
    }

    pub fn delete(&self, job_id: &str) -> Result<()> {
        let (path, _) = self
            .locate(job_id)
            .ok_or_else(|| CompressifyError::JobNotFound(job_id.to_string()))?;
        std::fs::remove_file(&path)?;
        self.clear_pause(job_id)?;
        info!("Deleted job record {}", job_id);
        Ok(())
    }

    /// Remove all archived records, returning how many were deleted
    pub fn clean_archive(&self) -> Result<u64> {
        let mut removed = 0;
        for path in record_files(&self.archive_dir())? {
            std::fs::remove_file(&path)?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Summaries ordered by creation time, newest first. Records are parsed
    /// lazily as the iterator advances; unreadable ones yield an error item.
    pub fn list(&self, include_archived: bool) -> Result<impl Iterator<Item = Result<JobSummary>> + use<>> {
        let mut entries: Vec<(PathBuf, bool)> = record_files(&self.dir)?
            .into_iter()
            .map(|p| (p, false))
            .collect();
        if include_archived {
            entries.extend(record_files(&self.archive_dir())?.into_iter().map(|p| (p, true)));
        }

        // Ids lead with the creation timestamp
        entries.sort_by(|(a, _), (b, _)| b.file_stem().cmp(&a.file_stem()));

        Ok(entries.into_iter().map(|(path, archived)| {
            let job_id = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            read_record(&path, &job_id).map(|job| job.summary(archived))
        }))
    }

    /// Ask a running job, possibly in another process, to stop at the next file boundary
    pub fn request_pause(&self, job_id: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.pause_path(job_id), chrono::Utc::now().to_rfc3339())?;
        Ok(())
    }

    pub async fn pause_requested(&self, job_id: &str) -> bool {
        tokio::fs::try_exists(self.pause_path(job_id)).await.unwrap_or(false)
    }

    pub fn clear_pause(&self, job_id: &str) -> Result<()> {
        remove_if_present(&self.pause_path(job_id))
    }
}

fn write_atomically(dir: &Path, path: &Path, job: &Job) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let content = serde_json::to_vec_pretty(job)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(&content)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| CompressifyError::Io(e.error))?;
    Ok(())
}

fn read_record(path: &Path, job_id: &str) -> Result<Job> {
    let corrupt = |reason: String| CompressifyError::CorruptJobRecord {
        job_id: job_id.to_string(),
        path: path.to_path_buf(),
        reason,
    };

    let content = std::fs::read(path)?;
    let job: Job = serde_json::from_slice(&content).map_err(|e| corrupt(e.to_string()))?;
    if job.id != job_id {
        return Err(corrupt(format!("record carries id {}", job.id)));
    }
    job.check_consistency().map_err(corrupt)?;
    Ok(job)
}

fn record_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
            files.push(path);
        }
    }
    Ok(files)
}

fn remove_if_present(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
