use chrono::Utc;
use indicatif::ProgressBar;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::model::{FileTask, Job, JobOptions, JobStatus, RECORD_VERSION, TaskStatus};
use super::store::{JobStore, RecordLocation};
use super::summary::{JobResult, JobSummary};
use crate::error::{Result, CompressifyError};
use crate::media::{
    destination_path, discover_files, input_root, CompressionInvoker, CompressionRequest, MediaKind,
};
use crate::profile::ProfileParams;

/// In-process pause flag, set from a signal handler or a test
#[derive(Debug, Clone, Default)]
pub struct PauseHandle(Arc<AtomicBool>);

impl PauseHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owns the lifecycle of compression jobs
pub struct JobManager {
    store: Arc<JobStore>,
    invoker: Arc<dyn CompressionInvoker>,
    workers: usize,
    keep_completed: bool,
    pause: PauseHandle,
    progress: ProgressBar,
}

/// State shared by the workers of one `run_job` call
struct RunContext {
    job: Mutex<Job>,
    store: Arc<JobStore>,
    invoker: Arc<dyn CompressionInvoker>,
    pause: PauseHandle,
    /// Set when a worker hits a fatal error so the others stop too
    abort: AtomicBool,
    progress: ProgressBar,
}

impl JobManager {
    pub fn new(store: JobStore, invoker: Arc<dyn CompressionInvoker>) -> Self {
        Self {
            store: Arc::new(store),
            invoker,
            workers: 1,
            keep_completed: false,
            pause: PauseHandle::default(),
            progress: ProgressBar::hidden(),
        }
    }

    /// Number of files compressed concurrently
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Keep every completed record active instead of archiving it
    pub fn with_keep_completed(mut self, keep: bool) -> Self {
        self.keep_completed = keep;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn pause_handle(&self) -> PauseHandle {
        self.pause.clone()
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Discover eligible files and persist a new job with every task QUEUED
    pub fn create_job(
        &self,
        input: &Path,
        output: &Path,
        params: ProfileParams,
        options: JobOptions,
    ) -> Result<Job> {
        params.validate()?;

        if !input.exists() {
            return Err(CompressifyError::InvalidInput(format!(
                "Input path does not exist: {}",
                input.display()
            )));
        }
        if output.exists() && !output.is_dir() {
            return Err(CompressifyError::InvalidInput(format!(
                "Output path is not a directory: {}",
                output.display()
            )));
        }

        let files = discover_files(input, options.kind_filter)?;
        if files.is_empty() {
            return Err(CompressifyError::InvalidInput(format!(
                "No supported media files found in {}",
                input.display()
            )));
        }

        let root = input_root(input);
        let destinations = plan_destinations(
            &root,
            output,
            &params,
            files.iter().map(|f| (f.relative.as_path(), f.kind)),
        )?;
        let tasks = files
            .iter()
            .zip(destinations)
            .map(|(file, destination)| FileTask::queued(file.relative.clone(), destination, file.kind))
            .collect();

        std::fs::create_dir_all(output).map_err(|e| {
            CompressifyError::InvalidInput(format!(
                "Cannot create output directory {}: {}",
                output.display(),
                e
            ))
        })?;

        let created_at = Utc::now();
        let job = Job {
            version: RECORD_VERSION,
            id: Job::generate_id(created_at),
            input_path: input.to_path_buf(),
            input_root: root,
            output_root: output.to_path_buf(),
            params,
            params_revision: 0,
            kind_filter: options.kind_filter,
            overwrite: options.overwrite,
            keep_record: options.keep_record,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            finished_at: None,
            tasks,
        };

        self.store.save(&job)?;
        info!(
            "Created job {} with {} files from {} (profile {})",
            job.id,
            job.tasks.len(),
            input.display(),
            job.params.profile_name
        );
        Ok(job)
    }

    /// Process every QUEUED task. Per-file failures are recorded on the task;
    /// only persistence failures abort the run.
    pub async fn run_job(&self, job: &mut Job) -> Result<JobResult> {
        let counts = job.counts();
        if counts.queued == 0 && counts.in_progress == 0 {
            debug!("Job {} has no queued work", job.id);
            return Ok(job.result());
        }
        if counts.in_progress > 0 {
            // Only resume_job clears stale IN_PROGRESS tasks
            warn!(
                "Job {} has {} in-progress tasks from an earlier run; resume it to retry them",
                job.id, counts.in_progress
            );
        }

        job.status = JobStatus::Running;
        job.started_at.get_or_insert_with(Utc::now);
        job.finished_at = None;
        persist(&self.store, job).await?;
        info!("Running job {} ({} files queued)", job.id, counts.queued);

        self.progress.set_length(job.tasks.len() as u64);
        self.progress
            .set_position(job.tasks.iter().filter(|t| t.status.is_terminal()).count() as u64);

        let ctx = Arc::new(RunContext {
            job: Mutex::new(job.clone()),
            store: Arc::clone(&self.store),
            invoker: Arc::clone(&self.invoker),
            pause: self.pause.clone(),
            abort: AtomicBool::new(false),
            progress: self.progress.clone(),
        });

        let mut workers = JoinSet::new();
        for worker_id in 0..self.workers.min(counts.queued) {
            workers.spawn(worker_loop(Arc::clone(&ctx), worker_id));
        }

        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(|e| {
                CompressifyError::ExternalTool(format!("Worker for job {} panicked: {}", job.id, e))
            });
            if let Err(e) = outcome.and_then(|r| r) {
                error!("Job {} worker stopped: {}", job.id, e);
                ctx.abort.store(true, Ordering::SeqCst);
                first_error.get_or_insert(e);
            }
        }

        self.progress.finish_and_clear();
        *job = ctx.job.lock().await.clone();
        if let Some(e) = first_error {
            return Err(e);
        }

        let counts = job.counts();
        job.status = if job.has_pending_work() {
            JobStatus::Paused
        } else if counts.error == job.tasks.len() {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        };
        if job.status != JobStatus::Paused {
            job.finished_at = Some(Utc::now());
        }
        persist(&self.store, job).await?;

        let result = job.result();
        match job.status {
            JobStatus::Paused => info!(
                "Job {} paused with {} files remaining; resume with its id",
                job.id, result.remaining
            ),
            JobStatus::Failed => error!("Job {} failed: all {} files errored", job.id, result.errors),
            _ => info!(
                "Job {} completed: {} done, {} skipped, {} errors",
                job.id, result.done, result.skipped, result.errors
            ),
        }

        let retain = job.keep_record || self.keep_completed;
        if job.status == JobStatus::Completed && result.errors == 0 && !retain {
            self.store.archive(job)?;
        }

        Ok(result)
    }

    /// Ask the job to stop after its in-flight files finish. Works across
    /// processes; the running job checks for the request between files.
    pub fn pause_job(&self, job_id: &str) -> Result<()> {
        let (mut job, location) = self.store.load(job_id)?;
        if location == RecordLocation::Archived {
            return Err(CompressifyError::InvalidInput(format!(
                "Job {} is already completed",
                job_id
            )));
        }

        match job.status {
            JobStatus::Running => {
                self.store.request_pause(job_id)?;
                info!("Pause requested for running job {}", job_id);
            }
            JobStatus::Pending => {
                job.status = JobStatus::Paused;
                self.store.save(&job)?;
                info!("Job {} paused before it started", job_id);
            }
            JobStatus::Paused => info!("Job {} is already paused", job_id),
            JobStatus::Completed | JobStatus::Failed => {
                return Err(CompressifyError::InvalidInput(format!(
                    "Job {} is {} and cannot be paused",
                    job_id, job.status
                )));
            }
        }
        Ok(())
    }

    /// Reload a job for another run, requeueing interrupted and failed tasks.
    /// `params` is the caller's current profile; it must match the frozen one
    /// unless `force` is set, in which case it replaces it.
    pub fn resume_job(
        &self,
        job_id: &str,
        params: Option<&ProfileParams>,
        force: bool,
    ) -> Result<Job> {
        let (mut job, location) = self.store.load(job_id)?;

        if let Some(requested) = params {
            let diffs = job.params.differences(requested);
            if !diffs.is_empty() {
                if !force {
                    return Err(CompressifyError::ProfileMismatch {
                        job_id: job.id.clone(),
                        detail: diffs.join("; "),
                    });
                }
                requested.validate()?;
                let destinations = plan_destinations(
                    &job.input_root,
                    &job.output_root,
                    requested,
                    job.tasks.iter().map(|t| (t.source.as_path(), t.kind)),
                )?;
                warn!("Forcing new parameters onto job {}: {}", job.id, diffs.join("; "));
                job.params = requested.clone();
                job.params_revision += 1;

                // Finished files keep the output they were written to
                for (task, destination) in job.tasks.iter_mut().zip(destinations) {
                    if task.status != TaskStatus::Done && task.status != TaskStatus::Skipped {
                        task.destination = destination;
                    }
                }
            }
        }

        let mut requeued = 0;
        for task in &mut job.tasks {
            if task.requeue() {
                requeued += 1;
            }
        }
        if requeued > 0 {
            info!("Requeued {} interrupted or failed files in job {}", requeued, job.id);
        }

        self.pause.clear();
        if location == RecordLocation::Archived && !job.has_pending_work() {
            // Nothing left to do and nothing to write back
            return Ok(job);
        }

        if job.has_pending_work() {
            job.status = JobStatus::Paused;
            job.finished_at = None;
        }
        self.store.clear_pause(&job.id)?;
        self.store.save(&job)?;
        Ok(job)
    }

    /// Job summaries, newest first
    pub fn list_jobs(
        &self,
        include_archived: bool,
    ) -> Result<impl Iterator<Item = Result<JobSummary>> + use<>> {
        self.store.list(include_archived)
    }

    pub fn get_job(&self, job_id: &str) -> Result<Job> {
        Ok(self.store.load(job_id)?.0)
    }

    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        self.store.delete(job_id)
    }

    pub fn clean_archive(&self) -> Result<u64> {
        self.store.clean_archive()
    }
}

/// Destination for every `(source, kind)` pair, in order. Fails when two
/// sources map to the same output or an output would replace its own source.
fn plan_destinations<'a>(
    input_root: &Path,
    output_root: &Path,
    params: &ProfileParams,
    sources: impl Iterator<Item = (&'a Path, MediaKind)>,
) -> Result<Vec<PathBuf>> {
    let mut claimed: HashMap<PathBuf, &'a Path> = HashMap::new();
    let mut destinations = Vec::new();

    for (source, kind) in sources {
        let destination = destination_path(output_root, source, kind, params);
        if destination == input_root.join(source) {
            return Err(CompressifyError::InvalidInput(format!(
                "Output for {} would overwrite its source; choose another output directory or format",
                source.display()
            )));
        }
        if let Some(first) = claimed.insert(destination.clone(), source) {
            return Err(CompressifyError::InvalidInput(format!(
                "{} and {} would both be written to {}; rename one or compress them in separate jobs",
                first.display(),
                source.display(),
                destination.display()
            )));
        }
        destinations.push(destination);
    }
    Ok(destinations)
}

/// Save a snapshot of the record on the blocking pool. Callers hold the job
/// mutex across the await so writes land in transition order.
async fn persist(store: &Arc<JobStore>, job: &Job) -> Result<()> {
    let store = Arc::clone(store);
    let snapshot = job.clone();
    tokio::task::spawn_blocking(move || store.save(&snapshot))
        .await
        .map_err(std::io::Error::from)?
}

async fn worker_loop(ctx: Arc<RunContext>, worker_id: usize) -> Result<()> {
    loop {
        let (index, request) = {
            let mut guard = ctx.job.lock().await;
            let job: &mut Job = &mut guard;

            if ctx.abort.load(Ordering::SeqCst) {
                return Ok(());
            }
            if ctx.pause.is_requested() || ctx.store.pause_requested(&job.id).await {
                debug!("Worker {} stopping for pause of job {}", worker_id, job.id);
                return Ok(());
            }
            let Some(index) = job.next_queued() else {
                return Ok(());
            };

            let exists = tokio::fs::try_exists(&job.tasks[index].destination)
                .await
                .unwrap_or(false);
            let task = &mut job.tasks[index];
            if !job.overwrite && exists {
                info!("Skipping {}: output already exists", task.source.display());
                task.skip("output already exists");
                ctx.progress.inc(1);
                persist(&ctx.store, job).await?;
                continue;
            }

            task.start();
            let request = CompressionRequest {
                source: job.input_root.join(&task.source),
                destination: task.destination.clone(),
                kind: task.kind,
                params: job.params.clone(),
            };
            ctx.progress.set_message(task.source.display().to_string());
            persist(&ctx.store, job).await?;
            (index, request)
        };

        let started = Instant::now();
        let outcome = match tokio::fs::metadata(&request.source).await {
            Ok(meta) => ctx
                .invoker
                .compress(&request)
                .await
                .map(|out| (meta.len(), out.output_size)),
            Err(e) => Err(CompressifyError::InvalidInput(format!(
                "Cannot read {}: {}",
                request.source.display(),
                e
            ))),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut guard = ctx.job.lock().await;
        let job: &mut Job = &mut guard;
        let task = &mut job.tasks[index];
        match outcome {
            Ok((input_size, output_size)) => {
                debug!(
                    "Worker {} finished {} ({} -> {} bytes)",
                    worker_id,
                    task.source.display(),
                    input_size,
                    output_size
                );
                task.complete(input_size, output_size, elapsed_ms);
            }
            Err(e) => {
                warn!("Failed to compress {} in job {}: {}", task.source.display(), job.id, e);
                task.fail(e.to_string(), Some(elapsed_ms));
            }
        }
        ctx.progress.inc(1);
        persist(&ctx.store, job).await?;
        debug_assert_ne!(job.tasks[index].status, TaskStatus::InProgress);
    }
}
