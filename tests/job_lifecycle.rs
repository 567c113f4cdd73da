use assert_fs::prelude::*;
use assert_fs::TempDir;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio_test::{assert_err, assert_ok};

use compressify::error::{CompressifyError, Result};
use compressify::job::{JobManager, JobOptions, JobStatus, JobStore, RecordLocation, TaskStatus};
use compressify::media::{CompressionInvoker, CompressionOutcome, CompressionRequest};
use compressify::profile::{builtin_profile, ProfileParams};

type Hook = Box<dyn FnOnce() + Send>;

/// Writes a small output for every request and counts calls per file name
#[derive(Default)]
struct ScriptedInvoker {
    calls: Mutex<HashMap<String, usize>>,
    failing: Mutex<HashSet<String>>,
    on_first_call: Mutex<Option<Hook>>,
}

impl ScriptedInvoker {
    fn failing(names: &[&str]) -> Self {
        let invoker = Self::default();
        invoker
            .failing
            .lock()
            .unwrap()
            .extend(names.iter().map(|n| n.to_string()));
        invoker
    }

    fn on_first_call(&self, hook: impl FnOnce() + Send + 'static) {
        *self.on_first_call.lock().unwrap() = Some(Box::new(hook));
    }

    fn heal(&self, name: &str) {
        self.failing.lock().unwrap().remove(name);
    }

    fn calls(&self, name: &str) -> usize {
        self.calls.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl CompressionInvoker for ScriptedInvoker {
    async fn compress(&self, request: &CompressionRequest) -> Result<CompressionOutcome> {
        let name = request
            .source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        *self.calls.lock().unwrap().entry(name.clone()).or_default() += 1;

        let hook = self.on_first_call.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }

        if self.failing.lock().unwrap().contains(&name) {
            return Err(CompressifyError::ExternalTool(format!(
                "{}: Invalid data found when processing input",
                name
            )));
        }

        if let Some(parent) = request.destination.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&request.destination, vec![1u8; 100])?;
        Ok(CompressionOutcome {
            output_path: request.destination.clone(),
            output_size: 100,
        })
    }

    fn check_availability(&self) -> Result<()> {
        Ok(())
    }

    async fn get_version_info(&self) -> Result<String> {
        Ok("scripted".to_string())
    }
}

fn params(name: &str) -> ProfileParams {
    builtin_profile(name).unwrap().resolve().unwrap()
}

fn media_tree(names: &[&str]) -> TempDir {
    let temp = TempDir::new().unwrap();
    for name in names {
        temp.child(name).write_binary(&[0u8; 1000]).unwrap();
    }
    temp
}

fn manager(jobs: &Path, invoker: &Arc<ScriptedInvoker>) -> JobManager {
    JobManager::new(JobStore::new(jobs), invoker.clone())
}

fn keep_record() -> JobOptions {
    JobOptions {
        keep_record: true,
        ..JobOptions::default()
    }
}

#[tokio::test]
async fn second_run_of_a_finished_job_changes_nothing() {
    let input = media_tree(&["a.jpg", "b.jpg", "c.jpg"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker);

    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), keep_record()));
    let first = assert_ok!(manager.run_job(&mut job).await);
    assert_eq!(first.status, JobStatus::Completed);
    assert_eq!(invoker.total_calls(), 3);

    let record = manager.store().record_path(&job.id);
    let before = std::fs::read(&record).unwrap();

    let second = assert_ok!(manager.run_job(&mut job).await);
    assert_eq!(invoker.total_calls(), 3);
    assert_eq!(second, first);
    assert_eq!(std::fs::read(&record).unwrap(), before);
}

#[tokio::test]
async fn resume_after_crash_only_redoes_unfinished_files() {
    let input = media_tree(&["1.png", "2.png", "3.png", "4.png", "5.png"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker);

    // Simulate a process that died while compressing the third file
    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));
    job.status = JobStatus::Running;
    for task in job.tasks.iter_mut().take(2) {
        task.start();
        task.complete(1000, 100, 5);
    }
    job.tasks[2].start();
    assert_ok!(manager.store().save(&job));

    let mut resumed = assert_ok!(manager.resume_job(&job.id, None, false));
    assert_eq!(resumed.tasks[2].status, TaskStatus::Queued);
    assert_eq!(resumed.status, JobStatus::Paused);

    let result = assert_ok!(manager.run_job(&mut resumed).await);
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.done, 5);
    assert_eq!(invoker.total_calls(), 3);
    assert_eq!(invoker.calls("1.png"), 0);
    assert_eq!(invoker.calls("2.png"), 0);
    assert_eq!(invoker.calls("3.png"), 1);
}

#[tokio::test]
async fn truncated_record_is_reported_as_corrupt() {
    let input = media_tree(&["a.mp4"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker);

    let job = assert_ok!(manager.create_job(input.path(), output.path(), params("low"), JobOptions::default()));
    let record = manager.store().record_path(&job.id);
    let content = std::fs::read(&record).unwrap();
    std::fs::write(&record, &content[..content.len() - 20]).unwrap();

    let err = assert_err!(manager.resume_job(&job.id, None, false));
    match err {
        CompressifyError::CorruptJobRecord { job_id, path, .. } => {
            assert_eq!(job_id, job.id);
            assert_eq!(path, record);
        }
        other => panic!("expected a corrupt record error, got {}", other),
    }
    assert_eq!(invoker.total_calls(), 0);
}

#[tokio::test]
async fn empty_input_creates_no_job() {
    let input = TempDir::new().unwrap();
    input.child("notes.txt").write_str("not media").unwrap();
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker);

    let err = assert_err!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));
    assert!(matches!(err, CompressifyError::InvalidInput(_)));
    assert_eq!(assert_ok!(manager.list_jobs(true)).count(), 0);
}

#[tokio::test]
async fn one_unreadable_file_does_not_stop_the_batch() {
    let input = media_tree(&["a.png", "b.png", "broken.png", "c.png", "d.png"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::failing(&["broken.png"]));
    let manager = manager(jobs.path(), &invoker);

    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));
    let result = assert_ok!(manager.run_job(&mut job).await);

    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!((result.done, result.errors), (4, 1));
    assert!(output.child("a.jpg").path().is_file());
    assert!(!output.child("broken.jpg").path().exists());

    let stored = assert_ok!(manager.get_job(&job.id));
    let broken = stored.tasks.iter().find(|t| t.source.ends_with("broken.png")).unwrap();
    assert_eq!(broken.status, TaskStatus::Error);
    assert!(broken.error.as_deref().unwrap().contains("broken.png"));
}

#[tokio::test]
async fn in_process_pause_stops_at_file_boundary_and_resume_finishes() {
    let input = media_tree(&["1.jpg", "2.jpg", "3.jpg"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker);

    let pause = manager.pause_handle();
    invoker.on_first_call(move || pause.request());

    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));
    let paused = assert_ok!(manager.run_job(&mut job).await);
    assert_eq!(paused.status, JobStatus::Paused);
    assert_eq!((paused.done, paused.remaining), (1, 2));
    assert_eq!(assert_ok!(manager.get_job(&job.id)).status, JobStatus::Paused);

    let mut resumed = assert_ok!(manager.resume_job(&job.id, None, false));
    let finished = assert_ok!(manager.run_job(&mut resumed).await);
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.done, 3);
    for name in ["1.jpg", "2.jpg", "3.jpg"] {
        assert_eq!(invoker.calls(name), 1, "{} compressed more than once", name);
    }
}

#[tokio::test]
async fn pause_from_another_process_is_honored() {
    let input = media_tree(&["a.mkv", "b.mkv", "c.mkv"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker);

    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));

    // A second manager over the same record directory stands in for another process
    let jobs_dir = jobs.path().to_path_buf();
    let job_id = job.id.clone();
    invoker.on_first_call(move || {
        let other = JobManager::new(JobStore::new(&jobs_dir), Arc::new(ScriptedInvoker::default()));
        other.pause_job(&job_id).unwrap();
    });

    let result = assert_ok!(manager.run_job(&mut job).await);
    assert_eq!(result.status, JobStatus::Paused);
    assert_eq!(result.remaining, 2);
    assert!(manager.store().pause_requested(&job.id).await);

    let mut resumed = assert_ok!(manager.resume_job(&job.id, None, false));
    assert!(!manager.store().pause_requested(&job.id).await);
    let result = assert_ok!(manager.run_job(&mut resumed).await);
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(invoker.total_calls(), 3);
}

#[tokio::test]
async fn resume_retries_failed_files() {
    let input = media_tree(&["a.png", "bad.png"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::failing(&["bad.png"]));
    let manager = manager(jobs.path(), &invoker);

    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));
    let first = assert_ok!(manager.run_job(&mut job).await);
    assert_eq!(first.errors, 1);
    assert_eq!(manager.store().load(&job.id).unwrap().1, RecordLocation::Active);

    invoker.heal("bad.png");
    let mut resumed = assert_ok!(manager.resume_job(&job.id, None, false));
    let second = assert_ok!(manager.run_job(&mut resumed).await);

    assert_eq!((second.done, second.errors), (2, 0));
    assert_eq!(invoker.calls("a.png"), 1);
    assert_eq!(invoker.calls("bad.png"), 2);
    // Clean completion moves the record to the archive
    assert_eq!(manager.store().load(&job.id).unwrap().1, RecordLocation::Archived);
}

#[tokio::test]
async fn all_files_failing_fails_the_job() {
    let input = media_tree(&["a.webm", "b.webm"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::failing(&["a.webm", "b.webm"]));
    let manager = manager(jobs.path(), &invoker).with_workers(2);

    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("high"), JobOptions::default()));
    let result = assert_ok!(manager.run_job(&mut job).await);
    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.errors, 2);
    assert!(assert_ok!(manager.get_job(&job.id)).finished_at.is_some());
}

#[tokio::test]
async fn nested_directories_are_mirrored_in_the_output() {
    let input = media_tree(&["top.png", "trip/day1/beach.png", "trip/clip.mov"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker).with_workers(3);

    let mut job = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));
    assert_ok!(manager.run_job(&mut job).await);

    assert!(output.child("top.jpg").path().is_file());
    assert!(output.child("trip/day1/beach.jpg").path().is_file());
    assert!(output.child("trip/clip.mp4").path().is_file());
}

#[tokio::test]
async fn delete_and_clean_remove_records() {
    let input = media_tree(&["a.jpg"]);
    let output = TempDir::new().unwrap();
    let jobs = TempDir::new().unwrap();
    let invoker = Arc::new(ScriptedInvoker::default());
    let manager = manager(jobs.path(), &invoker);

    let pending = assert_ok!(manager.create_job(input.path(), output.path(), params("medium"), JobOptions::default()));
    assert_ok!(manager.delete_job(&pending.id));
    assert!(matches!(manager.get_job(&pending.id), Err(CompressifyError::JobNotFound(_))));

    let other_output = TempDir::new().unwrap();
    let mut done = assert_ok!(manager.create_job(input.path(), other_output.path(), params("medium"), JobOptions::default()));
    assert_ok!(manager.run_job(&mut done).await);
    assert_eq!(assert_ok!(manager.list_jobs(false)).count(), 0);
    assert_eq!(assert_ok!(manager.list_jobs(true)).count(), 1);

    assert_eq!(assert_ok!(manager.clean_archive()), 1);
    assert_eq!(assert_ok!(manager.list_jobs(true)).count(), 0);
}
