//! Compressify - resumable batch compression of video and image files
//!
//! Entry point for the command line tool. Jobs are created from an input
//! file or directory, persisted after every file, and can be paused and
//! resumed across process restarts.

use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use compressify::cli::{Args, Commands, JobsAction, ProfilesAction};
use compressify::config::Config;
use compressify::error::CompressifyError;
use compressify::interactive::{DialoguerPrompter, Wizard};
use compressify::job::{
    format_file_size, format_signed_size, format_task_time, Job, JobManager, JobOptions, JobResult, JobStatus, JobStore,
    RecordLocation,
};
use compressify::media::{
    discover_files, input_root, CompressionInvoker, InvokerFactory, KindFilter, IMAGE_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
use compressify::profile::{
    builtin_profile, builtin_profile_names, ImageFormat, ProfileManager, ProfileParams, VideoFormat,
};

const DEFAULT_CONFIG_FILE: &str = "compressify.toml";

const EXIT_FATAL: u8 = 1;
const EXIT_SOME_ERRORS: u8 = 2;
const EXIT_ALL_FAILED: u8 = 3;
const EXIT_PAUSED: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e.downcast_ref::<CompressifyError>().and_then(hint_for) {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config = load_config(args.config.as_deref())?;
    setup_logging(args.verbose, &config.log_dir())?;

    let profiles = ProfileManager::new(config.profiles_dir());

    match args.command {
        Commands::Compress {
            input,
            output,
            profile,
            kind,
            overwrite,
            workers,
            keep_record,
            dry_run,
        } => {
            let params = resolve_profile(&profiles, &profile)?;
            let kind_filter = KindFilter::from(kind);

            if dry_run {
                print_plan(&input, &output, &params, kind_filter)?;
                return Ok(ExitCode::SUCCESS);
            }

            let manager = build_manager(&config, workers)?;
            let options = JobOptions {
                kind_filter,
                overwrite,
                keep_record,
            };
            compress(&manager, &input, &output, params, options).await
        }
        Commands::Interactive { input, output } => {
            let wizard = Wizard::new(DialoguerPrompter::default());
            let Some(plan) = wizard.run(&input, &profiles)? else {
                println!("Cancelled; no job was created");
                return Ok(ExitCode::SUCCESS);
            };

            let params = plan.profile.resolve()?;
            let manager = build_manager(&config, Some(plan.workers))?;
            compress(&manager, &input, &output, params, plan.options).await
        }
        Commands::Resume {
            job_id,
            profile,
            force,
            workers,
            keep_record,
        } => {
            let params = profile
                .as_deref()
                .map(|name| resolve_profile(&profiles, name))
                .transpose()?;

            let manager = build_manager(&config, workers)?;
            let mut job = manager.resume_job(&job_id, params.as_ref(), force)?;
            if keep_record {
                job.keep_record = true;
            }
            if !job.has_pending_work() {
                println!("Job {} has nothing left to do", job.id);
            }

            watch_interrupt(&manager);
            let result = manager.run_job(&mut job).await?;
            print_result(&result);
            Ok(exit_code_for(&result))
        }
        Commands::Pause { job_id } => {
            let manager = build_manager(&config, None)?;
            manager.pause_job(&job_id)?;
            println!("Pause requested for job {}", job_id);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Jobs { action } => {
            let store = JobStore::new(config.jobs_dir());
            match action {
                JobsAction::List { all } => list_jobs(&store, all)?,
                JobsAction::Show { job_id } => {
                    let (job, location) = store.load(&job_id)?;
                    print_job(&job, location == RecordLocation::Archived);
                }
                JobsAction::Delete { job_id } => {
                    store.delete(&job_id)?;
                    println!("Deleted job record {}", job_id);
                }
                JobsAction::Clean => {
                    let removed = store.clean_archive()?;
                    println!("Removed {} archived job records", removed);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Profiles { action } => {
            match action {
                ProfilesAction::List => {
                    println!("\nBuilt-in Profiles:");
                    println!("{:<16} {:<60}", "Name", "Description");
                    println!("{}", "-".repeat(76));
                    for name in builtin_profile_names() {
                        let description = builtin_profile(name).map(|p| p.description).unwrap_or_default();
                        println!("{:<16} {:<60}", name, description);
                    }

                    let custom = profiles.list_custom_profiles()?;
                    if custom.is_empty() {
                        println!("\nNo custom profiles in {}", config.profiles_dir().display());
                    } else {
                        println!("\nCustom Profiles:");
                        println!("{:<16} {:<60}", "Name", "Description");
                        println!("{}", "-".repeat(76));
                        for name in custom {
                            match profiles.load_profile(&name) {
                                Ok(profile) => println!("{:<16} {:<60}", name, profile.description),
                                Err(e) => println!("{:<16} <unreadable: {}>", name, e),
                            }
                        }
                    }
                }
                ProfilesAction::Show { name } => {
                    let profile = profiles.load_profile(&name)?;
                    let params = profile.resolve()?;
                    println!("Profile: {}", profile.name);
                    if !profile.description.is_empty() {
                        println!("Description: {}", profile.description);
                    }
                    println!("{}", serde_json::to_string_pretty(&params)?);
                }
                ProfilesAction::Create { name } => {
                    let profile = Wizard::new(DialoguerPrompter::default()).create_profile(&name)?;
                    let path = profiles.save_profile(&profile)?;
                    println!("Created profile '{}' at {}", profile.name, path.display());
                }
                ProfilesAction::Import { file, name } => {
                    let imported = profiles.import_profile(&file, name.as_deref())?;
                    println!("Imported profile '{}'", imported);
                }
                ProfilesAction::Delete { name } => {
                    profiles.delete_profile(&name)?;
                    println!("Deleted profile '{}'", name);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Info => {
            let invoker = InvokerFactory::create_invoker(config.media.clone());
            match invoker.check_availability() {
                Ok(()) => {
                    let version = invoker.get_version_info().await?;
                    println!("ffmpeg: {}", version);
                }
                Err(e) => println!("ffmpeg: not available ({})", e),
            }

            let video: Vec<&str> = VideoFormat::ALL.iter().map(|f| f.extension()).collect();
            let image: Vec<&str> = ImageFormat::ALL.iter().map(|f| f.extension()).collect();
            println!("\nOutput formats:");
            println!("  video: {}", video.join(", "));
            println!("  image: {}", image.join(", "));
            println!("\nInput extensions:");
            println!("  video: {}", VIDEO_EXTENSIONS.join(", "));
            println!("  image: {}", IMAGE_EXTENSIONS.join(", "));
            println!("\nJob records: {}", config.jobs_dir().display());
            println!("Profiles: {}", config.profiles_dir().display());
            println!("Logs: {}", config.log_dir().display());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Create a job, run it with Ctrl-C pausing, and report
async fn compress(
    manager: &JobManager,
    input: &Path,
    output: &Path,
    params: ProfileParams,
    options: JobOptions,
) -> Result<ExitCode> {
    let mut job = manager.create_job(input, output, params, options)?;
    println!("Created job {} ({} files)", job.id, job.tasks.len());

    watch_interrupt(manager);
    let result = manager.run_job(&mut job).await?;
    print_result(&result);
    Ok(exit_code_for(&result))
}

/// `--config`, then `./compressify.toml`, else defaults
fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(config_path) => Config::from_file(config_path)?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => Config::from_file(DEFAULT_CONFIG_FILE)?,
        None => Config::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    let file_appender = rolling::daily(log_dir, "compressify.log");
    let (non_blocking_file, _guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(_guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!(
        "Logging initialized - console: {}, file: {}",
        log_level,
        log_dir.join("compressify.log").display()
    );
    Ok(())
}

fn resolve_profile(profiles: &ProfileManager, name: &str) -> Result<ProfileParams> {
    Ok(profiles.load_profile(name)?.resolve()?)
}

fn build_manager(config: &Config, workers: Option<usize>) -> Result<JobManager> {
    let workers = workers.unwrap_or(config.jobs.workers);
    if workers == 0 {
        return Err(CompressifyError::Config("--workers must be at least 1".to_string()).into());
    }

    let invoker: Arc<dyn CompressionInvoker> = Arc::from(InvokerFactory::create_invoker(config.media.clone()));
    Ok(JobManager::new(JobStore::new(config.jobs_dir()), invoker)
        .with_workers(workers)
        .with_keep_completed(config.jobs.keep_completed)
        .with_progress(progress_bar()?))
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// First Ctrl-C pauses at the next file boundary, a second one exits
fn watch_interrupt(manager: &JobManager) {
    let pause = manager.pause_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, pausing after the files in progress finish (Ctrl-C again to abort)");
        pause.request();

        if tokio::signal::ctrl_c().await.is_ok() {
            error!("Aborted; interrupted files will be retried on resume");
            std::process::exit(130);
        }
    });
}

fn exit_code_for(result: &JobResult) -> ExitCode {
    match result.status {
        JobStatus::Paused => ExitCode::from(EXIT_PAUSED),
        JobStatus::Failed => ExitCode::from(EXIT_ALL_FAILED),
        _ if result.errors > 0 => ExitCode::from(EXIT_SOME_ERRORS),
        _ => ExitCode::SUCCESS,
    }
}

fn hint_for(error: &CompressifyError) -> Option<&'static str> {
    match error {
        CompressifyError::JobNotFound(_) => Some("run `compressify jobs list --all` to see known jobs"),
        CompressifyError::CorruptJobRecord { .. } => {
            Some("the record cannot be trusted; delete it with `compressify jobs delete` and start a new job")
        }
        CompressifyError::ProfileMismatch { .. } => {
            Some("resume without --profile to keep the job's settings, or add --force to replace them")
        }
        _ => None,
    }
}

fn print_plan(input: &Path, output: &Path, params: &ProfileParams, filter: KindFilter) -> Result<()> {
    let files = discover_files(input, filter)?;
    if files.is_empty() {
        println!("No supported media files found in {}", input.display());
        return Ok(());
    }

    let root = input_root(input);
    println!("\nDry run with profile '{}':", params.profile_name);
    println!("{:<6} {:<10} {:<40} {:<40}", "Kind", "Size", "Source", "Destination");
    println!("{}", "-".repeat(100));

    let mut total = 0;
    for file in &files {
        let destination = file.destination(output, params);
        let exists = if destination.exists() { " (exists)" } else { "" };
        println!(
            "{:<6} {:<10} {:<40} {}{}",
            format!("{:?}", file.kind).to_lowercase(),
            format_file_size(file.size),
            file.relative.display(),
            destination.display(),
            exists
        );
        total += file.size;
    }
    println!(
        "\n{} files, {} total under {}",
        files.len(),
        format_file_size(total),
        root.display()
    );
    Ok(())
}

fn print_result(result: &JobResult) {
    println!("\nJob {} {}", result.job_id, result.status);
    println!("{:<12} {}", "Done:", result.done);
    println!("{:<12} {}", "Skipped:", result.skipped);
    println!("{:<12} {}", "Errors:", result.errors);
    if result.remaining > 0 {
        println!("{:<12} {}", "Remaining:", result.remaining);
    }
    if result.done > 0 {
        println!(
            "{:<12} {} -> {} (saved {}, {:.1}%)",
            "Size:",
            format_file_size(result.input_bytes),
            format_file_size(result.output_bytes),
            format_signed_size(result.saved_bytes()),
            result.savings_percent()
        );
    }
    match result.status {
        JobStatus::Paused => println!("\nResume with: compressify resume {}", result.job_id),
        _ if result.errors > 0 => {
            println!("\nRetry failed files with: compressify resume {}", result.job_id)
        }
        _ => {}
    }
}

fn list_jobs(store: &JobStore, include_archived: bool) -> Result<()> {
    let mut rows = store.list(include_archived)?.peekable();
    if rows.peek().is_none() {
        println!("No jobs found in {}", store.dir().display());
        return Ok(());
    }

    println!(
        "{:<30} {:<10} {:<14} {:<10} {:<7} {:<40}",
        "ID", "Status", "Profile", "Progress", "Errors", "Input"
    );
    println!("{}", "-".repeat(115));
    for row in rows {
        match row {
            Ok(summary) => {
                let status = if summary.archived {
                    format!("{}*", summary.status)
                } else {
                    summary.status.to_string()
                };
                let finished = summary.counts.done + summary.counts.skipped + summary.counts.error;
                println!(
                    "{:<30} {:<10} {:<14} {:<10} {:<7} {:<40}",
                    summary.id,
                    status,
                    summary.profile_name,
                    format!("{}/{}", finished, summary.total),
                    summary.counts.error,
                    summary.input_path.display()
                );
            }
            Err(e) => {
                warn!("Skipping unreadable job record: {}", e);
                println!("{:<30} <unreadable record>", "?");
            }
        }
    }
    if include_archived {
        println!("\n* archived");
    }
    Ok(())
}

fn print_job(job: &Job, archived: bool) {
    let result = job.result();
    println!("\nJob: {}{}", job.id, if archived { " (archived)" } else { "" });
    println!("Status: {}", job.status);
    println!("Input: {}", job.input_path.display());
    println!("Output: {}", job.output_root.display());
    println!("Profile: {} (revision {})", job.params.profile_name, job.params_revision);
    println!("Created: {}", job.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    if let Some(started) = job.started_at {
        println!("Started: {}", started.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    if let Some(finished) = job.finished_at {
        println!("Finished: {}", finished.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!(
        "Files: {} total, {} done, {} skipped, {} errors, {} remaining",
        job.tasks.len(),
        result.done,
        result.skipped,
        result.errors,
        result.remaining
    );
    if result.done > 0 {
        println!(
            "Saved: {} ({:.1}%)",
            format_signed_size(result.saved_bytes()),
            result.savings_percent()
        );
    }

    println!(
        "\n{:<12} {:<10} {:<10} {:<8} {:<50}",
        "Status", "Input", "Output", "Time", "File"
    );
    println!("{}", "-".repeat(94));
    for task in &job.tasks {
        let input = task.input_size.map(format_file_size).unwrap_or_default();
        let output = task.output_size.map(format_file_size).unwrap_or_default();
        let time = format_task_time(task.duration_ms);
        println!(
            "{:<12} {:<10} {:<10} {:<8} {:<50}",
            task.status.to_string(),
            input,
            output,
            time,
            task.source.display()
        );
        if let Some(message) = &task.error {
            println!("{:<12} {}", "", message);
        }
        if let Some(reason) = &task.skip_reason {
            println!("{:<12} {}", "", reason);
        }
    }
}
