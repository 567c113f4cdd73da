use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::media::KindFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compress a file or directory as a new resumable job
    Compress {
        /// Input file or directory
        input: PathBuf,

        /// Output directory for compressed files
        #[arg(short, long, default_value = "./compressed")]
        output: PathBuf,

        /// Compression profile name
        #[arg(short, long, default_value = "medium")]
        profile: String,

        /// Which media kinds to pick up
        #[arg(long, value_enum, default_value_t = KindArg::All)]
        kind: KindArg,

        /// Overwrite existing output files instead of skipping them
        #[arg(long)]
        overwrite: bool,

        /// Number of files to compress in parallel
        #[arg(short, long)]
        workers: Option<usize>,

        /// Keep the job record after a clean completion
        #[arg(long)]
        keep_record: bool,

        /// List what would be compressed without creating a job
        #[arg(long)]
        dry_run: bool,
    },

    /// Choose settings step by step, then compress as a new job
    Interactive {
        /// Input file or directory
        input: PathBuf,

        /// Output directory for compressed files
        #[arg(short, long, default_value = "./compressed")]
        output: PathBuf,
    },

    /// Resume a paused or interrupted job
    Resume {
        /// Job identifier
        job_id: String,

        /// Profile to check against the job's frozen parameters
        #[arg(short, long)]
        profile: Option<String>,

        /// Replace the job's parameters with --profile if they differ
        #[arg(long, requires = "profile")]
        force: bool,

        /// Number of files to compress in parallel
        #[arg(short, long)]
        workers: Option<usize>,

        /// Keep the job record after a clean completion
        #[arg(long)]
        keep_record: bool,
    },

    /// Ask a running job to stop after the files in flight finish
    Pause {
        /// Job identifier
        job_id: String,
    },

    /// Inspect and maintain job records
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Manage compression profiles
    Profiles {
        #[command(subcommand)]
        action: ProfilesAction,
    },

    /// Show ffmpeg availability and supported formats
    Info,
}

#[derive(Subcommand)]
pub enum JobsAction {
    /// List jobs, newest first
    List {
        /// Include archived (completed) jobs
        #[arg(short, long)]
        all: bool,
    },

    /// Show one job and its files
    Show {
        /// Job identifier
        job_id: String,
    },

    /// Delete a job record (output files are kept)
    Delete {
        /// Job identifier
        job_id: String,
    },

    /// Remove all archived job records
    Clean,
}

#[derive(Subcommand)]
pub enum ProfilesAction {
    /// List built-in and custom profiles
    List,

    /// Show a profile's resolved settings
    Show {
        /// Profile name
        name: String,
    },

    /// Create a custom profile by answering prompts
    Create {
        /// Profile name
        name: String,
    },

    /// Import a profile from a JSON or TOML file
    Import {
        /// Profile file
        file: PathBuf,

        /// Store it under a different name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete a custom profile
    Delete {
        /// Profile name
        name: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    All,
    Video,
    Image,
}

impl From<KindArg> for KindFilter {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::All => KindFilter::All,
            KindArg::Video => KindFilter::Video,
            KindArg::Image => KindFilter::Image,
        }
    }
}
