// Job management
//
// - Model: jobs, file tasks and their state machines
// - Store: durable JSON records with atomic replace
// - Manager: create/run/pause/resume/list on top of the store
// - Summary: result counts and size formatting

pub mod manager;
pub mod model;
pub mod store;
pub mod summary;

pub use manager::{JobManager, PauseHandle};
pub use model::{FileTask, Job, JobOptions, JobStatus, TaskStatus, RECORD_VERSION};
pub use store::{JobStore, RecordLocation};
pub use summary::{format_duration, format_file_size, format_task_time, format_signed_size, JobResult, JobSummary, TaskCounts};
