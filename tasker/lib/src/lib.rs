//! Tasker library: named shell tasks and the engine that runs them.
//!
//! A task is a named shell command. A command containing `&&` is an
//! aggregate: its sub-commands run in order and stop at the first failure.
//! The engine runs single tasks in the background, drains sequential
//! batches, allows at most one concurrent run per task name, and reports
//! status changes and output lines through an [`EventSink`].
//!
//! ## Core Types
//!
//! - [`Task`] - A named command definition
//! - [`TaskBook`] - An ordered, name-keyed collection of tasks
//! - [`TaskStatus`] - Status of a run (waiting, running, completed, failed)
//!
//! ## Task Execution
//!
//! - [`TaskEngine`] - Entry point: `run_one` and `run_batch`
//! - [`TaskExecutor`] - Runs one task end to end
//! - [`ProcessRunner`] - Runs one sub-command and streams its output
//! - [`ExecutionRegistry`] - Names of the tasks currently running
//! - [`BatchQueue`] - FIFO of task names drained by a single worker
//! - [`EventSink`] / [`TaskEvent`] - Progress reporting
//!
//! ## Storage
//!
//! - [`TaskStore`] - Trait for task storage backends
//! - [`JsonFileStore`] - JSON file storage with file locking
//! - [`MemoryStore`] - In-memory storage
//! - [`ExecutionLog`] - Timestamped execution log file

mod config;
mod engine;
mod error;
mod executor;
mod log_file;
mod queue;
mod registry;
mod runner;
mod split;
mod store;
mod types;

pub use config::{
    DATA_DIR_ENV, EngineConfig, data_dir, default_log_path, default_store_path,
};
pub use engine::TaskEngine;
pub use error::{LogError, RunnerError, StoreError};
pub use executor::{EventSink, TaskEvent, TaskExecutor};
pub use log_file::ExecutionLog;
pub use queue::BatchQueue;
pub use registry::{ExecutionRegistry, RunningGuard};
pub use runner::{
    DEFAULT_PAUSE_SECS, OutputStream, ProcessLauncher, ProcessRunner, SPAWN_FAILURE_EXIT_CODE,
    pause_duration, pause_seconds,
};
pub use split::{AGGREGATE_SEPARATOR, is_aggregate, join_aggregate, split_aggregate, task_kind};
pub use store::{JsonFileStore, MemoryStore, TaskStore};
pub use types::{Task, TaskBook, TaskKind, TaskStatus};
