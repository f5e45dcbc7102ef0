//! Error types for the tasker library.

use thiserror::Error;

/// Errors that can occur when working with the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to read or write the task file.
    #[error("failed to access task store: {0}")]
    Io(#[from] std::io::Error),

    /// The task file is not a valid task book.
    #[error("failed to parse task store: {0}")]
    Parse(#[from] serde_json::Error),

    /// Failed to acquire a file lock.
    #[error("failed to acquire lock")]
    Lock,

    /// A task with this name already exists.
    #[error("task '{0}' already exists")]
    Duplicate(String),

    /// No task with this name exists.
    #[error("task '{0}' does not exist")]
    NotFound(String),
}

/// Faults raised while a sub-command is being supervised.
///
/// Spawn failures are not represented here: they are reported as a
/// synthetic exit code so a task simply fails.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// Waiting on the child process failed.
    #[error("failed to wait for process: {0}")]
    Wait(#[source] std::io::Error),

    /// An output reader task did not finish cleanly.
    #[error("output reader failed: {0}")]
    Reader(String),
}

/// Errors from the execution log file.
#[derive(Debug, Error)]
pub enum LogError {
    /// Failed to read or write the log file.
    #[error("failed to access execution log: {0}")]
    Io(#[from] std::io::Error),
}
