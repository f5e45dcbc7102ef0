//! Timestamped execution log file.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::config;
use crate::error::LogError;

const LOG_TITLE: &str = "=== Tasker Execution Log ===";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Append-only log of everything the engine reported.
///
/// ## Examples
///
/// ```no_run
/// use tasker_lib::ExecutionLog;
///
/// let log = ExecutionLog::open("/tmp/execution.log".into()).unwrap();
/// log.append("starting task: build").unwrap();
/// for line in log.recent(10).unwrap() {
///     println!("{line}");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ExecutionLog {
    path: PathBuf,
}

impl ExecutionLog {
    /// Opens the log at `path`, creating it with a header if missing.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file or its directory cannot be created.
    pub fn open(path: PathBuf) -> Result<Self, LogError> {
        let log = Self { path };
        if !log.path.exists() {
            log.write_header("Created")?;
        }
        Ok(log)
    }

    /// Opens the log at the default path (`<data dir>/execution.log`).
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be created.
    pub fn open_default() -> Result<Self, LogError> {
        Self::open(config::default_log_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `[YYYY-MM-DD HH:MM:SS] message`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn append(&self, message: &str) -> Result<(), LogError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "[{}] {message}", timestamp())?;
        Ok(())
    }

    /// Returns up to the last `lines` lines of the file.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn recent(&self, lines: usize) -> Result<Vec<String>, LogError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let all = reader.lines().collect::<Result<Vec<_>, _>>()?;
        let skip = all.len().saturating_sub(lines);
        Ok(all.into_iter().skip(skip).collect())
    }

    /// Discards every entry, leaving a fresh header.
    ///
    /// ## Errors
    ///
    /// Returns an error if the file cannot be rewritten.
    pub fn clear(&self) -> Result<(), LogError> {
        self.write_header("Cleared")
    }

    fn write_header(&self, label: &str) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&self.path)?;
        writeln!(file, "{LOG_TITLE}\n{label}: {}\n", timestamp())?;
        Ok(())
    }
}

fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}
