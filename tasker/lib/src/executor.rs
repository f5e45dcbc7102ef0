//! Task execution engine.
//!
//! A [`TaskExecutor`] runs one named task end to end: it claims the task's
//! slot in the [`ExecutionRegistry`], runs each sub-command through the
//! [`ProcessRunner`], and reports progress through an [`EventSink`].
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tasker_lib::{
//!     EngineConfig, EventSink, ExecutionRegistry, Task, TaskEvent, TaskExecutor,
//! };
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let (tx, mut rx) = mpsc::unbounded_channel::<TaskEvent>();
//! let sink: Arc<dyn EventSink> = Arc::new(tx);
//! let executor = TaskExecutor::new(
//!     Arc::new(ExecutionRegistry::new()),
//!     &EngineConfig::default(),
//!     sink,
//! );
//!
//! executor.execute(&Task::new("hello", "echo hello")).await;
//!
//! while let Ok(event) = rx.try_recv() {
//!     match event {
//!         TaskEvent::StatusChanged { name, status } => println!("{name}: {status}"),
//!         TaskEvent::Log { line } => println!("{line}"),
//!     }
//! }
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::RunnerError;
use crate::registry::ExecutionRegistry;
use crate::runner::{OutputStream, ProcessRunner};
use crate::split;
use crate::types::{Task, TaskStatus};

/// Event emitted while tasks run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// A task's status has changed.
    StatusChanged {
        /// The name of the task.
        name: String,
        /// The new status of the task.
        status: TaskStatus,
    },
    /// A line for the execution log.
    Log {
        /// The log line.
        line: String,
    },
}

/// Receives progress from the engine.
///
/// Implementations must be cheap and non-blocking: they are called from the
/// output reader tasks while a process runs.
pub trait EventSink: Send + Sync {
    /// A task moved to `status`.
    fn on_status(&self, name: &str, status: TaskStatus);

    /// A log-worthy event happened.
    fn on_log(&self, line: &str);

    /// A child process printed `line` on `stream`.
    ///
    /// Stdout lines are logged verbatim, stderr lines with an `error:`
    /// prefix.
    fn on_output(&self, line: &str, stream: OutputStream) {
        match stream {
            OutputStream::Stdout => self.on_log(line),
            OutputStream::Stderr => self.on_log(&format!("error: {line}")),
        }
    }
}

impl EventSink for mpsc::UnboundedSender<TaskEvent> {
    fn on_status(&self, name: &str, status: TaskStatus) {
        // Receiver gone means nobody is listening any more.
        let _ = self.send(TaskEvent::StatusChanged {
            name: name.to_string(),
            status,
        });
    }

    fn on_log(&self, line: &str) {
        let _ = self.send(TaskEvent::Log {
            line: line.to_string(),
        });
    }
}

/// Runs named tasks, one sub-command at a time.
///
/// ## Event Flow
///
/// 1. The task name is admitted into the [`ExecutionRegistry`]; if it is
///    already running only a log line is emitted
/// 2. [`TaskStatus::Waiting`] then [`TaskStatus::Running`] are emitted
/// 3. Sub-commands run in order, stopping at the first non-zero exit
/// 4. [`TaskStatus::Completed`] or [`TaskStatus::Failed`] is emitted
/// 5. The registry entry is released
pub struct TaskExecutor {
    registry: Arc<ExecutionRegistry>,
    runner: ProcessRunner,
    sink: Arc<dyn EventSink>,
}

impl TaskExecutor {
    #[must_use]
    pub fn new(
        registry: Arc<ExecutionRegistry>,
        config: &EngineConfig,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            runner: ProcessRunner::new(config.launcher.clone(), config.default_pause),
            sink,
        }
    }

    pub fn registry(&self) -> &Arc<ExecutionRegistry> {
        &self.registry
    }

    pub fn sink(&self) -> &Arc<dyn EventSink> {
        &self.sink
    }

    /// Runs `task` to completion.
    ///
    /// Returns the terminal status, or `None` when the task was already
    /// running and this call did nothing. Failures are reported through the
    /// sink and never returned as errors.
    #[tracing::instrument(skip(self, task), fields(task = %task.name))]
    pub async fn execute(&self, task: &Task) -> Option<TaskStatus> {
        let Some(_running) = self.registry.admit(&task.name) else {
            warn!("already running");
            self.sink
                .on_log(&format!("task '{}' is already running", task.name));
            return None;
        };

        self.sink.on_status(&task.name, TaskStatus::Waiting);
        self.sink.on_status(&task.name, TaskStatus::Running);
        self.sink.on_log(&format!("starting task: {}", task.name));
        self.sink
            .on_log(&format!("executing command: {}", task.command));
        info!(command = %task.command, "started");

        let status = match self.run_steps(task).await {
            Ok(0) => {
                info!("completed");
                self.sink
                    .on_log(&format!("task '{}' completed successfully", task.name));
                TaskStatus::Completed
            }
            Ok(code) => {
                info!(code, "failed");
                self.sink.on_log(&format!(
                    "task '{}' failed with exit code {code}",
                    task.name
                ));
                TaskStatus::Failed {
                    exit_code: Some(code),
                }
            }
            Err(e) => {
                warn!(error = %e, "runner fault");
                self.sink
                    .on_log(&format!("task '{}' errored: {e}", task.name));
                TaskStatus::Failed { exit_code: None }
            }
        };

        self.sink.on_status(&task.name, status.clone());
        Some(status)
    }

    /// Runs the sub-commands in order and returns the first non-zero exit
    /// code, or 0.
    async fn run_steps(&self, task: &Task) -> Result<i32, RunnerError> {
        let aggregate = split::is_aggregate(&task.command);
        for subcommand in split::split_aggregate(&task.command) {
            if aggregate {
                self.sink
                    .on_log(&format!("executing sub-command: {subcommand}"));
            }
            let code = self.runner.run(&subcommand, &self.sink).await?;
            debug!(subcommand = %subcommand, code, "sub-command finished");
            if code != 0 {
                return Ok(code);
            }
        }
        Ok(0)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn executor() -> (TaskExecutor, mpsc::UnboundedReceiver<TaskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = EngineConfig::default().with_default_pause(Duration::from_secs(1));
        let executor = TaskExecutor::new(Arc::new(ExecutionRegistry::new()), &config, Arc::new(tx));
        (executor, rx)
    }

    fn collect(rx: &mut mpsc::UnboundedReceiver<TaskEvent>) -> Vec<TaskEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn statuses(events: &[TaskEvent]) -> Vec<TaskStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::StatusChanged { status, .. } => Some(status.clone()),
                TaskEvent::Log { .. } => None,
            })
            .collect()
    }

    fn lines(events: &[TaskEvent]) -> Vec<String> {
        events
            .iter()
            .filter_map(|e| match e {
                TaskEvent::Log { line } => Some(line.clone()),
                TaskEvent::StatusChanged { .. } => None,
            })
            .collect()
    }

    #[test]
    fn task_event_debug() {
        let event = TaskEvent::StatusChanged {
            name: "build".to_string(),
            status: TaskStatus::Failed { exit_code: Some(2) },
        };
        let debug = format!("{event:?}");
        assert!(debug.contains("StatusChanged"));
        assert!(debug.contains("build"));
        assert!(debug.contains("Some(2)"));
    }

    #[test]
    fn sink_prefixes_stderr_output() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.on_output("boom", OutputStream::Stderr);
        tx.on_output("fine", OutputStream::Stdout);
        assert_eq!(lines(&collect(&mut rx)), vec!["error: boom", "fine"]);
    }

    #[tokio::test]
    async fn simple_task_completes() {
        let (executor, mut rx) = executor();
        let status = executor.execute(&Task::new("hello", "echo hello")).await;
        assert_eq!(status, Some(TaskStatus::Completed));

        let events = collect(&mut rx);
        assert_eq!(
            statuses(&events),
            vec![TaskStatus::Waiting, TaskStatus::Running, TaskStatus::Completed]
        );
        assert_eq!(
            lines(&events),
            vec![
                "starting task: hello",
                "executing command: echo hello",
                "hello",
                "task 'hello' completed successfully",
            ]
        );
        assert!(!executor.registry().is_running("hello"));
    }

    #[tokio::test]
    async fn simple_task_failure_reports_exit_code() {
        let (executor, mut rx) = executor();
        let status = executor.execute(&Task::new("bad", "exit 4")).await;
        assert_eq!(status, Some(TaskStatus::Failed { exit_code: Some(4) }));

        let events = collect(&mut rx);
        assert!(lines(&events).contains(&"task 'bad' failed with exit code 4".to_string()));
        assert_eq!(statuses(&events).last(), Some(&TaskStatus::Failed { exit_code: Some(4) }));
    }

    #[tokio::test]
    async fn aggregate_short_circuits_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("c-ran");
        let command = format!("true && exit 3 && touch {}", marker.display());

        let (executor, mut rx) = executor();
        let status = executor.execute(&Task::new("chain", command)).await;
        assert_eq!(status, Some(TaskStatus::Failed { exit_code: Some(3) }));
        assert!(!marker.exists());

        let lines = lines(&collect(&mut rx));
        assert!(lines.contains(&"executing sub-command: true".to_string()));
        assert!(lines.contains(&"executing sub-command: exit 3".to_string()));
        assert!(!lines.iter().any(|l| l.starts_with("executing sub-command: touch")));
    }

    #[tokio::test]
    async fn aggregate_with_pause_logs_in_order() {
        let (executor, mut rx) = executor();
        let status = executor
            .execute(&Task::new("build", "echo hi && pause 1 && echo bye"))
            .await;
        assert_eq!(status, Some(TaskStatus::Completed));

        let lines = lines(&collect(&mut rx));
        let hi = lines.iter().position(|l| l == "hi").unwrap();
        let pause = lines.iter().position(|l| l == "pausing for 1 second(s)").unwrap();
        let bye = lines.iter().position(|l| l == "bye").unwrap();
        assert!(hi < pause && pause < bye);
    }

    #[tokio::test]
    async fn already_running_task_is_a_no_op() {
        let (executor, mut rx) = executor();
        let _held = executor.registry().admit("busy").unwrap();

        let status = executor.execute(&Task::new("busy", "echo nope")).await;
        assert_eq!(status, None);

        let events = collect(&mut rx);
        assert_eq!(
            events,
            vec![TaskEvent::Log {
                line: "task 'busy' is already running".to_string()
            }]
        );
        assert!(executor.registry().is_running("busy"));
    }

    #[tokio::test]
    async fn spawn_failure_marks_task_failed() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let config = EngineConfig::default().with_launcher(crate::ProcessLauncher::Argv {
            program: "/nonexistent/tasker-shell".to_string(),
        });
        let executor = TaskExecutor::new(Arc::new(ExecutionRegistry::new()), &config, Arc::new(tx));

        let status = executor.execute(&Task::new("ghost", "echo hi")).await;
        assert_eq!(status, Some(TaskStatus::Failed { exit_code: Some(-1) }));

        let lines = lines(&collect(&mut rx));
        assert_eq!(lines.iter().filter(|l| l.starts_with("error: ")).count(), 1);
        assert!(!executor.registry().is_running("ghost"));
    }

    /// Panics when the child prints `boom`.
    struct ExplodingSink(mpsc::UnboundedSender<TaskEvent>);

    impl EventSink for ExplodingSink {
        fn on_status(&self, name: &str, status: TaskStatus) {
            self.0.on_status(name, status);
        }

        fn on_log(&self, line: &str) {
            self.0.on_log(line);
        }

        fn on_output(&self, line: &str, stream: OutputStream) {
            if line == "boom" {
                panic!("sink panic");
            }
            self.0.on_output(line, stream);
        }
    }

    #[tokio::test]
    async fn reader_fault_fails_without_exit_code() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let executor = TaskExecutor::new(
            Arc::new(ExecutionRegistry::new()),
            &EngineConfig::default(),
            Arc::new(ExplodingSink(tx)),
        );

        // Quoting keeps the trigger out of the command echo lines.
        let status = executor.execute(&Task::new("x", "echo bo''om")).await;
        assert_eq!(status, Some(TaskStatus::Failed { exit_code: None }));

        let events = collect(&mut rx);
        assert_eq!(
            statuses(&events),
            vec![
                TaskStatus::Waiting,
                TaskStatus::Running,
                TaskStatus::Failed { exit_code: None },
            ]
        );
        assert!(
            lines(&events)
                .iter()
                .any(|l| l.starts_with("task 'x' errored: output reader failed"))
        );
        assert!(!executor.registry().is_running("x"));
    }

    #[tokio::test]
    async fn blank_command_completes_without_running_anything() {
        let (executor, mut rx) = executor();
        let status = executor.execute(&Task::new("noop", "   ")).await;
        assert_eq!(status, Some(TaskStatus::Completed));
        assert_eq!(statuses(&collect(&mut rx)).len(), 3);
    }
}
