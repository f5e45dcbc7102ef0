//! The task engine façade: single runs and sequential batches.
//!
//! ## Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use tasker_lib::{EngineConfig, MemoryStore, Task, TaskEngine, TaskEvent};
//! use tokio::sync::mpsc;
//!
//! # async fn example() {
//! let store: MemoryStore = [Task::new("hello", "echo hello")].into_iter().collect();
//! let (tx, mut rx) = mpsc::unbounded_channel::<TaskEvent>();
//! let engine = TaskEngine::new(Arc::new(store), Arc::new(tx), EngineConfig::default());
//!
//! engine.run_one("hello").await.unwrap();
//! while let Ok(event) = rx.try_recv() {
//!     println!("{event:?}");
//! }
//! # }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::executor::{EventSink, TaskExecutor};
use crate::queue::BatchQueue;
use crate::registry::ExecutionRegistry;
use crate::store::TaskStore;

/// Runs tasks from a [`TaskStore`] and reports through an [`EventSink`].
///
/// Every method returns immediately; progress arrives through the sink. The
/// returned join handles may be awaited or dropped.
pub struct TaskEngine {
    store: Arc<dyn TaskStore>,
    executor: Arc<TaskExecutor>,
    queue: Arc<BatchQueue>,
    config: EngineConfig,
}

impl TaskEngine {
    /// Creates an engine with its own registry and batch queue.
    ///
    /// Must be called within a tokio runtime before running tasks.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>, sink: Arc<dyn EventSink>, config: EngineConfig) -> Self {
        let registry = Arc::new(ExecutionRegistry::new());
        let executor = Arc::new(TaskExecutor::new(registry, &config, sink));
        Self {
            store,
            executor,
            queue: Arc::new(BatchQueue::new()),
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.executor.registry().is_running(name)
    }

    /// Names of the tasks currently running, sorted.
    pub fn running(&self) -> Vec<String> {
        self.executor.registry().running()
    }

    /// Starts one task in the background.
    ///
    /// The task is looked up when the spawned run begins. A missing task
    /// produces a single log line; a task that is already running produces
    /// a single log line and no status changes.
    pub fn run_one(&self, name: &str) -> JoinHandle<()> {
        let name = name.to_string();
        let store = Arc::clone(&self.store);
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            match store.get(&name) {
                Ok(Some(task)) => {
                    executor.execute(&task).await;
                }
                Ok(None) => executor
                    .sink()
                    .on_log(&format!("task '{name}' does not exist")),
                Err(e) => {
                    warn!(task = %name, error = %e, "store lookup failed");
                    executor
                        .sink()
                        .on_log(&format!("failed to look up task '{name}': {e}"));
                }
            }
        })
    }

    /// Queues `names` for sequential execution.
    ///
    /// Returns the drain worker's handle if this call started one; when a
    /// batch is already draining the names join it instead.
    pub fn run_batch<S: AsRef<str>>(&self, names: &[S], pause_between: bool) -> Option<JoinHandle<()>> {
        let start = self.queue.enqueue_all(
            names,
            pause_between,
            self.store.as_ref(),
            self.executor.sink().as_ref(),
        );
        if !start {
            debug!(queued = self.queue.len(), "no new drain worker");
            return None;
        }

        let queue = Arc::clone(&self.queue);
        let executor = Arc::clone(&self.executor);
        let store = Arc::clone(&self.store);
        let pause = self.config.batch_pause;
        Some(tokio::spawn(async move {
            queue.drain(&executor, store.as_ref(), pause).await;
        }))
    }
}
