//! FIFO batch queue drained by a single worker.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::{debug, warn};

use crate::executor::{EventSink, TaskExecutor};
use crate::store::TaskStore;
use crate::types::TaskStatus;

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<String>,
    /// A drain worker is active.
    draining: bool,
    /// Sleep between items. Set by the most recent enqueue.
    pause_between: bool,
}

/// Task names waiting for sequential execution.
///
/// Entries are names, not snapshots: each task is looked up again when its
/// turn comes. At most one drain worker consumes the queue at a time.
#[derive(Debug, Default)]
pub struct BatchQueue {
    state: Mutex<QueueState>,
}

impl BatchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends every name found in `store`.
    ///
    /// Unknown names are logged through `sink` and skipped. Returns true
    /// when the caller must start the drain worker: the queue is non-empty
    /// and no worker is active. The active flag is set before returning, so
    /// only one caller ever gets `true` for the same drain.
    pub fn enqueue_all<S: AsRef<str>>(
        &self,
        names: &[S],
        pause_between: bool,
        store: &dyn TaskStore,
        sink: &dyn EventSink,
    ) -> bool {
        let mut accepted = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            match store.get(name) {
                Ok(Some(_)) => accepted.push(name.to_string()),
                Ok(None) => sink.on_log(&format!("task '{name}' does not exist")),
                Err(e) => {
                    warn!(task = name, error = %e, "store lookup failed");
                    sink.on_log(&format!("failed to look up task '{name}': {e}"));
                }
            }
        }

        let mut state = self.lock();
        state.pause_between = pause_between;
        state.pending.extend(accepted);
        if state.draining || state.pending.is_empty() {
            return false;
        }
        state.draining = true;
        true
    }

    /// Runs queued tasks one after another until the queue is empty.
    ///
    /// Each task runs in its own spawned task, so a panic while executing
    /// one item fails that item and the drain moves on. If the drain itself
    /// unwinds, the worker flag is cleared and the next enqueue starts a
    /// fresh worker for whatever is still pending.
    ///
    /// Must only be called by the caller that got `true` from
    /// [`enqueue_all`](Self::enqueue_all).
    pub async fn drain(
        &self,
        executor: &Arc<TaskExecutor>,
        store: &dyn TaskStore,
        pause: Duration,
    ) {
        let mut worker = DrainGuard {
            queue: self,
            armed: true,
        };
        let sink = executor.sink();
        while let Some(name) = self.pop_next() {
            let task = match store.get(&name) {
                Ok(Some(task)) => task,
                Ok(None) => {
                    sink.on_log(&format!("task '{name}' does not exist"));
                    continue;
                }
                Err(e) => {
                    warn!(task = %name, error = %e, "store lookup failed");
                    sink.on_log(&format!("failed to look up task '{name}': {e}"));
                    continue;
                }
            };

            let item = Arc::clone(executor);
            if let Err(e) = tokio::spawn(async move { item.execute(&task).await }).await {
                warn!(task = %name, error = %e, "batch item aborted");
                sink.on_log(&format!("task '{name}' errored: {e}"));
                sink.on_status(&name, TaskStatus::Failed { exit_code: None });
            }

            if self.should_pause() {
                sink.on_log(&format!(
                    "pausing {} seconds before next task",
                    pause.as_secs_f64()
                ));
                debug!(?pause, "batch pause");
                tokio::time::sleep(pause).await;
            }
        }
        // pop_next already cleared the flag under the lock.
        worker.armed = false;
        debug!("batch drained");
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    /// Returns true while a drain worker is active.
    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    /// Pops the head, or marks the worker finished when the queue is empty.
    fn pop_next(&self) -> Option<String> {
        let mut state = self.lock();
        let next = state.pending.pop_front();
        if next.is_none() {
            state.draining = false;
        }
        next
    }

    fn should_pause(&self) -> bool {
        let state = self.lock();
        state.pause_between && !state.pending.is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears the worker flag when a drain exits without emptying the queue.
struct DrainGuard<'a> {
    queue: &'a BatchQueue,
    armed: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.queue.lock().draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TaskEvent;
    use crate::store::MemoryStore;
    use crate::types::Task;
    use tokio::sync::mpsc;

    fn store() -> MemoryStore {
        [Task::new("a", "true"), Task::new("b", "true")]
            .into_iter()
            .collect()
    }

    #[test]
    fn unknown_names_are_logged_and_skipped() {
        let queue = BatchQueue::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let start = queue.enqueue_all(&["missing"], false, &store(), &tx);
        assert!(!start);
        assert!(queue.is_empty());
        assert!(!queue.is_draining());
        assert_eq!(
            rx.try_recv().unwrap(),
            TaskEvent::Log {
                line: "task 'missing' does not exist".to_string()
            }
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn only_first_enqueue_starts_a_worker() {
        let queue = BatchQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = store();

        assert!(queue.enqueue_all(&["a"], false, &store, &tx));
        assert!(queue.is_draining());
        assert!(!queue.enqueue_all(&["b", "a"], false, &store, &tx));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn pop_next_is_fifo_and_clears_worker_flag() {
        let queue = BatchQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = store();
        queue.enqueue_all(&["b", "a"], false, &store, &tx);

        assert_eq!(queue.pop_next().as_deref(), Some("b"));
        assert_eq!(queue.pop_next().as_deref(), Some("a"));
        assert!(queue.is_draining());
        assert_eq!(queue.pop_next(), None);
        assert!(!queue.is_draining());

        assert!(queue.enqueue_all(&["a"], false, &store, &tx));
    }

    #[test]
    fn unwound_drain_releases_worker_flag() {
        let queue = BatchQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = store();
        assert!(queue.enqueue_all(&["a", "b"], false, &store, &tx));
        assert_eq!(queue.pop_next().as_deref(), Some("a"));

        drop(DrainGuard {
            queue: &queue,
            armed: true,
        });
        assert!(!queue.is_draining());
        assert_eq!(queue.len(), 1);

        // The leftover item is picked up by the next worker.
        assert!(queue.enqueue_all(&["a"], false, &store, &tx));
        assert_eq!(queue.pop_next().as_deref(), Some("b"));
    }

    #[test]
    fn disarmed_guard_leaves_flag_alone() {
        let queue = BatchQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(queue.enqueue_all(&["a"], false, &store(), &tx));

        drop(DrainGuard {
            queue: &queue,
            armed: false,
        });
        assert!(queue.is_draining());
    }

    #[test]
    fn latest_enqueue_sets_pause_flag() {
        let queue = BatchQueue::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let store = store();
        queue.enqueue_all(&["a", "b"], true, &store, &tx);
        assert!(queue.should_pause());
        queue.enqueue_all(&["a"], false, &store, &tx);
        assert!(!queue.should_pause());
    }
}
