//! Tracks which tasks are currently executing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The set of task names currently executing.
///
/// Guarantees at most one concurrent execution per name. The lock is only
/// held for the membership check, insert or remove, never while a process
/// runs.
#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    running: Mutex<HashSet<String>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `name` unless it is already present.
    ///
    /// Returns true if this call admitted the name.
    pub fn try_admit(&self, name: &str) -> bool {
        let mut running = self.lock();
        if running.contains(name) {
            return false;
        }
        running.insert(name.to_string())
    }

    /// Removes `name`. Releasing an absent name is a no-op.
    pub fn release(&self, name: &str) {
        self.lock().remove(name);
    }

    /// Admits `name` and returns a guard that releases it on drop.
    ///
    /// ## Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use tasker_lib::ExecutionRegistry;
    ///
    /// let registry = Arc::new(ExecutionRegistry::new());
    /// {
    ///     let _guard = registry.admit("build").unwrap();
    ///     assert!(registry.admit("build").is_none());
    /// }
    /// assert!(!registry.is_running("build"));
    /// ```
    pub fn admit(self: &Arc<Self>, name: &str) -> Option<RunningGuard> {
        self.try_admit(name).then(|| RunningGuard {
            registry: Arc::clone(self),
            name: name.to_string(),
        })
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.lock().contains(name)
    }

    /// Names currently running, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().iter().cloned().collect();
        names.sort();
        names
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked.
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Membership of one task name in an [`ExecutionRegistry`].
///
/// Dropping the guard releases the name, on every exit path.
#[derive(Debug)]
pub struct RunningGuard {
    registry: Arc<ExecutionRegistry>,
    name: String,
}

impl RunningGuard {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.registry.release(&self.name);
    }
}
