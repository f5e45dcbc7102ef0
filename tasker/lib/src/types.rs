//! Core data types for the tasker system.

use std::fmt;

use serde::de::{self, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::split;

/// Whether a task runs a single command or a chain of sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// A single shell command.
    Normal,
    /// Several sub-commands joined by `&&`, run in order.
    Aggregate,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Normal => f.write_str("normal"),
            TaskKind::Aggregate => f.write_str("aggregate"),
        }
    }
}

/// The execution status of a task run.
///
/// Status is never persisted; it only exists as the last value delivered to
/// an [`EventSink`](crate::EventSink).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum TaskStatus {
    /// Task has been admitted and is about to start.
    #[default]
    Waiting,
    /// Task is currently running.
    Running,
    /// Every sub-command exited with code 0.
    Completed,
    /// A sub-command exited non-zero, could not be spawned, or the runner
    /// faulted.
    Failed {
        /// The exit code that failed the task. `None` when the runner
        /// faulted before an exit code was available.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

impl TaskStatus {
    /// Returns true for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed { .. })
    }

    /// Returns true if the task has failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, TaskStatus::Failed { .. })
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Waiting => f.write_str("waiting"),
            TaskStatus::Running => f.write_str("running"),
            TaskStatus::Completed => f.write_str("completed"),
            TaskStatus::Failed {
                exit_code: Some(code),
            } => write!(f, "failed (exit code {code})"),
            TaskStatus::Failed { exit_code: None } => f.write_str("failed"),
        }
    }
}

/// A named shell command definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique name of the task.
    ///
    /// In a task file the map key is authoritative; the inner field may be
    /// omitted.
    #[serde(default)]
    pub name: String,
    /// The command line to run. May contain `&&`-joined sub-commands.
    pub command: String,
    /// Marked by the user as frequently used.
    #[serde(default)]
    pub frequent: bool,
}

impl Task {
    /// Creates a task that is not marked frequent.
    ///
    /// ## Examples
    ///
    /// ```
    /// use tasker_lib::{Task, TaskKind};
    ///
    /// let task = Task::new("build", "cargo build && cargo test");
    /// assert_eq!(task.kind(), TaskKind::Aggregate);
    /// assert!(!task.frequent);
    /// ```
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            frequent: false,
        }
    }

    /// Returns whether this task is a simple or aggregate command.
    pub fn kind(&self) -> TaskKind {
        split::task_kind(&self.command)
    }
}

/// An ordered collection of tasks, unique by name.
///
/// Serializes as a JSON object keyed by task name. Entry order is the
/// user's display order and survives a save/load round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskBook {
    tasks: Vec<Task>,
}

impl TaskBook {
    /// Creates an empty book.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Task names in book order.
    pub fn names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Appends a task. Returns false, leaving the book unchanged, if the
    /// name is taken.
    pub fn insert(&mut self, task: Task) -> bool {
        if self.contains(&task.name) {
            return false;
        }
        self.tasks.push(task);
        true
    }

    /// Replaces the task with the same name in place.
    pub fn update(&mut self, task: Task) -> bool {
        match self.position(&task.name) {
            Some(idx) => {
                self.tasks[idx] = task;
                true
            }
            None => false,
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Task> {
        self.position(name).map(|idx| self.tasks.remove(idx))
    }

    /// Swaps a task with its predecessor.
    pub fn move_up(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) if idx > 0 => {
                self.tasks.swap(idx, idx - 1);
                true
            }
            _ => false,
        }
    }

    /// Swaps a task with its successor.
    pub fn move_down(&mut self, name: &str) -> bool {
        match self.position(name) {
            Some(idx) if idx + 1 < self.tasks.len() => {
                self.tasks.swap(idx, idx + 1);
                true
            }
            _ => false,
        }
    }

    pub fn set_frequent(&mut self, name: &str, frequent: bool) -> bool {
        match self.tasks.iter_mut().find(|t| t.name == name) {
            Some(task) => {
                task.frequent = frequent;
                true
            }
            None => false,
        }
    }

    /// Tasks marked frequent, in book order.
    pub fn filter_frequent(&self) -> Vec<&Task> {
        self.tasks.iter().filter(|t| t.frequent).collect()
    }

    /// Tasks whose name contains `term`, ignoring case.
    pub fn search(&self, term: &str) -> Vec<&Task> {
        let needle = term.to_lowercase();
        self.tasks
            .iter()
            .filter(|t| t.name.to_lowercase().contains(&needle))
            .collect()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.name == name)
    }
}

impl FromIterator<Task> for TaskBook {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        let mut book = TaskBook::new();
        for task in iter {
            if !book.update(task.clone()) {
                book.insert(task);
            }
        }
        book
    }
}

impl Serialize for TaskBook {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.tasks.iter().map(|t| (&t.name, t)))
    }
}

impl<'de> Deserialize<'de> for TaskBook {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TaskBookVisitor)
    }
}

struct TaskBookVisitor;

impl<'de> Visitor<'de> for TaskBookVisitor {
    type Value = TaskBook;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of task names to tasks")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<TaskBook, A::Error> {
        let mut book = TaskBook::new();
        while let Some((name, mut task)) = access.next_entry::<String, Task>()? {
            task.name = name;
            if book.contains(&task.name) {
                return Err(de::Error::custom(format!(
                    "duplicate task name '{}'",
                    task.name
                )));
            }
            book.insert(task);
        }
        Ok(book)
    }
}
