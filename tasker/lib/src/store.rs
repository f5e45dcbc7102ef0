//! Task definition storage.
//!
//! The engine only reads tasks through [`TaskStore`]. Edits are
//! read-modify-store round trips on a [`TaskBook`] driven by the caller. The
//! primary implementation is a JSON file with file locking for concurrent
//! access safety.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use fs2::FileExt;

use crate::config;
use crate::error::StoreError;
use crate::types::{Task, TaskBook};

/// Trait for task storage backends.
///
/// Implementations must handle concurrent access safely.
pub trait TaskStore: Send + Sync {
    /// Loads every task, in display order.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading or parsing fails.
    fn load_all(&self) -> Result<TaskBook, StoreError>;

    /// Replaces the stored tasks with `book`.
    ///
    /// ## Errors
    ///
    /// Returns an error if writing fails.
    fn save_all(&self, book: &TaskBook) -> Result<(), StoreError>;

    /// Looks up one task by name.
    ///
    /// ## Errors
    ///
    /// Returns an error if reading or parsing fails.
    fn get(&self, name: &str) -> Result<Option<Task>, StoreError> {
        Ok(self.load_all()?.get(name).cloned())
    }

    /// Applies `edit` to the stored book and saves the result.
    ///
    /// ## Errors
    ///
    /// Returns an error if loading or saving fails, or whatever `edit`
    /// returns.
    fn modify<T, F>(&self, edit: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut TaskBook) -> Result<T, StoreError>,
        Self: Sized,
    {
        let mut book = self.load_all()?;
        let out = edit(&mut book)?;
        self.save_all(&book)?;
        Ok(out)
    }
}

/// JSON file task storage.
///
/// Stores the [`TaskBook`] as a pretty-printed JSON object keyed by task
/// name. Uses `fs2` for cross-platform file locking.
///
/// ## Examples
///
/// ```no_run
/// use tasker_lib::{JsonFileStore, Task, TaskBook, TaskStore};
///
/// let store = JsonFileStore::new("/tmp/tasks.json".into());
/// let mut book = TaskBook::new();
/// book.insert(Task::new("hello", "echo hello"));
/// store.save_all(&book).unwrap();
///
/// let task = store.get("hello").unwrap().unwrap();
/// assert_eq!(task.command, "echo hello");
/// ```
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Creates a new JSON file store at the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Creates a store at the default path (`<data dir>/tasks.json`).
    pub fn default_path() -> Self {
        Self::new(config::default_store_path())
    }

    /// Returns the path to the task file.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Writes the current tasks to `path`.
    ///
    /// ## Errors
    ///
    /// Returns an error if the store cannot be read or `path` written.
    pub fn export_to(&self, path: &Path) -> Result<usize, StoreError> {
        let book = self.load_all()?;
        write_book(path, &book)?;
        Ok(book.len())
    }

    /// Replaces the stored tasks with the contents of `path`.
    ///
    /// The file is fully parsed before anything is written, so a malformed
    /// import leaves the store untouched. Returns the number of tasks
    /// imported.
    ///
    /// ## Errors
    ///
    /// Returns an error if `path` cannot be read or parsed, or the store
    /// cannot be written.
    pub fn import_from(&self, path: &Path) -> Result<usize, StoreError> {
        let book: TaskBook = serde_json::from_reader(BufReader::new(File::open(path)?))?;
        self.save_all(&book)?;
        Ok(book.len())
    }

    /// Ensures the parent directory exists.
    fn ensure_parent_exists(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl TaskStore for JsonFileStore {
    fn load_all(&self) -> Result<TaskBook, StoreError> {
        if !self.path.exists() {
            return Ok(TaskBook::new());
        }

        let mut file = File::open(&self.path)?;
        file.lock_shared().map_err(|_| StoreError::Lock)?;

        let mut contents = String::new();
        let read = file.read_to_string(&mut contents);
        file.unlock().map_err(|_| StoreError::Lock)?;
        read?;

        if contents.trim().is_empty() {
            return Ok(TaskBook::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_all(&self, book: &TaskBook) -> Result<(), StoreError> {
        self.ensure_parent_exists()?;

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.path)?;

        file.lock_exclusive().map_err(|_| StoreError::Lock)?;

        let json = serde_json::to_string_pretty(book)?;
        let written = overwrite(&mut file, &json);

        file.unlock().map_err(|_| StoreError::Lock)?;
        written?;
        Ok(())
    }
}

fn overwrite(file: &mut File, json: &str) -> std::io::Result<()> {
    file.set_len(0)?;
    writeln!(file, "{json}")?;
    file.flush()
}

fn write_book(path: &Path, book: &TaskBook) -> Result<(), StoreError> {
    let json = serde_json::to_string_pretty(book)?;
    let mut file = File::create(path)?;
    writeln!(file, "{json}")?;
    Ok(())
}

/// In-memory task storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    book: Mutex<TaskBook>,
}

impl MemoryStore {
    pub fn new(book: TaskBook) -> Self {
        Self {
            book: Mutex::new(book),
        }
    }
}

impl FromIterator<Task> for MemoryStore {
    fn from_iter<I: IntoIterator<Item = Task>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl TaskStore for MemoryStore {
    fn load_all(&self) -> Result<TaskBook, StoreError> {
        Ok(self
            .book
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_all(&self, book: &TaskBook) -> Result<(), StoreError> {
        *self.book.lock().unwrap_or_else(PoisonError::into_inner) = book.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (JsonFileStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tasks.json");
        let store = JsonFileStore::new(path);
        (store, temp_dir)
    }

    fn sample_book() -> TaskBook {
        [
            Task::new("build", "cargo build"),
            Task::new("test", "cargo test"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn load_all_returns_empty_book_for_nonexistent_file() {
        let (store, _temp_dir) = create_test_store();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn load_all_treats_blank_file_as_empty() {
        let (store, _temp_dir) = create_test_store();
        std::fs::write(store.path(), "\n  \n").unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let (store, _temp_dir) = create_test_store();
        store.save_all(&sample_book()).unwrap();

        let book = store.load_all().unwrap();
        assert_eq!(book, sample_book());
        assert_eq!(store.get("test").unwrap().unwrap().command, "cargo test");
        assert!(store.get("missing").unwrap().is_none());
    }

    #[test]
    fn save_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("nested/dir/tasks.json"));
        store.save_all(&sample_book()).unwrap();
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn shorter_save_truncates_previous_contents() {
        let (store, _temp_dir) = create_test_store();
        store.save_all(&sample_book()).unwrap();
        store.save_all(&TaskBook::new()).unwrap();
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn file_is_a_json_object_keyed_by_name() {
        let (store, _temp_dir) = create_test_store();
        store.save_all(&sample_book()).unwrap();

        let contents = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(value["build"]["command"], "cargo build");
        assert_eq!(value["test"]["frequent"], false);
    }

    #[test]
    fn modify_persists_edits() {
        let (store, _temp_dir) = create_test_store();
        store.save_all(&sample_book()).unwrap();

        store
            .modify(|book| {
                book.set_frequent("test", true);
                book.move_up("test");
                Ok(())
            })
            .unwrap();

        let book = store.load_all().unwrap();
        assert_eq!(book.names(), vec!["test", "build"]);
        assert!(book.get("test").unwrap().frequent);
    }

    #[test]
    fn modify_error_leaves_store_untouched() {
        let (store, _temp_dir) = create_test_store();
        store.save_all(&sample_book()).unwrap();

        let result: Result<(), _> = store.modify(|book| {
            book.remove("build");
            Err(StoreError::NotFound("other".to_string()))
        });
        assert!(matches!(result, Err(StoreError::NotFound(_))));
        assert!(store.get("build").unwrap().is_some());
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let (store, _temp_dir) = create_test_store();
        std::fs::write(store.path(), "[1, 2, 3]").unwrap();
        assert!(matches!(store.load_all(), Err(StoreError::Parse(_))));
    }

    #[test]
    fn export_then_import_round_trips() {
        let (store, temp_dir) = create_test_store();
        store.save_all(&sample_book()).unwrap();

        let exported = temp_dir.path().join("export.json");
        assert_eq!(store.export_to(&exported).unwrap(), 2);

        let other = JsonFileStore::new(temp_dir.path().join("other.json"));
        assert_eq!(other.import_from(&exported).unwrap(), 2);
        assert_eq!(other.load_all().unwrap(), sample_book());
    }

    #[test]
    fn failed_import_keeps_existing_tasks() {
        let (store, temp_dir) = create_test_store();
        store.save_all(&sample_book()).unwrap();

        let bad = temp_dir.path().join("bad.json");
        std::fs::write(&bad, "not json").unwrap();
        assert!(store.import_from(&bad).is_err());
        assert_eq!(store.load_all().unwrap().len(), 2);
    }

    #[test]
    fn memory_store_round_trips() {
        let store: MemoryStore = [Task::new("a", "true")].into_iter().collect();
        assert!(store.get("a").unwrap().is_some());

        store
            .modify(|book| {
                book.insert(Task::new("b", "false"));
                Ok(())
            })
            .unwrap();
        assert_eq!(store.load_all().unwrap().names(), vec!["a", "b"]);
    }
}
