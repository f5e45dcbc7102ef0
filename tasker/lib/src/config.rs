//! Engine configuration and data locations.

use std::path::PathBuf;
use std::time::Duration;

use crate::runner::{DEFAULT_PAUSE_SECS, ProcessLauncher};

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "TASKER_HOME";

/// Data directory name under the user's home directory.
const DEFAULT_DATA_DIR: &str = ".tasker";

/// Default task file name inside the data directory.
pub const DEFAULT_STORE_FILE: &str = "tasks.json";

/// Default execution log file name inside the data directory.
pub const DEFAULT_LOG_FILE: &str = "execution.log";

/// Seconds slept between batch items when pausing is requested.
pub const DEFAULT_BATCH_PAUSE_SECS: u64 = 3;

/// Knobs for a [`TaskEngine`](crate::TaskEngine).
///
/// ## Examples
///
/// ```
/// use std::time::Duration;
/// use tasker_lib::EngineConfig;
///
/// let config = EngineConfig::default().with_batch_pause(Duration::from_millis(10));
/// assert_eq!(config.default_pause, Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// How sub-commands are launched.
    pub launcher: ProcessLauncher,
    /// Length of a `pause` sub-command without an argument.
    pub default_pause: Duration,
    /// Sleep between batch items when the batch asks for pauses.
    pub batch_pause: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            launcher: ProcessLauncher::detect(),
            default_pause: Duration::from_secs(DEFAULT_PAUSE_SECS),
            batch_pause: Duration::from_secs(DEFAULT_BATCH_PAUSE_SECS),
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn with_launcher(mut self, launcher: ProcessLauncher) -> Self {
        self.launcher = launcher;
        self
    }

    #[must_use]
    pub fn with_default_pause(mut self, pause: Duration) -> Self {
        self.default_pause = pause;
        self
    }

    #[must_use]
    pub fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }
}

/// Returns the directory holding the task file and execution log.
///
/// `$TASKER_HOME` wins, then `~/.tasker`, then `./.tasker`.
pub fn data_dir() -> PathBuf {
    resolve_data_dir(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn resolve_data_dir(override_dir: Option<PathBuf>) -> PathBuf {
    override_dir
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DATA_DIR)
        })
}

/// Default path of the task file.
pub fn default_store_path() -> PathBuf {
    data_dir().join(DEFAULT_STORE_FILE)
}

/// Default path of the execution log.
pub fn default_log_path() -> PathBuf {
    data_dir().join(DEFAULT_LOG_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.default_pause, Duration::from_secs(3));
        assert_eq!(config.batch_pause, Duration::from_secs(3));
        assert_eq!(config.launcher, ProcessLauncher::detect());
    }

    #[test]
    fn builders_override_fields() {
        let config = EngineConfig::default()
            .with_default_pause(Duration::from_secs(1))
            .with_batch_pause(Duration::ZERO)
            .with_launcher(ProcessLauncher::Shell);
        assert_eq!(config.default_pause, Duration::from_secs(1));
        assert_eq!(config.batch_pause, Duration::ZERO);
        assert_eq!(config.launcher, ProcessLauncher::Shell);
    }

    #[test]
    fn override_dir_wins() {
        let dir = resolve_data_dir(Some(PathBuf::from("/tmp/tasker-home")));
        assert_eq!(dir, PathBuf::from("/tmp/tasker-home"));
    }

    #[test]
    fn empty_override_falls_back_to_home() {
        let dir = resolve_data_dir(Some(PathBuf::new()));
        assert!(dir.ends_with(DEFAULT_DATA_DIR));
        assert_eq!(resolve_data_dir(None), dir);
    }
}
