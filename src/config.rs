use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings, read from `LODGE_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// WAL appends after which the log is rewritten from current state.
    pub compact_threshold: u64,
    pub repo_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            repo_timeout: crate::engine::DEFAULT_REPO_TIMEOUT,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unparsable values fall back to the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let data_dir = lookup("LODGE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let compact_threshold: u64 = lookup("LODGE_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        let repo_timeout = lookup("LODGE_REPO_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.repo_timeout);

        Self {
            data_dir,
            compact_threshold,
            repo_timeout,
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("lodges.wal")
    }
}
