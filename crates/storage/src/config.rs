#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DB_FILE_NAME: &str = "chronomap.db";
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub const ENV_STORAGE_DIR: &str = "CHRONOMAP_STORAGE_DIR";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CHRONOMAP_BUSY_TIMEOUT_MS";
pub const ENV_BATCH_MODE: &str = "CHRONOMAP_BATCH_MODE";

/// How failures inside one changeset affect the rest of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Each directive commits on its own; failures are isolated.
    #[default]
    Isolated,
    /// Any skipped or failed directive rolls back the whole batch.
    AllOrNothing,
}

impl BatchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            BatchMode::Isolated => "isolated",
            BatchMode::AllOrNothing => "all_or_nothing",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "isolated" => Some(BatchMode::Isolated),
            "all_or_nothing" | "atomic" => Some(BatchMode::AllOrNothing),
            _ => None,
        }
    }
}

impl std::fmt::Display for BatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    pub storage_dir: PathBuf,
    pub db_file_name: String,
    pub busy_timeout: Duration,
    pub batch_mode: BatchMode,
}

impl StoreConfig {
    pub fn new(storage_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: storage_dir.as_ref().to_path_buf(),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            batch_mode: BatchMode::default(),
        }
    }

    /// Defaults for `storage_dir`, overridden by `CHRONOMAP_*` variables.
    /// Unparseable values fall back to the defaults.
    pub fn from_env(storage_dir: impl AsRef<Path>) -> Self {
        let mut config = Self::new(
            env_var(ENV_STORAGE_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| storage_dir.as_ref().to_path_buf()),
        );
        if let Some(ms) = env_var(ENV_BUSY_TIMEOUT_MS).and_then(|v| v.parse::<u64>().ok()) {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(mode) = env_var(ENV_BATCH_MODE).and_then(|v| BatchMode::parse(&v)) {
            config.batch_mode = mode;
        }
        config
    }

    pub fn with_batch_mode(mut self, batch_mode: BatchMode) -> Self {
        self.batch_mode = batch_mode;
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.storage_dir.join(&self.db_file_name)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_mode_parsing() {
        assert_eq!(BatchMode::parse("Isolated"), Some(BatchMode::Isolated));
        assert_eq!(BatchMode::parse("all-or-nothing"), Some(BatchMode::AllOrNothing));
        assert_eq!(BatchMode::parse("sometimes"), None);
    }

    #[test]
    fn defaults() {
        let config = StoreConfig::new("/tmp/x");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/x").join(DEFAULT_DB_FILE_NAME));
        assert_eq!(config.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert_eq!(config.batch_mode, BatchMode::Isolated);
    }
}
