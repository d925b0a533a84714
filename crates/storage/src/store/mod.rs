#![forbid(unsafe_code)]

mod diff;
mod error;
mod ledger;
mod nodes;
mod reference;
mod repo;
mod requests;
mod sequencer;
mod shapes;
mod support;
mod types;
mod ways;

pub use error::{SequencerError, StoreError};
pub use requests::*;
pub use types::*;

use crate::StoreConfig;
use rusqlite::Connection;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    storage_dir: PathBuf,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn open(storage_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with(StoreConfig::new(storage_dir))
    }

    pub fn open_with(config: StoreConfig) -> Result<Self, StoreError> {
        let storage_dir = config.storage_dir.clone();
        std::fs::create_dir_all(&storage_dir)?;

        let conn = Connection::open(config.db_path())?;
        conn.busy_timeout(config.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        support::migrate_sqlite_schema(&conn)?;
        tracing::debug!(path = %config.db_path().display(), "store opened");

        Ok(Self {
            conn,
            storage_dir,
            config,
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}
