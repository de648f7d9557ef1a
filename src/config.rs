//! Adapter configuration.
//!
//! All wiring is explicit: hosts build a [`StorageConfig`] (directly or from
//! a TOML file) and hand it to [`crate::storage::SqliteStorage::open`]. There
//! is no process-global state.

use crate::codec::StorageFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path of the SQLite database file.
    pub database: PathBuf,
    /// Codec applied to newly written payloads. Reads always honor the
    /// format recorded on each row.
    pub default_format: StorageFormat,
    /// How long a statement waits on a locked database before failing
    /// with an unavailability error.
    pub busy_timeout_ms: u64,
    /// Attempts to take the migration lock at startup before giving up.
    pub migration_lock_attempts: u32,
    /// Base backoff between migration-lock attempts; grows linearly.
    pub migration_lock_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("storage.db"),
            default_format: StorageFormat::Binary,
            busy_timeout_ms: 5_000,
            migration_lock_attempts: 5,
            migration_lock_backoff_ms: 50,
        }
    }
}

impl StorageConfig {
    /// Config pointing at `database`, everything else defaulted.
    pub fn at(database: impl Into<PathBuf>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }
}

/// Load a config file; `Ok(None)` when the file does not exist.
pub fn load_config(path: &Path) -> anyhow::Result<Option<StorageConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let config: StorageConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

/// Create the parent directory of the database file if missing.
pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
