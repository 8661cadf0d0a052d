// ABOUTME: Process-wide configuration object for Carnet
// ABOUTME: Resolves data, database, backup, flag and key paths plus storage tuning

use std::env;
use std::num::ParseIntError;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{
    carnet_dir, BACKUP_DIR, CARNET_BACKUP_KEEP_COUNT, CARNET_DATA_DIR, CARNET_ENABLE_WAL,
    DATABASE_FILE, DEFAULT_BACKUP_KEEP_COUNT, ENCRYPTION_FLAG_FILE, KEY_FILE,
    MAX_BACKUP_KEEP_COUNT, MIN_BACKUP_KEEP_COUNT,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid backup keep count: {0}")]
    InvalidKeepCount(#[from] ParseIntError),
    #[error("Backup keep count {0} is out of valid range (3-30)")]
    KeepCountOutOfRange(usize),
    #[error("Invalid boolean for {name}: {value}")]
    InvalidBool { name: String, value: String },
}

/// Paths and tuning shared by every Carnet component.
///
/// Constructed once per process and handed to the storage layer and the
/// encryption controller, so nothing reads scattered global state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CarnetConfig {
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub encryption_flag_path: PathBuf,
    pub key_path: PathBuf,
    pub backup_keep_count: usize,
    pub enable_wal: bool,
    pub max_connections: u32,
    pub busy_timeout_seconds: u64,
}

impl Default for CarnetConfig {
    fn default() -> Self {
        Self::with_data_dir(carnet_dir())
    }
}

impl CarnetConfig {
    /// Build a configuration rooted at `data_dir` with default tuning
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_path: data_dir.join(DATABASE_FILE),
            backup_dir: data_dir.join(BACKUP_DIR),
            encryption_flag_path: data_dir.join(ENCRYPTION_FLAG_FILE),
            key_path: data_dir.join(KEY_FILE),
            data_dir,
            backup_keep_count: DEFAULT_BACKUP_KEEP_COUNT,
            // Backups copy the main database file, so the rollback journal is the default
            enable_wal: false,
            max_connections: 5,
            busy_timeout_seconds: 30,
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build a configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = lookup(CARNET_DATA_DIR)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(carnet_dir);

        let mut config = Self::with_data_dir(data_dir);

        if let Some(raw) = lookup(CARNET_BACKUP_KEEP_COUNT) {
            let keep_count = raw.trim().parse::<usize>()?;
            if !(MIN_BACKUP_KEEP_COUNT..=MAX_BACKUP_KEEP_COUNT).contains(&keep_count) {
                return Err(ConfigError::KeepCountOutOfRange(keep_count));
            }
            config.backup_keep_count = keep_count;
        }

        if let Some(raw) = lookup(CARNET_ENABLE_WAL) {
            config.enable_wal = parse_bool(CARNET_ENABLE_WAL, &raw)?;
        }

        Ok(config)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}
