// ABOUTME: Timestamped snapshots of the journal database file
// ABOUTME: Create, list, inspect, restore, delete and prune backup artifacts

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use carnet_core::config::CarnetConfig;
use carnet_core::utils::{
    ensure_private_dir, path_exists, restrict_permissions, OWNER_ONLY_FILE_MODE,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::{StorageError, StorageResult};

/// Prefix for backups taken by `auto_backup`
pub const AUTO_BACKUP_PREFIX: &str = "auto_backup";

/// Prefix for backups requested explicitly by the user
pub const MANUAL_BACKUP_PREFIX: &str = "manual_backup";

/// Prefix for the safety copy taken before a restore overwrites the database
pub const PRE_RESTORE_PREFIX: &str = "pre_restore_backup";

/// Artifact timestamp, e.g. `20250120_143015`
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const BACKUP_EXTENSION: &str = "db";

/// Same-second name collisions tolerated before giving up
const MAX_NAME_ATTEMPTS: u32 = 100;

/// SQLite files that travel with the main database in WAL mode
const SIDECAR_SUFFIXES: [&str; 2] = ["-wal", "-shm"];

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Path is not inside the backup directory: {}", .0.display())]
    OutsideBackupDir(PathBuf),

    #[error("Invalid backup prefix: {0}")]
    InvalidPrefix(String),

    #[error("Database error: {0}")]
    Database(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// The open database a backup manager copies from and restores into
#[async_trait]
pub trait LiveDatabase: Send + Sync {
    /// Flush committed writes into the main database file
    async fn checkpoint(&self) -> StorageResult<()>;

    /// Release every connection before the file is replaced
    async fn close(&self);
}

/// Metadata of one backup artifact
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub size_mb: f64,
    pub created: DateTime<Local>,
}

impl BackupInfo {
    fn from_metadata(path: PathBuf, metadata: &std::fs::Metadata) -> io::Result<Self> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let size_bytes = metadata.len();
        let created = DateTime::<Local>::from(metadata.modified()?);

        Ok(Self {
            name,
            path,
            size_bytes,
            size_mb: (size_bytes as f64 / (1024.0 * 1024.0) * 100.0).round() / 100.0,
            created,
        })
    }

    /// Creation time formatted for display
    pub fn created_display(&self) -> String {
        self.created.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Result of `auto_backup`, reported instead of returned as an error
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoBackupReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    pub deleted_old_backups: usize,
    pub total_backups: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AutoBackupReport {
    fn failed(error: String) -> Self {
        Self {
            success: false,
            backup_path: None,
            deleted_old_backups: 0,
            total_backups: 0,
            error: Some(error),
        }
    }
}

/// Manages backups of a single database file
#[derive(Clone)]
pub struct BackupManager {
    database_path: PathBuf,
    backup_dir: PathBuf,
    live: Option<Arc<dyn LiveDatabase>>,
}

impl fmt::Debug for BackupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupManager")
            .field("database_path", &self.database_path)
            .field("backup_dir", &self.backup_dir)
            .field("live", &self.live.is_some())
            .finish()
    }
}

impl BackupManager {
    pub fn new(database_path: impl Into<PathBuf>, backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            backup_dir: backup_dir.into(),
            live: None,
        }
    }

    pub fn from_config(config: &CarnetConfig) -> Self {
        Self::new(&config.database_path, &config.backup_dir)
    }

    /// Attach the open handle on the database file.
    ///
    /// Backups then checkpoint it before copying, and a restore closes it
    /// before the file is replaced.
    pub fn with_live_database(mut self, live: Arc<dyn LiveDatabase>) -> Self {
        self.live = Some(live);
        self
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Copy the database into a new `{prefix}_{timestamp}.db` artifact.
    ///
    /// The backup directory is created on first use. The artifact is opened
    /// with `create_new`, so an existing artifact is never overwritten; a
    /// same-second collision gets a numeric suffix instead.
    pub async fn create_backup(&self, prefix: &str) -> Result<PathBuf, BackupError> {
        validate_prefix(prefix)?;

        if !path_exists(&self.database_path).await {
            return Err(BackupError::NotFound(self.database_path.clone()));
        }

        if let Some(live) = &self.live {
            live.checkpoint().await?;
        }

        ensure_private_dir(&self.backup_dir).await?;

        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let (mut target, backup_path) = self.open_new_artifact(prefix, &timestamp).await?;

        if let Err(e) = copy_into(&self.database_path, &mut target).await {
            drop(target);
            if let Err(cleanup) = fs::remove_file(&backup_path).await {
                warn!(
                    "Failed to remove partial backup {}: {}",
                    backup_path.display(),
                    cleanup
                );
            }
            return Err(e.into());
        }
        drop(target);

        restrict_permissions(&backup_path, OWNER_ONLY_FILE_MODE).await?;

        info!("Created backup: {}", backup_path.display());
        Ok(backup_path)
    }

    async fn open_new_artifact(
        &self,
        prefix: &str,
        timestamp: &str,
    ) -> Result<(fs::File, PathBuf), BackupError> {
        let mut attempt = 0;
        loop {
            let file_name = if attempt == 0 {
                format!("{}_{}.{}", prefix, timestamp, BACKUP_EXTENSION)
            } else {
                format!("{}_{}_{}.{}", prefix, timestamp, attempt, BACKUP_EXTENSION)
            };
            let path = self.backup_dir.join(file_name);

            let mut options = fs::OpenOptions::new();
            options.write(true).create_new(true);
            #[cfg(unix)]
            options.mode(OWNER_ONLY_FILE_MODE);

            match options.open(&path).await {
                Ok(file) => return Ok((file, path)),
                Err(e)
                    if e.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS =>
                {
                    debug!("Backup name {} taken, retrying", path.display());
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// All artifacts, newest first by modification time (ties by name, descending)
    pub async fn list_backups(&self) -> Result<Vec<BackupInfo>, BackupError> {
        let mut entries = match fs::read_dir(&self.backup_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut backups = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(BACKUP_EXTENSION) {
                continue;
            }

            let metadata = match entry.metadata().await {
                Ok(metadata) => metadata,
                // Removed between read_dir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            if !metadata.is_file() {
                continue;
            }

            backups.push(BackupInfo::from_metadata(path, &metadata)?);
        }

        backups.sort_by(|a, b| {
            b.created
                .cmp(&a.created)
                .then_with(|| b.name.cmp(&a.name))
        });

        Ok(backups)
    }

    /// Metadata for one artifact, `None` if it does not exist
    pub async fn backup_info(&self, backup_path: impl AsRef<Path>) -> Option<BackupInfo> {
        let backup_path = backup_path.as_ref();
        let metadata = fs::metadata(backup_path).await.ok()?;
        if !metadata.is_file() {
            return None;
        }
        BackupInfo::from_metadata(backup_path.to_path_buf(), &metadata).ok()
    }

    /// Replace the live database with an artifact.
    ///
    /// When a live database exists it is backed up first with
    /// `PRE_RESTORE_PREFIX`, so a restore can itself be undone. An attached
    /// live handle is closed and stale `-wal`/`-shm` files are removed before
    /// the copy; the database must be reopened afterwards.
    pub async fn restore_backup(&self, backup_path: impl AsRef<Path>) -> Result<(), BackupError> {
        let backup_path = backup_path.as_ref();

        if !path_exists(backup_path).await {
            return Err(BackupError::NotFound(backup_path.to_path_buf()));
        }

        if path_exists(&self.database_path).await {
            let safety = self.create_backup(PRE_RESTORE_PREFIX).await?;
            debug!("Pre-restore safety backup: {}", safety.display());
        } else if let Some(parent) = self.database_path.parent() {
            ensure_private_dir(parent).await?;
        }

        if let Some(live) = &self.live {
            live.close().await;
        }
        remove_sidecars(&self.database_path).await?;

        fs::copy(backup_path, &self.database_path).await?;
        restrict_permissions(&self.database_path, OWNER_ONLY_FILE_MODE).await?;

        info!(
            "Restored {} from {}",
            self.database_path.display(),
            backup_path.display()
        );
        Ok(())
    }

    /// Delete one artifact. Only files directly inside the backup directory qualify.
    pub async fn delete_backup(&self, backup_path: impl AsRef<Path>) -> Result<(), BackupError> {
        let backup_path = backup_path.as_ref();

        let resolved = match fs::canonicalize(backup_path).await {
            Ok(path) => path,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(BackupError::NotFound(backup_path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let backup_dir = fs::canonicalize(&self.backup_dir).await?;

        if resolved.parent() != Some(backup_dir.as_path()) {
            return Err(BackupError::OutsideBackupDir(backup_path.to_path_buf()));
        }

        fs::remove_file(&resolved).await?;
        info!("Deleted backup: {}", resolved.display());
        Ok(())
    }

    /// Keep the `keep_count` newest artifacts and delete the rest.
    ///
    /// Returns how many were deleted. A file that cannot be deleted is logged
    /// and skipped.
    pub async fn clean_old_backups(&self, keep_count: usize) -> Result<usize, BackupError> {
        let backups = self.list_backups().await?;

        let mut deleted = 0;
        for backup in backups.iter().skip(keep_count) {
            match fs::remove_file(&backup.path).await {
                Ok(()) => {
                    debug!("Deleted old backup: {}", backup.path.display());
                    deleted += 1;
                }
                Err(e) => {
                    warn!("Failed to delete old backup {}: {}", backup.path.display(), e);
                }
            }
        }

        if deleted > 0 {
            info!("Pruned {} old backup(s), keeping {}", deleted, keep_count);
        }
        Ok(deleted)
    }

    /// Take an automatic backup and prune to `keep_count`. Never returns an error.
    pub async fn auto_backup(&self, keep_count: usize) -> AutoBackupReport {
        match self.run_auto_backup(keep_count).await {
            Ok(report) => report,
            Err(e) => {
                error!("Automatic backup failed: {}", e);
                AutoBackupReport::failed(e.to_string())
            }
        }
    }

    async fn run_auto_backup(&self, keep_count: usize) -> Result<AutoBackupReport, BackupError> {
        let backup_path = self.create_backup(AUTO_BACKUP_PREFIX).await?;
        let deleted_old_backups = self.clean_old_backups(keep_count).await?;
        let total_backups = self.list_backups().await?.len();

        Ok(AutoBackupReport {
            success: true,
            backup_path: Some(backup_path.display().to_string()),
            deleted_old_backups,
            total_backups,
            error: None,
        })
    }
}

fn validate_prefix(prefix: &str) -> Result<(), BackupError> {
    let valid = !prefix.is_empty()
        && prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(BackupError::InvalidPrefix(prefix.to_string()))
    }
}

async fn remove_sidecars(database_path: &Path) -> io::Result<()> {
    for suffix in SIDECAR_SUFFIXES {
        let mut name = database_path.as_os_str().to_owned();
        name.push(suffix);
        let sidecar = PathBuf::from(name);

        match fs::remove_file(&sidecar).await {
            Ok(()) => debug!("Removed stale {}", sidecar.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

async fn copy_into(source: &Path, target: &mut fs::File) -> io::Result<u64> {
    let mut source = fs::File::open(source).await?;
    let copied = tokio::io::copy(&mut source, target).await?;
    target.flush().await?;
    target.sync_all().await?;
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_prefix() {
        assert!(validate_prefix("pre_encryption_backup").is_ok());
        assert!(validate_prefix("backup-1").is_ok());
        assert!(validate_prefix("").is_err());
        assert!(validate_prefix("../escape").is_err());
        assert!(validate_prefix("a/b").is_err());
    }

    #[tokio::test]
    async fn test_same_second_backups_do_not_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("journal.db");
        std::fs::write(&db_path, b"first").unwrap();

        let manager = BackupManager::new(&db_path, temp_dir.path().join("backups"));
        let first = manager.create_backup("same").await.unwrap();

        std::fs::write(&db_path, b"second").unwrap();
        let second = manager.create_backup("same").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).unwrap(), b"first");
        assert_eq!(std::fs::read(&second).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_auto_backup_reports_missing_database() {
        let temp_dir = TempDir::new().unwrap();
        let manager = BackupManager::new(
            temp_dir.path().join("missing.db"),
            temp_dir.path().join("backups"),
        );

        let report = manager.auto_backup(5).await;

        assert!(!report.success);
        assert!(report.backup_path.is_none());
        assert!(report.error.unwrap().contains("missing.db"));
    }

    #[tokio::test]
    async fn test_restore_drops_stale_sidecars() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("journal.db");
        std::fs::write(&db_path, b"live").unwrap();
        std::fs::write(temp_dir.path().join("journal.db-wal"), b"stale").unwrap();
        std::fs::write(temp_dir.path().join("journal.db-shm"), b"stale").unwrap();
        let artifact = temp_dir.path().join("artifact.db");
        std::fs::write(&artifact, b"restored").unwrap();

        let manager = BackupManager::new(&db_path, temp_dir.path().join("backups"));
        manager.restore_backup(&artifact).await.unwrap();

        assert_eq!(std::fs::read(&db_path).unwrap(), b"restored");
        assert!(!temp_dir.path().join("journal.db-wal").exists());
        assert!(!temp_dir.path().join("journal.db-shm").exists());
    }

    #[test]
    fn test_failed_report_serializes_without_backup_path() {
        let report = AutoBackupReport::failed("boom".to_string());
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "boom");
        assert!(json.get("backup_path").is_none());
    }
}
