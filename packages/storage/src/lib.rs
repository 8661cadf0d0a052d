// ABOUTME: Data layer and backup lifecycle for Carnet
// ABOUTME: SQLite journal store, sensitive-column rewrite seam, database file backups

use thiserror::Error;

pub mod backup;
pub mod columns;
pub mod journal;

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Record not found")]
    NotFound,
}

pub type StorageResult<T> = Result<T, StorageError>;

// Re-export main types for convenience
pub use backup::{
    AutoBackupReport, BackupError, BackupInfo, BackupManager, LiveDatabase, AUTO_BACKUP_PREFIX,
    MANUAL_BACKUP_PREFIX, PRE_RESTORE_PREFIX,
};
pub use columns::{
    BatchOutcome, ColumnRewriter, ColumnValue, MigrationDirection, RowAction, RowFailure,
    RowTransform, SensitiveColumn,
};
pub use journal::{JournalStorage, MoodInput, MoodRecord, NoteRecord};
