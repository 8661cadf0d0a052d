// ABOUTME: Encryption on/off state machine over the journal's sensitive columns
// ABOUTME: Backup-guarded migrations, flag handling and read/write helpers

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use carnet_core::config::CarnetConfig;
use carnet_storage::{
    BackupError, BackupManager, BatchOutcome, ColumnRewriter, ColumnValue, MigrationDirection,
    RowAction, SensitiveColumn, StorageError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard, OnceCell};
use tracing::{debug, error, info, warn};

use crate::encryption::{EncryptionError, NoteCipher};
use crate::flag::EncryptionFlag;

/// Backup prefix taken before enabling
pub const PRE_ENCRYPTION_PREFIX: &str = "pre_encryption_backup";

/// Backup prefix taken before disabling
pub const PRE_DECRYPTION_PREFIX: &str = "pre_decryption_backup";

/// Shown in place of a note that cannot be decrypted
pub const UNAVAILABLE_PLACEHOLDER: &str = "[encrypted note unavailable]";

#[derive(Debug, Error)]
pub enum EncryptionStateError {
    #[error("Encryption is already enabled")]
    AlreadyEnabled,

    #[error("Encryption is not enabled")]
    NotEnabled,

    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] EncryptionError),

    #[error("Rows migrated but the encryption flag could not be updated (restore from {backup_path}): {source}")]
    Flag {
        backup_path: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncryptionState {
    Disabled,
    Enabled,
}

/// Rows attempted per sensitive column
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub mood_notes: usize,
    pub notes: usize,
}

impl RecordCounts {
    fn from_batches(batches: &[BatchOutcome]) -> Self {
        let mut counts = Self::default();
        for batch in batches {
            match batch.column {
                SensitiveColumn::MoodNotes => counts.mood_notes += batch.attempted,
                SensitiveColumn::NoteContent => counts.notes += batch.attempted,
            }
        }
        counts
    }
}

/// Outcome of `enable` / `disable`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub migrated_records: Option<RecordCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decrypted_records: Option<RecordCounts>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub batches: Vec<BatchOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToggleReport {
    fn completed(
        direction: MigrationDirection,
        backup_path: &Path,
        batches: Vec<BatchOutcome>,
    ) -> Self {
        let counts = Some(RecordCounts::from_batches(&batches));
        let (migrated_records, decrypted_records) = match direction {
            MigrationDirection::Encrypt => (counts, None),
            MigrationDirection::Decrypt => (None, counts),
        };

        Self {
            success: true,
            backup_path: Some(backup_path.display().to_string()),
            migrated_records,
            decrypted_records,
            batches,
            error: None,
        }
    }

    fn failed(backup_path: Option<&Path>, err: &EncryptionStateError) -> Self {
        Self {
            success: false,
            backup_path: backup_path.map(|p| p.display().to_string()),
            migrated_records: None,
            decrypted_records: None,
            batches: Vec::new(),
            error: Some(err.to_string()),
        }
    }

    /// Row ids left untouched because they could not be transformed
    pub fn failed_ids(&self) -> Vec<i64> {
        self.batches.iter().flat_map(|b| b.failed_ids()).collect()
    }
}

/// Paths and state shown by `carnet encryption status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionStatus {
    pub state: EncryptionState,
    pub key_path: PathBuf,
    pub key_present: bool,
    pub flag_path: PathBuf,
}

/// Owns the encryption state of one journal database.
///
/// One instance per process. `enable` and `disable` serialize on an internal
/// lock; the row rewrite itself runs as a single storage transaction, and the
/// flag changes only after that transaction commits.
pub struct EncryptionController {
    store: Arc<dyn ColumnRewriter>,
    backups: BackupManager,
    flag: EncryptionFlag,
    key_path: PathBuf,
    cipher: OnceCell<NoteCipher>,
    migration_lock: Mutex<()>,
}

impl EncryptionController {
    pub fn new(
        config: &CarnetConfig,
        store: Arc<dyn ColumnRewriter>,
        backups: BackupManager,
    ) -> Self {
        Self {
            store,
            backups,
            flag: EncryptionFlag::new(&config.encryption_flag_path),
            key_path: config.key_path.clone(),
            cipher: OnceCell::new(),
            migration_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.flag.is_enabled()
    }

    pub fn state(&self) -> EncryptionState {
        if self.is_enabled() {
            EncryptionState::Enabled
        } else {
            EncryptionState::Disabled
        }
    }

    pub fn status(&self) -> EncryptionStatus {
        EncryptionStatus {
            state: self.state(),
            key_path: self.key_path.clone(),
            key_present: self.key_path.is_file(),
            flag_path: self.flag.path().to_path_buf(),
        }
    }

    /// Cipher for this installation, loading or generating the key on first use
    async fn cipher(&self) -> Result<&NoteCipher, EncryptionError> {
        self.cipher
            .get_or_try_init(|| NoteCipher::load_or_create(&self.key_path))
            .await
    }

    /// Encrypt every plaintext sensitive value and set the flag
    pub async fn try_enable(&self) -> Result<ToggleReport, EncryptionStateError> {
        let mut backup_path = None;
        let batches = self.run_enable(&mut backup_path).await?;
        let backup_path = backup_path.unwrap_or_default();
        Ok(ToggleReport::completed(
            MigrationDirection::Encrypt,
            &backup_path,
            batches,
        ))
    }

    /// Like `try_enable`, with every failure folded into the report
    pub async fn enable(&self) -> ToggleReport {
        let mut backup_path = None;
        match self.run_enable(&mut backup_path).await {
            Ok(batches) => ToggleReport::completed(
                MigrationDirection::Encrypt,
                &backup_path.unwrap_or_default(),
                batches,
            ),
            Err(e) => {
                error!("Enabling encryption failed: {}", e);
                ToggleReport::failed(backup_path.as_deref(), &e)
            }
        }
    }

    async fn run_enable(
        &self,
        backup_path: &mut Option<PathBuf>,
    ) -> Result<Vec<BatchOutcome>, EncryptionStateError> {
        let _guard = self.migration_lock.lock().await;

        if self.flag.is_enabled() {
            return Err(EncryptionStateError::AlreadyEnabled);
        }

        // Key problems surface before anything is written
        let cipher = self.cipher().await?;

        let path = self.backups.create_backup(PRE_ENCRYPTION_PREFIX).await?;
        debug!("Pre-encryption backup: {}", path.display());
        let path = backup_path.insert(path);

        let transform = |value: &ColumnValue| -> RowAction {
            match value {
                // Already ciphertext, never encrypted twice
                ColumnValue::Blob(_) => RowAction::Keep,
                ColumnValue::Text(text) => match cipher.encrypt(text) {
                    Ok(blob) => RowAction::Rewrite(ColumnValue::Blob(blob)),
                    Err(e) => RowAction::Reject(e.to_string()),
                },
            }
        };

        let batches = self
            .store
            .rewrite_columns(&SensitiveColumn::ALL, MigrationDirection::Encrypt, &transform)
            .await?;

        self.flag
            .set_enabled()
            .await
            .map_err(|source| EncryptionStateError::Flag {
                backup_path: path.display().to_string(),
                source,
            })?;

        info!("Encryption enabled ({})", summarize(&batches));
        Ok(batches)
    }

    /// Decrypt every ciphertext sensitive value and clear the flag
    pub async fn try_disable(&self) -> Result<ToggleReport, EncryptionStateError> {
        let mut backup_path = None;
        let batches = self.run_disable(&mut backup_path).await?;
        let backup_path = backup_path.unwrap_or_default();
        Ok(ToggleReport::completed(
            MigrationDirection::Decrypt,
            &backup_path,
            batches,
        ))
    }

    /// Like `try_disable`, with every failure folded into the report
    pub async fn disable(&self) -> ToggleReport {
        let mut backup_path = None;
        match self.run_disable(&mut backup_path).await {
            Ok(batches) => ToggleReport::completed(
                MigrationDirection::Decrypt,
                &backup_path.unwrap_or_default(),
                batches,
            ),
            Err(e) => {
                error!("Disabling encryption failed: {}", e);
                ToggleReport::failed(backup_path.as_deref(), &e)
            }
        }
    }

    async fn run_disable(
        &self,
        backup_path: &mut Option<PathBuf>,
    ) -> Result<Vec<BatchOutcome>, EncryptionStateError> {
        let _guard = self.migration_lock.lock().await;

        if !self.flag.is_enabled() {
            return Err(EncryptionStateError::NotEnabled);
        }

        let cipher = self.cipher().await?;

        let path = self.backups.create_backup(PRE_DECRYPTION_PREFIX).await?;
        debug!("Pre-decryption backup: {}", path.display());
        let path = backup_path.insert(path);

        let transform = |value: &ColumnValue| -> RowAction {
            match value {
                ColumnValue::Text(_) => RowAction::Keep,
                ColumnValue::Blob(blob) => match cipher.decrypt(blob) {
                    Ok(text) => RowAction::Rewrite(ColumnValue::Text(text)),
                    Err(e) => RowAction::Reject(e.to_string()),
                },
            }
        };

        let batches = self
            .store
            .rewrite_columns(&SensitiveColumn::ALL, MigrationDirection::Decrypt, &transform)
            .await?;

        self.flag
            .clear()
            .await
            .map_err(|source| EncryptionStateError::Flag {
                backup_path: path.display().to_string(),
                source,
            })?;

        let failed: usize = batches.iter().map(|b| b.failed.len()).sum();
        if failed > 0 {
            warn!(
                "{} row(s) could not be decrypted and were left as ciphertext",
                failed
            );
        }
        info!("Encryption disabled ({})", summarize(&batches));
        Ok(batches)
    }

    /// Plaintext for display. Never fails.
    pub async fn decrypt_for_display(&self, value: Option<&ColumnValue>) -> String {
        let bytes = match value {
            None => return String::new(),
            Some(ColumnValue::Text(text)) => return text.clone(),
            Some(ColumnValue::Blob(bytes)) => bytes,
        };

        if !self.is_enabled() {
            return match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    warn!("Binary note found while encryption is disabled");
                    UNAVAILABLE_PLACEHOLDER.to_string()
                }
            };
        }

        let cipher = match self.cipher().await {
            Ok(cipher) => cipher,
            Err(e) => {
                warn!("Cannot display encrypted note: {}", e);
                return UNAVAILABLE_PLACEHOLDER.to_string();
            }
        };

        match cipher.decrypt(bytes) {
            Ok(text) => text,
            Err(e) => {
                warn!("Cannot display encrypted note: {}", e);
                UNAVAILABLE_PLACEHOLDER.to_string()
            }
        }
    }

    /// Hold off migrations until the returned guard is dropped.
    ///
    /// Writers keep the guard across both encoding and the INSERT, so no
    /// migration can commit in between.
    pub async fn write_guard(&self) -> WriteGuard<'_> {
        WriteGuard {
            controller: self,
            _lock: self.migration_lock.lock().await,
        }
    }
}

/// Exclusive against `enable` / `disable` while alive
pub struct WriteGuard<'a> {
    controller: &'a EncryptionController,
    _lock: MutexGuard<'a, ()>,
}

impl WriteGuard<'_> {
    /// Storage encoding for new text under the current flag state
    pub async fn encrypt_for_storage(&self, text: &str) -> Result<ColumnValue, EncryptionError> {
        if !self.controller.is_enabled() || text.is_empty() {
            return Ok(ColumnValue::Text(text.to_string()));
        }

        let cipher = self.controller.cipher().await?;
        Ok(ColumnValue::Blob(cipher.encrypt(text)?))
    }
}

fn summarize(batches: &[BatchOutcome]) -> String {
    batches
        .iter()
        .map(|b| {
            format!(
                "{}: {} attempted, {} rewritten, {} skipped, {} failed",
                b.column,
                b.attempted,
                b.succeeded,
                b.skipped.len(),
                b.failed.len()
            )
        })
        .collect::<Vec<_>>()
        .join("; ")
}
