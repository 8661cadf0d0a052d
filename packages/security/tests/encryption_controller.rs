// ABOUTME: Integration tests for the encryption state controller
// ABOUTME: Enable/disable migrations against a real journal database and a failing fake store

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use carnet_core::CarnetConfig;
use carnet_security::{
    EncryptionController, EncryptionState, EncryptionStateError, RecordCounts,
    PRE_DECRYPTION_PREFIX, PRE_ENCRYPTION_PREFIX, UNAVAILABLE_PLACEHOLDER,
};
use carnet_storage::{
    BackupManager, BatchOutcome, ColumnRewriter, ColumnValue, JournalStorage, MigrationDirection,
    MoodInput, RowTransform, SensitiveColumn, StorageError, StorageResult,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct Fixture {
    storage: JournalStorage,
    config: CarnetConfig,
    _temp_dir: TempDir,
}

impl Fixture {
    async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config = CarnetConfig::with_data_dir(temp_dir.path().join("data"));
        let storage = JournalStorage::open(&config).await.unwrap();
        Self {
            storage,
            config,
            _temp_dir: temp_dir,
        }
    }

    fn controller(&self) -> EncryptionController {
        EncryptionController::new(
            &self.config,
            Arc::new(self.storage.clone()),
            BackupManager::from_config(&self.config)
                .with_live_database(Arc::new(self.storage.clone())),
        )
    }

    async fn add_mood_note(&self, notes: &str) -> i64 {
        self.storage
            .add_mood(MoodInput {
                mood_value: 3,
                emotion: Some("peur".to_string()),
                motivation: None,
                tags: Vec::new(),
                notes: Some(ColumnValue::from(notes)),
            })
            .await
            .unwrap()
    }

    async fn raw_note(&self, id: i64) -> Option<ColumnValue> {
        self.storage
            .list_notes()
            .await
            .unwrap()
            .into_iter()
            .find(|n| n.id == id)
            .and_then(|n| n.content)
    }

    async fn raw_mood_notes(&self, id: i64) -> Option<ColumnValue> {
        self.storage
            .list_moods()
            .await
            .unwrap()
            .into_iter()
            .find(|m| m.id == id)
            .and_then(|m| m.notes)
    }

    async fn backups_with_prefix(&self, prefix: &str) -> usize {
        BackupManager::from_config(&self.config)
            .list_backups()
            .await
            .unwrap()
            .iter()
            .filter(|b| b.name.starts_with(prefix))
            .count()
    }
}

/// Store whose rewrite always fails
struct FailingStore;

#[async_trait]
impl ColumnRewriter for FailingStore {
    async fn rewrite_columns(
        &self,
        _columns: &[SensitiveColumn],
        _direction: MigrationDirection,
        _transform: &RowTransform<'_>,
    ) -> StorageResult<Vec<BatchOutcome>> {
        Err(StorageError::InvalidInput("simulated failure".to_string()))
    }
}

#[tokio::test]
async fn test_enable_encrypts_existing_notes() {
    let fixture = Fixture::new().await;
    let mood_id = fixture.add_mood_note("j'ai peur").await;
    let note_id = fixture
        .storage
        .add_note(ColumnValue::from("ça va"))
        .await
        .unwrap();
    let controller = fixture.controller();

    let report = controller.enable().await;

    assert!(report.success, "enable failed: {:?}", report.error);
    assert_eq!(
        report.migrated_records,
        Some(RecordCounts {
            mood_notes: 1,
            notes: 1
        })
    );
    assert!(report.decrypted_records.is_none());
    assert!(std::path::Path::new(report.backup_path.as_ref().unwrap()).exists());
    assert_eq!(fixture.backups_with_prefix(PRE_ENCRYPTION_PREFIX).await, 1);
    assert!(controller.is_enabled());
    assert_eq!(controller.state(), EncryptionState::Enabled);

    let raw_mood = fixture.raw_mood_notes(mood_id).await.unwrap();
    let raw_note = fixture.raw_note(note_id).await.unwrap();
    assert!(raw_mood.is_blob());
    assert!(raw_note.is_blob());
    assert_ne!(raw_mood.as_bytes(), "j'ai peur".as_bytes());
    assert_ne!(raw_note.as_bytes(), "ça va".as_bytes());

    assert_eq!(controller.decrypt_for_display(Some(&raw_mood)).await, "j'ai peur");
    assert_eq!(controller.decrypt_for_display(Some(&raw_note)).await, "ça va");
}

#[tokio::test]
async fn test_backup_holds_plaintext_snapshot() {
    let fixture = Fixture::new().await;
    fixture
        .storage
        .add_note(ColumnValue::from("avant"))
        .await
        .unwrap();
    let controller = fixture.controller();

    let report = controller.enable().await;
    assert!(report.success);

    // Open the pre-encryption artifact as its own journal
    let backup_dir = TempDir::new().unwrap();
    let snapshot_config = CarnetConfig::with_data_dir(backup_dir.path());
    std::fs::copy(
        report.backup_path.unwrap(),
        &snapshot_config.database_path,
    )
    .unwrap();
    let snapshot = JournalStorage::open(&snapshot_config).await.unwrap();

    let notes = snapshot.list_notes().await.unwrap();
    assert_eq!(notes[0].content, Some(ColumnValue::from("avant")));
}

#[tokio::test]
async fn test_enable_twice_is_rejected() {
    let fixture = Fixture::new().await;
    let note_id = fixture
        .storage
        .add_note(ColumnValue::from("ça va"))
        .await
        .unwrap();
    let controller = fixture.controller();

    assert!(controller.enable().await.success);
    let encrypted = fixture.raw_note(note_id).await;

    let second = controller.try_enable().await;
    assert!(matches!(second, Err(EncryptionStateError::AlreadyEnabled)));

    let report = controller.enable().await;
    assert!(!report.success);
    assert_eq!(report.error.as_deref(), Some("Encryption is already enabled"));

    // Rows untouched, no extra backup
    assert_eq!(fixture.raw_note(note_id).await, encrypted);
    assert_eq!(fixture.backups_with_prefix(PRE_ENCRYPTION_PREFIX).await, 1);
}

#[tokio::test]
async fn test_disable_when_not_enabled_is_rejected() {
    let fixture = Fixture::new().await;
    let controller = fixture.controller();

    let result = controller.try_disable().await;

    assert!(matches!(result, Err(EncryptionStateError::NotEnabled)));
    assert_eq!(fixture.backups_with_prefix(PRE_DECRYPTION_PREFIX).await, 0);
}

#[tokio::test]
async fn test_enable_then_disable_restores_plaintext() {
    let fixture = Fixture::new().await;
    let mood_id = fixture.add_mood_note("j'ai peur").await;
    let note_id = fixture
        .storage
        .add_note(ColumnValue::from("ça va"))
        .await
        .unwrap();
    let controller = fixture.controller();

    assert!(controller.enable().await.success);
    let report = controller.disable().await;

    assert!(report.success, "disable failed: {:?}", report.error);
    assert_eq!(
        report.decrypted_records,
        Some(RecordCounts {
            mood_notes: 1,
            notes: 1
        })
    );
    assert!(report.migrated_records.is_none());
    assert!(!controller.is_enabled());
    assert_eq!(fixture.backups_with_prefix(PRE_DECRYPTION_PREFIX).await, 1);

    assert_eq!(
        fixture.raw_mood_notes(mood_id).await,
        Some(ColumnValue::from("j'ai peur"))
    );
    assert_eq!(
        fixture.raw_note(note_id).await,
        Some(ColumnValue::from("ça va"))
    );
}

#[tokio::test]
async fn test_enable_skips_empty_and_existing_blobs() {
    let fixture = Fixture::new().await;
    fixture.add_mood_note("").await;
    let blob = vec![1u8; 40];
    let blob_id = fixture
        .storage
        .add_note(ColumnValue::Blob(blob.clone()))
        .await
        .unwrap();
    let controller = fixture.controller();

    let report = controller.try_enable().await.unwrap();

    assert_eq!(
        report.migrated_records,
        Some(RecordCounts {
            mood_notes: 0,
            notes: 1
        })
    );
    let notes_batch = report
        .batches
        .iter()
        .find(|b| b.column == SensitiveColumn::NoteContent)
        .unwrap();
    assert_eq!(notes_batch.skipped, vec![blob_id]);
    assert_eq!(notes_batch.succeeded, 0);
    // Not encrypted a second time
    assert_eq!(fixture.raw_note(blob_id).await, Some(ColumnValue::Blob(blob)));
}

#[tokio::test]
async fn test_disable_reports_skipped_and_failed_rows() {
    let fixture = Fixture::new().await;
    let good_id = fixture
        .storage
        .add_note(ColumnValue::from("lisible"))
        .await
        .unwrap();
    let controller = fixture.controller();
    assert!(controller.enable().await.success);

    // Stray rows: plaintext written behind the controller's back and a corrupted blob
    let plain_id = fixture
        .storage
        .add_note(ColumnValue::from("en clair"))
        .await
        .unwrap();
    let corrupted = vec![1u8; 40];
    let corrupted_id = fixture
        .storage
        .add_note(ColumnValue::Blob(corrupted.clone()))
        .await
        .unwrap();

    let report = controller.disable().await;

    assert!(report.success);
    assert_eq!(report.decrypted_records.unwrap().notes, 3);
    assert_eq!(report.failed_ids(), vec![corrupted_id]);
    let notes_batch = report
        .batches
        .iter()
        .find(|b| b.column == SensitiveColumn::NoteContent)
        .unwrap();
    assert_eq!(notes_batch.skipped, vec![plain_id]);
    assert_eq!(notes_batch.succeeded, 1);

    assert!(!controller.is_enabled());
    assert_eq!(
        fixture.raw_note(good_id).await,
        Some(ColumnValue::from("lisible"))
    );
    assert_eq!(
        fixture.raw_note(corrupted_id).await,
        Some(ColumnValue::Blob(corrupted))
    );
}

#[tokio::test]
async fn test_failed_migration_leaves_flag_unchanged() {
    let fixture = Fixture::new().await;
    let controller = EncryptionController::new(
        &fixture.config,
        Arc::new(FailingStore),
        BackupManager::from_config(&fixture.config),
    );

    let report = controller.enable().await;

    assert!(!report.success);
    assert!(report.error.unwrap().contains("simulated failure"));
    // The backup was taken before the failure and is reported
    assert!(report.backup_path.is_some());
    assert!(!controller.is_enabled());

    let result = controller.try_enable().await;
    assert!(matches!(result, Err(EncryptionStateError::Storage(_))));
}

#[tokio::test]
async fn test_missing_database_aborts_before_migration() {
    let fixture = Fixture::new().await;
    let mut config = fixture.config.clone();
    config.database_path = config.data_dir.join("elsewhere.db");
    let controller = EncryptionController::new(
        &config,
        Arc::new(fixture.storage.clone()),
        BackupManager::from_config(&config),
    );
    let note_id = fixture
        .storage
        .add_note(ColumnValue::from("ça va"))
        .await
        .unwrap();

    let result = controller.try_enable().await;

    assert!(matches!(result, Err(EncryptionStateError::Backup(_))));
    assert!(!controller.is_enabled());
    assert_eq!(
        fixture.raw_note(note_id).await,
        Some(ColumnValue::from("ça va"))
    );
}

#[tokio::test]
async fn test_concurrent_enable_runs_once() {
    let fixture = Fixture::new().await;
    fixture
        .storage
        .add_note(ColumnValue::from("ça va"))
        .await
        .unwrap();
    let controller = fixture.controller();

    let (first, second) = tokio::join!(controller.enable(), controller.enable());

    assert_eq!(
        [first.success, second.success]
            .iter()
            .filter(|s| **s)
            .count(),
        1
    );
    assert!(controller.is_enabled());
}

#[tokio::test]
async fn test_key_loss_renders_placeholder() {
    let fixture = Fixture::new().await;
    let note_id = fixture
        .storage
        .add_note(ColumnValue::from("secret"))
        .await
        .unwrap();
    assert!(fixture.controller().enable().await.success);

    std::fs::remove_file(&fixture.config.key_path).unwrap();
    let controller = fixture.controller();

    let raw = fixture.raw_note(note_id).await;
    assert_eq!(
        controller.decrypt_for_display(raw.as_ref()).await,
        UNAVAILABLE_PLACEHOLDER
    );
}

#[tokio::test]
async fn test_encrypt_for_storage_follows_flag() {
    let fixture = Fixture::new().await;
    let controller = fixture.controller();

    {
        let writer = controller.write_guard().await;
        assert_eq!(
            writer.encrypt_for_storage("ça va").await.unwrap(),
            ColumnValue::from("ça va")
        );
    }

    assert!(controller.enable().await.success);

    let writer = controller.write_guard().await;
    let stored = writer.encrypt_for_storage("ça va").await.unwrap();
    assert!(stored.is_blob());
    assert_eq!(
        writer.encrypt_for_storage("").await.unwrap(),
        ColumnValue::from("")
    );
    drop(writer);
    assert_eq!(controller.decrypt_for_display(Some(&stored)).await, "ça va");
}

#[tokio::test]
async fn test_enable_waits_for_pending_write() {
    let fixture = Fixture::new().await;
    let controller = fixture.controller();

    let writer = controller.write_guard().await;
    let stored = writer.encrypt_for_storage("ça va").await.unwrap();
    assert_eq!(stored, ColumnValue::from("ça va"));

    let enable = controller.enable();
    tokio::pin!(enable);
    let blocked = tokio::time::timeout(Duration::from_millis(50), &mut enable).await;
    assert!(blocked.is_err());
    assert!(!controller.is_enabled());

    let note_id = fixture.storage.add_note(stored).await.unwrap();
    drop(writer);

    let report = enable.await;
    assert!(report.success);
    assert_eq!(
        report.migrated_records,
        Some(RecordCounts {
            mood_notes: 0,
            notes: 1
        })
    );
    assert!(fixture.raw_note(note_id).await.unwrap().is_blob());
}

#[tokio::test]
async fn test_decrypt_for_display_never_fails() {
    let fixture = Fixture::new().await;
    let controller = fixture.controller();

    assert_eq!(controller.decrypt_for_display(None).await, "");
    assert_eq!(
        controller
            .decrypt_for_display(Some(&ColumnValue::from("texte")))
            .await,
        "texte"
    );
    // Binary value while disabled
    assert_eq!(
        controller
            .decrypt_for_display(Some(&ColumnValue::Blob(vec![0xFF, 0xFE])))
            .await,
        UNAVAILABLE_PLACEHOLDER
    );

    assert!(controller.enable().await.success);
    assert_eq!(
        controller
            .decrypt_for_display(Some(&ColumnValue::Blob(vec![1u8; 40])))
            .await,
        UNAVAILABLE_PLACEHOLDER
    );
    // Plaintext rows under an enabled flag display as is
    assert_eq!(
        controller
            .decrypt_for_display(Some(&ColumnValue::from("ancien")))
            .await,
        "ancien"
    );
}

#[tokio::test]
async fn test_status_reports_key_and_flag_paths() {
    let fixture = Fixture::new().await;
    let controller = fixture.controller();

    let status = controller.status();
    assert_eq!(status.state, EncryptionState::Disabled);
    assert!(!status.key_present);
    assert_eq!(status.key_path, fixture.config.key_path);

    assert!(controller.enable().await.success);
    let status = controller.status();
    assert_eq!(status.state, EncryptionState::Enabled);
    assert!(status.key_present);
}
