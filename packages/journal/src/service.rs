// ABOUTME: Journal composition root
// ABOUTME: Wires storage, backups and the encryption controller behind mood and note services

use std::sync::Arc;

use carnet_core::config::CarnetConfig;
use carnet_core::safety::{detect_distress, safety_response};
use carnet_core::validation::{validate_mood_notes, validate_mood_value, validate_note_content};
use carnet_security::EncryptionController;
use carnet_storage::{AutoBackupReport, BackupManager, JournalStorage, MoodInput};
use tracing::{debug, info};

use crate::error::JournalResult;
use crate::types::{MoodCreateInput, MoodEntry, Note};

/// A single user's journal
pub struct Journal {
    config: CarnetConfig,
    storage: JournalStorage,
    backups: BackupManager,
    encryption: EncryptionController,
}

impl Journal {
    pub async fn open(config: CarnetConfig) -> JournalResult<Self> {
        let storage = JournalStorage::open(&config).await?;
        let backups =
            BackupManager::from_config(&config).with_live_database(Arc::new(storage.clone()));
        let encryption =
            EncryptionController::new(&config, Arc::new(storage.clone()), backups.clone());

        debug!(
            "Journal opened (encryption {})",
            if encryption.is_enabled() { "enabled" } else { "disabled" }
        );

        Ok(Self {
            config,
            storage,
            backups,
            encryption,
        })
    }

    pub fn config(&self) -> &CarnetConfig {
        &self.config
    }

    /// Backups of this journal's database. A restore closes the journal's
    /// connections, so the journal must be reopened afterwards.
    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    pub fn encryption(&self) -> &EncryptionController {
        &self.encryption
    }

    pub async fn close(&self) {
        self.storage.close().await;
    }

    /// Validate and store a mood entry; its notes follow the encryption flag
    pub async fn save_mood(&self, input: MoodCreateInput) -> JournalResult<i64> {
        let mood_value = validate_mood_value(input.mood_value)?;
        let notes = validate_mood_notes(input.notes.as_deref())?;

        let writer = self.encryption.write_guard().await;
        let notes = if notes.is_empty() {
            None
        } else {
            Some(writer.encrypt_for_storage(&notes).await?)
        };

        let id = self
            .storage
            .add_mood(MoodInput {
                mood_value,
                emotion: non_empty(input.emotion),
                motivation: non_empty(input.motivation),
                tags: input
                    .tags
                    .into_iter()
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect(),
                notes,
            })
            .await?;
        drop(writer);

        info!("Saved mood entry {} ({}/10)", id, mood_value);
        Ok(id)
    }

    pub async fn add_note(&self, content: &str) -> JournalResult<i64> {
        let content = validate_note_content(Some(content))?;
        let writer = self.encryption.write_guard().await;
        let stored = writer.encrypt_for_storage(&content).await?;
        let id = self.storage.add_note(stored).await?;
        drop(writer);

        info!("Saved note {}", id);
        Ok(id)
    }

    /// Mood entries, newest first, notes decrypted for display
    pub async fn mood_history(&self) -> JournalResult<Vec<MoodEntry>> {
        let records = self.storage.list_moods().await?;

        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let notes = self
                .encryption
                .decrypt_for_display(record.notes.as_ref())
                .await;
            entries.push(MoodEntry {
                id: record.id,
                mood_value: record.mood_value,
                emotion: record.emotion,
                motivation: record.motivation,
                tags: record.tags,
                notes,
                created_at: record.created_at,
            });
        }
        Ok(entries)
    }

    /// Notes, newest first, decrypted for display
    pub async fn notes(&self) -> JournalResult<Vec<Note>> {
        let records = self.storage.list_notes().await?;

        let mut notes = Vec::with_capacity(records.len());
        for record in records {
            let content = self
                .encryption
                .decrypt_for_display(record.content.as_ref())
                .await;
            notes.push(Note {
                id: record.id,
                content,
                created_at: record.created_at,
            });
        }
        Ok(notes)
    }

    /// Automatic backup with the configured retention
    pub async fn startup_backup(&self) -> AutoBackupReport {
        self.backups.auto_backup(self.config.backup_keep_count).await
    }

    /// Safety response when `text` shows distress, `None` otherwise
    pub fn screen_message(&self, text: &str) -> Option<&'static str> {
        detect_distress(text).then(safety_response)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
