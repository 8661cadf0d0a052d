// ABOUTME: SQLite row store for mood entries and free-form notes
// ABOUTME: Owns the schema and runs sensitive-column rewrites inside one write transaction

use std::time::Duration;

use async_trait::async_trait;
use carnet_core::config::CarnetConfig;
use carnet_core::utils::{ensure_private_dir, restrict_permissions, OWNER_ONLY_FILE_MODE};
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool,
    SqlitePoolOptions, SqliteRow,
};
use sqlx::{Row, Sqlite};
use tracing::{debug, info, warn};

use crate::backup::LiveDatabase;
use crate::columns::{
    BatchOutcome, ColumnRewriter, ColumnValue, MigrationDirection, RowAction, RowFailure,
    RowTransform, SensitiveColumn,
};
use crate::{StorageError, StorageResult};

/// New mood entry. `notes` is already in its storage encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoodInput {
    pub mood_value: i64,
    pub emotion: Option<String>,
    pub motivation: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<ColumnValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoodRecord {
    pub id: i64,
    pub mood_value: i64,
    pub emotion: Option<String>,
    pub motivation: Option<String>,
    pub tags: Vec<String>,
    pub notes: Option<ColumnValue>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteRecord {
    pub id: i64,
    pub content: Option<ColumnValue>,
    pub created_at: DateTime<Utc>,
}

/// SQLite journal database
#[derive(Debug, Clone)]
pub struct JournalStorage {
    pool: SqlitePool,
}

impl JournalStorage {
    /// Open (creating if needed) the journal database described by `config`
    pub async fn open(config: &CarnetConfig) -> StorageResult<Self> {
        if let Some(parent) = config.database_path.parent() {
            ensure_private_dir(parent).await?;
        }

        let journal_mode = if config.enable_wal {
            SqliteJournalMode::Wal
        } else {
            SqliteJournalMode::Delete
        };

        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(journal_mode)
            .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

        debug!("Opening journal database at {}", config.database_path.display());

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.busy_timeout_seconds))
            .connect_with(options)
            .await
            .map_err(StorageError::Sqlx)?;

        let storage = Self::from_pool(pool).await?;
        restrict_permissions(&config.database_path, OWNER_ONLY_FILE_MODE).await?;

        info!("Journal database ready: {}", config.database_path.display());
        Ok(storage)
    }

    /// Wrap an existing pool and bring its schema up to date
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StorageError::Migration)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn add_mood(&self, input: MoodInput) -> StorageResult<i64> {
        let tags = if input.tags.is_empty() {
            None
        } else {
            Some(input.tags.join(","))
        };

        let query = sqlx::query(
            "INSERT INTO mood (mood_value, emotion, motivation, tags, notes) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(input.mood_value)
        .bind(input.emotion)
        .bind(input.motivation)
        .bind(tags);

        let result = bind_column_value(query, input.notes.as_ref())
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Mood entries, newest first
    pub async fn list_moods(&self) -> StorageResult<Vec<MoodRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, mood_value, emotion, motivation, tags, created_at,
                   CASE WHEN typeof(notes) = 'blob' THEN notes END AS blob_value,
                   CASE WHEN typeof(notes) = 'blob' THEN NULL
                        ELSE CAST(notes AS TEXT) END AS text_value
            FROM mood
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter().map(row_to_mood).collect()
    }

    pub async fn add_note(&self, content: ColumnValue) -> StorageResult<i64> {
        debug!(
            "Inserting {} note",
            if content.is_blob() { "encrypted" } else { "plaintext" }
        );
        let query = sqlx::query("INSERT INTO notes (content) VALUES (?)");
        let result = bind_column_value(query, Some(&content))
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.last_insert_rowid())
    }

    /// Notes, newest first
    pub async fn list_notes(&self) -> StorageResult<Vec<NoteRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, created_at,
                   CASE WHEN typeof(content) = 'blob' THEN content END AS blob_value,
                   CASE WHEN typeof(content) = 'blob' THEN NULL
                        ELSE CAST(content AS TEXT) END AS text_value
            FROM notes
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        rows.iter()
            .map(|row| -> StorageResult<NoteRecord> {
                Ok(NoteRecord {
                    id: row.try_get("id")?,
                    content: column_value_from_row(row)?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }
}

fn row_to_mood(row: &SqliteRow) -> StorageResult<MoodRecord> {
    let tags: Option<String> = row.try_get("tags")?;
    let tags = tags
        .map(|t| {
            t.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    Ok(MoodRecord {
        id: row.try_get("id")?,
        mood_value: row.try_get("mood_value")?,
        emotion: row.try_get("emotion")?,
        motivation: row.try_get("motivation")?,
        tags,
        notes: column_value_from_row(row)?,
        created_at: row.try_get("created_at")?,
    })
}

/// Read a sensitive value split by the select into `blob_value` / `text_value`
fn column_value_from_row(row: &SqliteRow) -> StorageResult<Option<ColumnValue>> {
    let blob: Option<Vec<u8>> = row.try_get("blob_value")?;
    if let Some(bytes) = blob {
        return Ok(Some(ColumnValue::Blob(bytes)));
    }
    let text: Option<String> = row.try_get("text_value")?;
    Ok(text.map(ColumnValue::Text))
}

/// Bind a sensitive value with its storage class: TEXT for plaintext, BLOB for ciphertext
fn bind_column_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: Option<&ColumnValue>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        Some(ColumnValue::Text(text)) => query.bind(text.clone()),
        Some(ColumnValue::Blob(bytes)) => query.bind(bytes.clone()),
        None => query.bind(Option::<String>::None),
    }
}

async fn rewrite_in_transaction(
    conn: &mut SqliteConnection,
    columns: &[SensitiveColumn],
    direction: MigrationDirection,
    transform: &RowTransform<'_>,
) -> StorageResult<Vec<BatchOutcome>> {
    let mut outcomes = Vec::with_capacity(columns.len());

    for column in columns {
        let rows = sqlx::query(column.select_sql(direction))
            .fetch_all(&mut *conn)
            .await
            .map_err(StorageError::Sqlx)?;

        debug!("Rewriting {} candidate row(s) of {}", rows.len(), column);

        let mut outcome = BatchOutcome::new(*column);
        for row in &rows {
            let id: i64 = row.try_get("id")?;
            let Some(value) = column_value_from_row(row)? else {
                continue;
            };
            outcome.attempted += 1;

            match transform(&value) {
                RowAction::Rewrite(new_value) => {
                    bind_column_value(sqlx::query(column.update_sql()), Some(&new_value))
                        .bind(id)
                        .execute(&mut *conn)
                        .await
                        .map_err(StorageError::Sqlx)?;
                    outcome.succeeded += 1;
                }
                RowAction::Keep => outcome.skipped.push(id),
                RowAction::Reject(reason) => {
                    warn!("Row {} of {} left unchanged: {}", id, column, reason);
                    outcome.failed.push(RowFailure { id, reason });
                }
            }
        }

        outcomes.push(outcome);
    }

    Ok(outcomes)
}

async fn rollback(mut conn: PoolConnection<Sqlite>) {
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        // Never hand a connection with an open transaction back to the pool
        warn!("Rollback failed, closing connection: {}", e);
        drop(conn.detach());
    }
}

#[async_trait]
impl ColumnRewriter for JournalStorage {
    async fn rewrite_columns(
        &self,
        columns: &[SensitiveColumn],
        direction: MigrationDirection,
        transform: &RowTransform<'_>,
    ) -> StorageResult<Vec<BatchOutcome>> {
        let mut conn = self.pool.acquire().await.map_err(StorageError::Sqlx)?;

        // IMMEDIATE takes the write lock up front so no other writer interleaves
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(StorageError::Sqlx)?;

        match rewrite_in_transaction(&mut conn, columns, direction, transform).await {
            Ok(outcomes) => {
                if let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await {
                    rollback(conn).await;
                    return Err(StorageError::Sqlx(e));
                }
                Ok(outcomes)
            }
            Err(e) => {
                warn!("Column rewrite aborted, rolling back: {}", e);
                rollback(conn).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl LiveDatabase for JournalStorage {
    async fn checkpoint(&self) -> StorageResult<()> {
        // No-op outside WAL mode
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup() -> (JournalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = CarnetConfig::with_data_dir(temp_dir.path());
        let storage = JournalStorage::open(&config).await.unwrap();
        (storage, temp_dir)
    }

    #[tokio::test]
    async fn test_text_and_blob_keep_their_storage_class() {
        let (storage, _temp_dir) = setup().await;

        storage.add_note(ColumnValue::from("plain")).await.unwrap();
        storage
            .add_note(ColumnValue::Blob(vec![1, 0, 255]))
            .await
            .unwrap();

        let types: Vec<String> = sqlx::query_scalar("SELECT typeof(content) FROM notes ORDER BY id")
            .fetch_all(storage.pool())
            .await
            .unwrap();
        assert_eq!(types, vec!["text", "blob"]);
    }

    #[tokio::test]
    async fn test_tags_round_trip_as_list() {
        let (storage, _temp_dir) = setup().await;

        storage
            .add_mood(MoodInput {
                mood_value: 7,
                emotion: Some("calme".to_string()),
                motivation: None,
                tags: vec!["travail".to_string(), "sport".to_string()],
                notes: None,
            })
            .await
            .unwrap();

        let moods = storage.list_moods().await.unwrap();
        assert_eq!(moods.len(), 1);
        assert_eq!(moods[0].tags, vec!["travail", "sport"]);
        assert_eq!(moods[0].notes, None);
    }

    #[tokio::test]
    async fn test_checkpoint_outside_wal_is_harmless() {
        let (storage, _temp_dir) = setup().await;
        storage.checkpoint().await.unwrap();
    }
}
