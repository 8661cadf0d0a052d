// ABOUTME: Sensitive column model and the rewrite seam used by encryption migrations
// ABOUTME: Fixed column set, TEXT/BLOB values, per-row actions and batch outcomes

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::StorageResult;

/// The columns whose encoding follows the encryption flag.
///
/// The set is closed: SQL for each column is a static string chosen by
/// `match`, never assembled from caller input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensitiveColumn {
    /// `mood.notes`
    #[serde(rename = "mood_notes")]
    MoodNotes,
    /// `notes.content`
    #[serde(rename = "notes")]
    NoteContent,
}

impl SensitiveColumn {
    pub const ALL: [SensitiveColumn; 2] =
        [SensitiveColumn::MoodNotes, SensitiveColumn::NoteContent];

    pub fn table(&self) -> &'static str {
        match self {
            Self::MoodNotes => "mood",
            Self::NoteContent => "notes",
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            Self::MoodNotes => "notes",
            Self::NoteContent => "content",
        }
    }

    pub(crate) fn select_sql(&self, direction: MigrationDirection) -> &'static str {
        match (self, direction) {
            (Self::MoodNotes, MigrationDirection::Encrypt) => {
                r#"
                SELECT id,
                       CASE WHEN typeof(notes) = 'blob' THEN notes END AS blob_value,
                       CASE WHEN typeof(notes) = 'blob' THEN NULL
                            ELSE CAST(notes AS TEXT) END AS text_value
                FROM mood
                WHERE notes IS NOT NULL AND notes != ''
                ORDER BY id
                "#
            }
            (Self::MoodNotes, MigrationDirection::Decrypt) => {
                r#"
                SELECT id,
                       CASE WHEN typeof(notes) = 'blob' THEN notes END AS blob_value,
                       CASE WHEN typeof(notes) = 'blob' THEN NULL
                            ELSE CAST(notes AS TEXT) END AS text_value
                FROM mood
                WHERE notes IS NOT NULL
                ORDER BY id
                "#
            }
            (Self::NoteContent, MigrationDirection::Encrypt) => {
                r#"
                SELECT id,
                       CASE WHEN typeof(content) = 'blob' THEN content END AS blob_value,
                       CASE WHEN typeof(content) = 'blob' THEN NULL
                            ELSE CAST(content AS TEXT) END AS text_value
                FROM notes
                WHERE content IS NOT NULL AND content != ''
                ORDER BY id
                "#
            }
            (Self::NoteContent, MigrationDirection::Decrypt) => {
                r#"
                SELECT id,
                       CASE WHEN typeof(content) = 'blob' THEN content END AS blob_value,
                       CASE WHEN typeof(content) = 'blob' THEN NULL
                            ELSE CAST(content AS TEXT) END AS text_value
                FROM notes
                WHERE content IS NOT NULL
                ORDER BY id
                "#
            }
        }
    }

    pub(crate) fn update_sql(&self) -> &'static str {
        match self {
            Self::MoodNotes => "UPDATE mood SET notes = ? WHERE id = ?",
            Self::NoteContent => "UPDATE notes SET content = ? WHERE id = ?",
        }
    }
}

impl std::fmt::Display for SensitiveColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table(), self.column())
    }
}

/// Storage representation of a sensitive value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    /// Plaintext stored as TEXT
    Text(String),
    /// Ciphertext stored as BLOB
    Blob(Vec<u8>),
}

impl ColumnValue {
    pub fn is_blob(&self) -> bool {
        matches!(self, Self::Blob(_))
    }
}

impl From<String> for ColumnValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ColumnValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// Which way a migration moves the sensitive columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationDirection {
    /// Plaintext to ciphertext. Empty strings are not selected.
    Encrypt,
    /// Ciphertext to plaintext. Every non-NULL value is selected.
    Decrypt,
}

/// What a migration does with one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowAction {
    /// Write the new value back
    Rewrite(ColumnValue),
    /// Already in the target encoding, leave it
    Keep,
    /// Could not be transformed, leave it and record why
    Reject(String),
}

/// A row that a migration could not transform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFailure {
    pub id: i64,
    pub reason: String,
}

/// Best-effort batch result for one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub column: SensitiveColumn,
    pub attempted: usize,
    pub succeeded: usize,
    /// Rows already in the target encoding
    pub skipped: Vec<i64>,
    /// Rows the transform rejected
    pub failed: Vec<RowFailure>,
}

impl BatchOutcome {
    pub fn new(column: SensitiveColumn) -> Self {
        Self {
            column,
            attempted: 0,
            succeeded: 0,
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn failed_ids(&self) -> Vec<i64> {
        self.failed.iter().map(|f| f.id).collect()
    }
}

/// Per-row transform applied during a migration
pub type RowTransform<'a> = dyn Fn(&ColumnValue) -> RowAction + Send + Sync + 'a;

/// Row store surface consumed by the encryption controller
#[async_trait]
pub trait ColumnRewriter: Send + Sync {
    /// Apply `transform` to every candidate row of `columns`.
    ///
    /// Implementations run the whole call as one unit: a storage error leaves
    /// every row as it was. Rejected rows are not errors.
    async fn rewrite_columns(
        &self,
        columns: &[SensitiveColumn],
        direction: MigrationDirection,
        transform: &RowTransform<'_>,
    ) -> StorageResult<Vec<BatchOutcome>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_names() {
        assert_eq!(SensitiveColumn::MoodNotes.to_string(), "mood.notes");
        assert_eq!(SensitiveColumn::NoteContent.to_string(), "notes.content");
    }

    #[test]
    fn test_select_filters_empty_only_when_encrypting() {
        for column in SensitiveColumn::ALL {
            assert!(column.select_sql(MigrationDirection::Encrypt).contains("!= ''"));
            assert!(!column.select_sql(MigrationDirection::Decrypt).contains("!= ''"));
        }
    }

    #[test]
    fn test_column_serializes_as_report_name() {
        let json = serde_json::to_string(&SensitiveColumn::NoteContent).unwrap();
        assert_eq!(json, "\"notes\"");
    }

    #[test]
    fn test_column_value_accessors() {
        let text = ColumnValue::from("ça va");
        assert!(!text.is_blob());
        assert_eq!(text, ColumnValue::Text("ça va".to_string()));

        let blob = ColumnValue::Blob(vec![1, 2, 3]);
        assert!(blob.is_blob());
    }
}
