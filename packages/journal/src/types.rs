// ABOUTME: Journal type definitions
// ABOUTME: Inputs and display-ready records for mood entries and notes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MoodCreateInput {
    pub mood_value: i64,
    pub emotion: Option<String>,
    pub motivation: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub notes: Option<String>,
}

/// Mood entry with its notes decrypted for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoodEntry {
    pub id: i64,
    pub mood_value: i64,
    pub emotion: Option<String>,
    pub motivation: Option<String>,
    pub tags: Vec<String>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
