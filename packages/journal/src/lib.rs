// ABOUTME: Mood and note services for Carnet
// ABOUTME: Validates input, applies the encryption flag on write and decrypts for display

pub mod error;
pub mod service;
pub mod types;

// Re-export main types
pub use error::{JournalError, JournalResult};
pub use service::Journal;
pub use types::{MoodCreateInput, MoodEntry, Note};
