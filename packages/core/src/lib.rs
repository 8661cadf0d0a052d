// ABOUTME: Core configuration, validation and safety utilities for Carnet
// ABOUTME: Foundational package shared by storage, security and journal packages

pub mod config;
pub mod constants;
pub mod safety;
pub mod utils;
pub mod validation;

// Re-export configuration
pub use config::{CarnetConfig, ConfigError};

// Re-export constants
pub use constants::{carnet_dir, DEFAULT_BACKUP_KEEP_COUNT};

// Re-export utilities
pub use utils::{ensure_private_dir, path_exists, restrict_permissions};

// Re-export validation and safety
pub use safety::{detect_distress, safety_response};
pub use validation::{
    validate_mood_notes, validate_mood_value, validate_note_content, validate_text_input,
    ValidationError,
};
