// ABOUTME: Note encryption and the encryption on/off state machine for Carnet
// ABOUTME: Provides the AEAD note cipher, the durable flag and the migration controller

pub mod controller;
pub mod encryption;
pub mod flag;

// Re-export main types for convenience
pub use controller::{
    EncryptionController, EncryptionState, EncryptionStateError, EncryptionStatus, RecordCounts,
    ToggleReport, WriteGuard, PRE_DECRYPTION_PREFIX, PRE_ENCRYPTION_PREFIX,
    UNAVAILABLE_PLACEHOLDER,
};
pub use encryption::{EncryptionError, NoteCipher};
pub use flag::EncryptionFlag;
