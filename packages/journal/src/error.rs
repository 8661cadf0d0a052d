// ABOUTME: Error type for journal services
// ABOUTME: Wraps validation, storage and encryption failures

use carnet_core::ValidationError;
use carnet_security::EncryptionError;
use carnet_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),
}

pub type JournalResult<T> = Result<T, JournalError>;
