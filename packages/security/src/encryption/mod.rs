// ABOUTME: Note encryption using ChaCha20-Poly1305 AEAD with a locally stored random key
// ABOUTME: Blob layout is version || nonce || ciphertext || tag
//
// KEY MODEL:
//
// - 32 random bytes generated on first use and written base64-encoded to the
//   key file, mode 0600, opened with create_new so an existing key is never
//   replaced.
// - The key never leaves the machine and is never rotated. Losing the key file
//   makes every encrypted note permanently unreadable; users are pointed at
//   the key path so they can back it up.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use carnet_core::utils::{ensure_private_dir, OWNER_ONLY_FILE_MODE};
use ring::{
    aead::{self, Nonce, UnboundKey},
    error::Unspecified,
    rand::{SecureRandom, SystemRandom},
};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Leading byte of every blob produced by this module
pub const BLOB_VERSION: u8 = 0x01;

/// Key size for ChaCha20-Poly1305
const KEY_SIZE: usize = 32;

/// Nonce size for ChaCha20-Poly1305
const NONCE_SIZE: usize = 12;

/// Tag size for ChaCha20-Poly1305
const TAG_SIZE: usize = 16;

/// Smallest well-formed blob (empty plaintext)
const MIN_BLOB_SIZE: usize = 1 + NONCE_SIZE + TAG_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum EncryptionError {
    #[error("Encryption key unavailable: {0}")]
    KeyUnavailable(String),

    #[error("Failed to generate random data: {0}")]
    RandomGeneration(String),

    #[error("Failed to encrypt data: {0}")]
    Encryption(String),

    #[error("Failed to decrypt data: {0}")]
    Decryption(String),
}

impl From<Unspecified> for EncryptionError {
    fn from(_: Unspecified) -> Self {
        EncryptionError::Encryption("Cryptographic operation failed".to_string())
    }
}

/// Encrypts and decrypts journal text with the installation key
pub struct NoteCipher {
    rng: Arc<SystemRandom>,
    key: aead::LessSafeKey,
    key_path: PathBuf,
}

impl std::fmt::Debug for NoteCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteCipher")
            .field("key_path", &self.key_path)
            .finish_non_exhaustive()
    }
}

impl NoteCipher {
    /// Load the key at `key_path`, generating and persisting one if absent
    pub async fn load_or_create(key_path: impl AsRef<Path>) -> Result<Self, EncryptionError> {
        let key_path = key_path.as_ref();
        let rng = Arc::new(SystemRandom::new());

        let key_bytes = match read_key(key_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                match create_key(key_path, rng.as_ref()).await {
                    Ok(bytes) => bytes,
                    // Another opener won the race; use its key
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => read_key(key_path)
                        .await
                        .map_err(|e| key_unavailable(key_path, e))?,
                    Err(e) => return Err(key_unavailable(key_path, e)),
                }
            }
            Err(e) => return Err(key_unavailable(key_path, e)),
        };

        Self::from_key_bytes(&key_bytes, rng, key_path.to_path_buf())
    }

    fn from_key_bytes(
        key_bytes: &[u8],
        rng: Arc<SystemRandom>,
        key_path: PathBuf,
    ) -> Result<Self, EncryptionError> {
        let unbound_key = UnboundKey::new(&aead::CHACHA20_POLY1305, key_bytes).map_err(|_| {
            EncryptionError::KeyUnavailable(format!("invalid key in {}", key_path.display()))
        })?;

        Ok(Self {
            rng,
            key: aead::LessSafeKey::new(unbound_key),
            key_path,
        })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    /// Encrypt text with a fresh random nonce
    pub fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>, EncryptionError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            EncryptionError::RandomGeneration("Failed to generate nonce".to_string())
        })?;

        let nonce = Nonce::try_assume_unique_for_key(&nonce_bytes)?;

        let mut in_out = plaintext.as_bytes().to_vec();
        self.key
            .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Encryption("Seal operation failed".to_string()))?;

        let mut blob = Vec::with_capacity(1 + NONCE_SIZE + in_out.len());
        blob.push(BLOB_VERSION);
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&in_out);

        Ok(blob)
    }

    /// Decrypt a blob produced by `encrypt`
    pub fn decrypt(&self, blob: &[u8]) -> Result<String, EncryptionError> {
        if blob.len() < MIN_BLOB_SIZE {
            return Err(EncryptionError::Decryption("Blob too short".to_string()));
        }

        let (version, rest) = blob.split_at(1);
        if version[0] != BLOB_VERSION {
            return Err(EncryptionError::Decryption(format!(
                "Unknown blob version: {}",
                version[0]
            )));
        }

        let (nonce_bytes, ciphertext_and_tag) = rest.split_at(NONCE_SIZE);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| EncryptionError::Decryption("Invalid nonce".to_string()))?;

        let mut in_out = ciphertext_and_tag.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
            .map_err(|_| EncryptionError::Decryption("Open operation failed".to_string()))?;

        String::from_utf8(plaintext.to_vec())
            .map_err(|_| EncryptionError::Decryption("Invalid UTF-8 in decrypted data".to_string()))
    }

    /// Structural check: version byte and minimum length. Does not authenticate.
    pub fn is_encrypted(value: &[u8]) -> bool {
        value.len() >= MIN_BLOB_SIZE && value[0] == BLOB_VERSION
    }
}

fn key_unavailable(key_path: &Path, e: io::Error) -> EncryptionError {
    EncryptionError::KeyUnavailable(format!("{}: {}", key_path.display(), e))
}

async fn read_key(key_path: &Path) -> io::Result<Vec<u8>> {
    let encoded = fs::read_to_string(key_path).await?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if bytes.len() != KEY_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {} key bytes, found {}", KEY_SIZE, bytes.len()),
        ));
    }
    debug!("Loaded encryption key from {}", key_path.display());
    Ok(bytes)
}

async fn create_key(key_path: &Path, rng: &SystemRandom) -> io::Result<Vec<u8>> {
    let mut key_bytes = vec![0u8; KEY_SIZE];
    rng.fill(&mut key_bytes)
        .map_err(|_| io::Error::other("failed to generate key"))?;

    if let Some(parent) = key_path.parent() {
        ensure_private_dir(parent).await?;
    }

    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(OWNER_ONLY_FILE_MODE);

    let mut file = options.open(key_path).await?;
    file.write_all(BASE64.encode(&key_bytes).as_bytes()).await?;
    file.sync_all().await?;

    info!("Generated new encryption key at {}", key_path.display());
    Ok(key_bytes)
}
