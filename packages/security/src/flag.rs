// ABOUTME: Durable encryption on/off marker
// ABOUTME: Presence of the flag file means sensitive columns hold ciphertext

use std::io;
use std::path::{Path, PathBuf};

use carnet_core::utils::{ensure_private_dir, restrict_permissions, OWNER_ONLY_FILE_MODE};
use tokio::fs;
use tracing::debug;

const FLAG_CONTENT: &str = "enabled";

#[derive(Debug, Clone)]
pub struct EncryptionFlag {
    path: PathBuf,
}

impl EncryptionFlag {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_enabled(&self) -> bool {
        self.path.is_file()
    }

    pub async fn set_enabled(&self) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            ensure_private_dir(parent).await?;
        }
        fs::write(&self.path, FLAG_CONTENT).await?;
        restrict_permissions(&self.path, OWNER_ONLY_FILE_MODE).await?;
        debug!("Encryption flag written: {}", self.path.display());
        Ok(())
    }

    /// Remove the flag. Already absent is not an error.
    pub async fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => {
                debug!("Encryption flag removed: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_flag_lifecycle() {
        let temp_dir = TempDir::new().unwrap();
        let flag = EncryptionFlag::new(temp_dir.path().join("encryption_enabled.txt"));

        assert!(!flag.is_enabled());

        flag.set_enabled().await.unwrap();
        assert!(flag.is_enabled());
        assert_eq!(std::fs::read_to_string(flag.path()).unwrap(), "enabled");

        flag.clear().await.unwrap();
        assert!(!flag.is_enabled());

        // Clearing twice is fine
        flag.clear().await.unwrap();
    }
}
