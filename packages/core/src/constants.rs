use std::env;
use std::path::PathBuf;

/// Name of the data directory created under the user's home
pub const DATA_DIR_NAME: &str = ".carnet";

/// SQLite database holding the mood and notes tables
pub const DATABASE_FILE: &str = "journal.db";

/// Directory (inside the data directory) holding backup artifacts
pub const BACKUP_DIR: &str = "backups";

/// Marker file whose presence means at-rest encryption is enabled
pub const ENCRYPTION_FLAG_FILE: &str = "encryption_enabled.txt";

/// Symmetric key used for note encryption
pub const KEY_FILE: &str = "secret.key";

/// Number of backups kept by automatic backups unless configured otherwise
pub const DEFAULT_BACKUP_KEEP_COUNT: usize = 10;

/// Bounds accepted for a configured backup retention count
pub const MIN_BACKUP_KEEP_COUNT: usize = 3;
pub const MAX_BACKUP_KEEP_COUNT: usize = 30;

// Environment variables
pub const CARNET_DATA_DIR: &str = "CARNET_DATA_DIR";
pub const CARNET_BACKUP_KEEP_COUNT: &str = "CARNET_BACKUP_KEEP_COUNT";
pub const CARNET_ENABLE_WAL: &str = "CARNET_ENABLE_WAL";
pub const HOME: &str = "HOME";

/// Get the path to the Carnet directory (~/.carnet)
pub fn carnet_dir() -> PathBuf {
    // First try HOME environment variable (useful for tests)
    if let Ok(home) = env::var(HOME) {
        PathBuf::from(home).join(DATA_DIR_NAME)
    } else if let Some(home) = dirs::home_dir() {
        home.join(DATA_DIR_NAME)
    } else {
        // Last resort: relative to the working directory
        PathBuf::from(DATA_DIR_NAME)
    }
}
