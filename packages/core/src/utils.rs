// ABOUTME: Shared filesystem helpers for Carnet
// ABOUTME: Owner-only permissions and existence checks

use std::io;
use std::path::Path;
use tokio::fs;

/// rwx------ for private directories
pub const OWNER_ONLY_DIR_MODE: u32 = 0o700;

/// rw------- for private files
pub const OWNER_ONLY_FILE_MODE: u32 = 0o600;

/// Checks if a path exists
pub async fn path_exists(path: impl AsRef<Path>) -> bool {
    fs::metadata(path).await.is_ok()
}

/// Apply a Unix permission mode. No-op on platforms without that model.
pub async fn restrict_permissions(path: impl AsRef<Path>, mode: u32) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path.as_ref(), std::fs::Permissions::from_mode(mode)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
    }
    Ok(())
}

/// Create a directory (and parents) readable only by its owner
pub async fn ensure_private_dir(path: impl AsRef<Path>) -> io::Result<()> {
    let path = path.as_ref();
    fs::create_dir_all(path).await?;
    restrict_permissions(path, OWNER_ONLY_DIR_MODE).await
}
