//! Atomic file publication.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::utils::fs::{ensure_parent_dir, io_error};
use crate::{Error, Result};

/// Atomically replace `path` with `bytes`.
///
/// The content goes to a temporary file in the destination directory whose
/// permission bits are set to `mode` before it is synced and renamed over
/// `path`.
pub async fn publish_file(path: &Path, bytes: Vec<u8>, mode: u32) -> Result<()> {
    ensure_parent_dir(path).await?;

    let path = path.to_path_buf();
    let len = bytes.len();
    let dest = path.clone();
    tokio::task::spawn_blocking(move || write_atomic(&dest, &bytes, mode))
        .await
        .map_err(|e| Error::Other(format!("Publish task failed: {}", e)))??;

    debug!(path = %path.display(), bytes = len, mode = format!("{:o}", mode), "Published file");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir)
        .map_err(|e| io_error("creating temp file in", &dir, e))?;
    set_mode(tmp.as_file_mut(), mode).map_err(|e| io_error("setting mode of", tmp.path(), e))?;
    tmp.write_all(bytes)
        .map_err(|e| io_error("writing", tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| io_error("syncing", tmp.path(), e))?;
    tmp.persist(path)
        .map_err(|e| io_error("renaming onto", path, e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(file: &mut std::fs::File, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_file: &mut std::fs::File, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_creates_parent_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("targets.json");

        publish_file(&path, b"[1]".to_vec(), 0o644).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"[1]");

        publish_file(&path, b"[1, 2]".to_vec(), 0o644).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"[1, 2]");

        // No temporary files left behind.
        let entries = std::fs::read_dir(path.parent().unwrap()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_publish_applies_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.yml");
        publish_file(&path, b"groups: []\n".to_vec(), 0o600)
            .await
            .unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
