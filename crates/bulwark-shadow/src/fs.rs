//! Filesystem primitives used by staging and apply.

use async_trait::async_trait;
use bulwark_core::Timestamp;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{ShadowError, ShadowResult};

/// File metadata returned by [`FileSystem::stat`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    /// Size in bytes.
    pub size: u64,
    /// True for regular files.
    pub is_file: bool,
    /// Last modification time, when the host reports one.
    pub modified: Option<Timestamp>,
}

/// Host filesystem operations.
///
/// Every error is classified through [`ShadowError::io`] so not-found and
/// permission failures keep their own codes.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read a whole file.
    async fn read(&self, path: &Path) -> ShadowResult<Vec<u8>>;

    /// Whether a path exists.
    async fn exists(&self, path: &Path) -> ShadowResult<bool>;

    /// Write to a temporary file in the same directory, sync it, then
    /// rename it over `path`.
    async fn write_atomic(&self, path: &Path, data: &[u8]) -> ShadowResult<()>;

    /// Copy `from` to `to`, replacing `to`.
    async fn copy(&self, from: &Path, to: &Path) -> ShadowResult<()>;

    /// Remove a file.
    async fn remove(&self, path: &Path) -> ShadowResult<()>;

    /// Rename `from` to `to`.
    async fn rename(&self, from: &Path, to: &Path) -> ShadowResult<()>;

    /// File metadata.
    async fn stat(&self, path: &Path) -> ShadowResult<FileStat>;

    /// Create a directory and its parents.
    async fn create_dir_all(&self, path: &Path) -> ShadowResult<()>;
}

/// [`FileSystem`] backed by the host through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostFs;

impl HostFs {
    /// Create a host filesystem.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[async_trait]
impl FileSystem for HostFs {
    async fn read(&self, path: &Path) -> ShadowResult<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .map_err(|e| ShadowError::io(path, e))
    }

    async fn exists(&self, path: &Path) -> ShadowResult<bool> {
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| ShadowError::io(path, e))
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> ShadowResult<()> {
        let target = path.to_path_buf();
        let data = data.to_vec();
        let dir = parent_dir(path);

        tokio::task::spawn_blocking(move || -> ShadowResult<()> {
            let mut tmp =
                tempfile::NamedTempFile::new_in(&dir).map_err(|e| ShadowError::io(&dir, e))?;
            tmp.write_all(&data)
                .map_err(|e| ShadowError::io(&target, e))?;
            tmp.as_file()
                .sync_all()
                .map_err(|e| ShadowError::io(&target, e))?;
            tmp.persist(&target)
                .map_err(|e| ShadowError::io(&target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| ShadowError::io(path, std::io::Error::other(e)))?
    }

    async fn copy(&self, from: &Path, to: &Path) -> ShadowResult<()> {
        tokio::fs::copy(from, to)
            .await
            .map(|_| ())
            .map_err(|e| ShadowError::io(from, e))
    }

    async fn remove(&self, path: &Path) -> ShadowResult<()> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|e| ShadowError::io(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> ShadowResult<()> {
        tokio::fs::rename(from, to)
            .await
            .map_err(|e| ShadowError::io(from, e))
    }

    async fn stat(&self, path: &Path) -> ShadowResult<FileStat> {
        let meta = tokio::fs::metadata(path)
            .await
            .map_err(|e| ShadowError::io(path, e))?;
        Ok(FileStat {
            size: meta.len(),
            is_file: meta.is_file(),
            modified: meta
                .modified()
                .ok()
                .map(|t| Timestamp::from_datetime(t.into())),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> ShadowResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| ShadowError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_atomic_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.txt");
        let fs = HostFs::new();

        fs.write_atomic(&path, b"first").await.unwrap();
        fs.write_atomic(&path, b"second").await.unwrap();

        assert_eq!(fs.read(&path).await.unwrap(), b"second");
        let stat = fs.stat(&path).await.unwrap();
        assert_eq!(stat.size, 6);
        assert!(stat.is_file);

        // No temp files left behind.
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fs = HostFs::new();
        let missing = dir.path().join("missing");

        assert!(!fs.exists(&missing).await.unwrap());
        assert!(matches!(
            fs.read(&missing).await,
            Err(ShadowError::FileNotFound(_))
        ));
        assert!(matches!(
            fs.remove(&missing).await,
            Err(ShadowError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_copy_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        let fs = HostFs::new();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("nested/c");

        fs.write_atomic(&a, b"data").await.unwrap();
        fs.copy(&a, &b).await.unwrap();
        fs.create_dir_all(c.parent().unwrap()).await.unwrap();
        fs.rename(&b, &c).await.unwrap();

        assert!(fs.exists(&a).await.unwrap());
        assert!(!fs.exists(&b).await.unwrap());
        assert_eq!(fs.read(&c).await.unwrap(), b"data");
    }
}
