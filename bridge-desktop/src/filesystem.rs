//! File System Access Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{FileMetadata, FileSystemAccess},
};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Tokio-based file system implementation
///
/// Provides async file I/O operations using `tokio::fs`. Writes create missing
/// parent directories; `rename` maps to `tokio::fs::rename`, which replaces the
/// destination atomically on POSIX filesystems.
#[derive(Debug, Clone, Default)]
pub struct TokioFileSystem;

impl TokioFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }

    async fn ensure_parent(&self, path: &Path) -> Result<()> {
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => self.create_dir_all(parent).await,
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl FileSystemAccess for TokioFileSystem {
    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(path).await.map_err(Self::map_io_error)
    }

    async fn metadata(&self, path: &Path) -> Result<FileMetadata> {
        let metadata = fs::metadata(path).await.map_err(Self::map_io_error)?;

        Ok(FileMetadata {
            size: metadata.len(),
            modified_at: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64),
            is_directory: metadata.is_dir(),
        })
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read file");
        Ok(Bytes::from(data))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;

        let mut file = fs::File::create(path).await.map_err(Self::map_io_error)?;
        file.write_all(data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        file.sync_all().await.map_err(Self::map_io_error)?;

        debug!(path = ?path, size = data.len(), "Wrote file");
        Ok(())
    }

    async fn append_file(&self, path: &Path, data: Bytes) -> Result<()> {
        self.ensure_parent(path).await?;

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .map_err(Self::map_io_error)?;

        file.write_all(data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        file.flush().await.map_err(Self::map_io_error)?;

        debug!(path = ?path, size = data.len(), "Appended to file");
        Ok(())
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).await.map_err(Self::map_io_error)?;
        debug!(from = ?from, to = ?to, "Renamed file");
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted file");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut entries = Vec::new();
        let mut read_dir = fs::read_dir(path).await.map_err(Self::map_io_error)?;

        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(Self::map_io_error)?
        {
            entries.push(entry.path());
        }

        entries.sort();
        debug!(path = ?path, count = entries.len(), "Listed directory");
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_creates_parents_and_reads_back() {
        let temp = TempDir::new().unwrap();
        let fs = TokioFileSystem::new();
        let path = temp.path().join("staging").join("Sales").join("lead.json");

        fs.write_file(&path, Bytes::from_static(b"{}")).await.unwrap();

        assert!(fs.exists(&path).await.unwrap());
        assert_eq!(fs.read_file(&path).await.unwrap(), Bytes::from_static(b"{}"));
    }

    #[tokio::test]
    async fn test_append_accumulates_lines() {
        let temp = TempDir::new().unwrap();
        let fs = TokioFileSystem::new();
        let path = temp.path().join("audit.log");

        fs.append_file(&path, Bytes::from_static(b"one\n")).await.unwrap();
        fs.append_file(&path, Bytes::from_static(b"two\n")).await.unwrap();

        assert_eq!(
            fs.read_file(&path).await.unwrap(),
            Bytes::from_static(b"one\ntwo\n")
        );
    }

    #[tokio::test]
    async fn test_write_atomic_replaces_existing_file() {
        let temp = TempDir::new().unwrap();
        let fs = TokioFileSystem::new();
        let path = temp.path().join("manifest.ndjson");

        fs.write_file(&path, Bytes::from_static(b"old")).await.unwrap();
        fs.write_atomic(&path, Bytes::from_static(b"new")).await.unwrap();

        assert_eq!(fs.read_file(&path).await.unwrap(), Bytes::from_static(b"new"));
        let entries = fs.list_directory(temp.path()).await.unwrap();
        assert_eq!(entries, vec![path]);
    }

    #[tokio::test]
    async fn test_metadata_reports_directories() {
        let temp = TempDir::new().unwrap();
        let fs = TokioFileSystem::new();

        let metadata = fs.metadata(temp.path()).await.unwrap();
        assert!(metadata.is_directory);
    }
}
