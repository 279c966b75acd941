//! File System Abstraction
//!
//! Provides a platform-agnostic trait for the file I/O the restore engine
//! performs: staged workflow copies, the manifest and the audit log.

use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// File metadata information
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileMetadata {
    pub size: u64,
    pub modified_at: Option<i64>,
    pub is_directory: bool,
}

/// File system access trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::FileSystemAccess;
///
/// async fn stage(fs: &dyn FileSystemAccess, dir: &Path, data: &[u8]) -> Result<()> {
///     let file_path = dir.join("workflow.json");
///     fs.write_file(&file_path, Bytes::copy_from_slice(data)).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait FileSystemAccess: Send + Sync {
    /// Check if a file or directory exists
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Get metadata for a file or directory
    async fn metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Create a directory and all parent directories if they don't exist
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// Read entire file contents into memory
    async fn read_file(&self, path: &Path) -> Result<Bytes>;

    /// Write data to a file, creating it (and its parents) if needed
    async fn write_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Append data to an existing file or create it
    async fn append_file(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    ///
    /// Implementations must make the replacement atomic when both paths live
    /// on the same filesystem.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Delete a file
    async fn delete_file(&self, path: &Path) -> Result<()>;

    /// List all entries in a directory
    async fn list_directory(&self, path: &Path) -> Result<Vec<PathBuf>>;

    /// Write `data` to a sibling temp file and rename it over `path`
    async fn write_atomic(&self, path: &Path, data: Bytes) -> Result<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = path.with_file_name(format!(".{}.tmp", file_name));
        self.write_file(&temp_path, data).await?;
        self.rename(&temp_path, path).await
    }
}
