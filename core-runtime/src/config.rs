//! # Restore Configuration Module
//!
//! Provides configuration management for a restore run.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `RestoreConfig`
//! instance that holds the run's file locations, its staging policy and the
//! bridges it needs. It enforces fail-fast validation so that a misconfigured
//! run stops before touching the remote instance.
//!
//! ## Required Settings
//!
//! - `manifest_path` - Where the NDJSON manifest is written
//! - `audit_log_path` - Where audit records are appended
//! - `staging_dir` - Where sanitized copies are written for the importer
//!
//! ## Bridges
//!
//! - `FileSystemAccess` - Required (desktop default: tokio fs)
//! - `HttpClient` - Optional, used by providers (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled, desktop-ready defaults are
//! injected automatically if not provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::RestoreConfig;
//!
//! let config = RestoreConfig::builder()
//!     .manifest_path("/tmp/restore/manifest.ndjson")
//!     .audit_log_path("/tmp/restore/audit.ndjson")
//!     .staging_dir("/tmp/restore/staging")
//!     .no_overwrite(true)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{FileSystemAccess, HttpClient};
use std::path::PathBuf;
use std::sync::Arc;

/// Default name of the project that receives workflows without a path-derived project.
pub const DEFAULT_PROJECT_NAME: &str = "Personal";

/// Hop limit applied when walking a folder's parent chain.
pub const DEFAULT_MAX_FOLDER_DEPTH: usize = 200;

/// Identity policy applied by the staging resolver.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StagingPolicy {
    /// Keep declared ids and skip the name-based matches
    pub preserve_ids: bool,
    /// Never reuse a declared id, so every file is imported as a new workflow
    pub no_overwrite: bool,
    /// Folder used for files that sit directly under the project root
    pub default_folder_override: Option<String>,
}

impl StagingPolicy {
    /// Non-empty segments of the folder override.
    pub fn folder_override_segments(&self) -> Vec<&str> {
        self.default_folder_override
            .as_deref()
            .map(|value| {
                value
                    .split('/')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Configuration for a single restore run.
///
/// Use [`RestoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct RestoreConfig {
    /// NDJSON manifest written by staging and rewritten by reconciliation
    pub manifest_path: PathBuf,

    /// Append-only audit log
    pub audit_log_path: PathBuf,

    /// Directory receiving sanitized copies
    pub staging_dir: PathBuf,

    /// Repository prefix stripped from scanned paths before folder derivation
    pub path_prefix: Option<PathBuf>,

    /// Manifest of an earlier run consulted during staging
    pub prior_manifest_path: Option<PathBuf>,

    /// Project that absorbs workflows without a resolvable project
    pub default_project_name: String,

    /// Treat the first directory segment as the project name
    pub project_from_path: bool,

    /// Explicit project override for every entry
    pub target_project: Option<String>,

    /// Staging identity policy
    pub policy: StagingPolicy,

    /// Plan folder creation and moves without calling the remote API
    pub dry_run: bool,

    /// Parent-chain hop limit for folder path derivation
    pub max_folder_depth: usize,

    /// HTTP client used by providers (optional with desktop default)
    pub http_client: Option<Arc<dyn HttpClient>>,

    /// File system access abstraction
    pub file_system: Arc<dyn FileSystemAccess>,
}

impl std::fmt::Debug for RestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreConfig")
            .field("manifest_path", &self.manifest_path)
            .field("audit_log_path", &self.audit_log_path)
            .field("staging_dir", &self.staging_dir)
            .field("path_prefix", &self.path_prefix)
            .field("prior_manifest_path", &self.prior_manifest_path)
            .field("default_project_name", &self.default_project_name)
            .field("project_from_path", &self.project_from_path)
            .field("target_project", &self.target_project)
            .field("policy", &self.policy)
            .field("dry_run", &self.dry_run)
            .field("max_folder_depth", &self.max_folder_depth)
            .field(
                "http_client",
                &self.http_client.as_ref().map(|_| "HttpClient { ... }"),
            )
            .field("file_system", &"FileSystemAccess { ... }")
            .finish()
    }
}

impl RestoreConfig {
    /// Creates a new builder for constructing a `RestoreConfig`.
    pub fn builder() -> RestoreConfigBuilder {
        RestoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Manifest, audit log and staging paths are not empty
    /// - The folder depth guard is greater than zero
    /// - The default project name is not blank
    /// - The folder override has no empty segments
    pub fn validate(&self) -> Result<()> {
        if self.manifest_path.as_os_str().is_empty() {
            return Err(Error::Config("Manifest path cannot be empty".to_string()));
        }

        if self.audit_log_path.as_os_str().is_empty() {
            return Err(Error::Config("Audit log path cannot be empty".to_string()));
        }

        if self.staging_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Staging directory cannot be empty".to_string(),
            ));
        }

        if self.manifest_path == self.audit_log_path {
            return Err(Error::Config(
                "Manifest path and audit log path must differ".to_string(),
            ));
        }

        if self.max_folder_depth == 0 {
            return Err(Error::Config(
                "Max folder depth must be greater than 0".to_string(),
            ));
        }

        if self.default_project_name.trim().is_empty() {
            return Err(Error::Config(
                "Default project name cannot be blank".to_string(),
            ));
        }

        if let Some(ref folder) = self.policy.default_folder_override {
            let trimmed = folder.trim_matches('/');
            if trimmed.is_empty() || trimmed.split('/').any(|s| s.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "Default folder override '{}' contains empty segments",
                    folder
                )));
            }
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn file_system_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "FileSystemAccess".to_string(),
        message: "FileSystemAccess implementation is required for staging, manifest and audit IO. \
                 Desktop: ensure the 'desktop-shims' feature is enabled to use the default TokioFileSystem. \
                 Otherwise: inject an implementation with .file_system()."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    use bridge_desktop::TokioFileSystem;

    let fs: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());
    Ok(fs)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_file_system() -> Result<Arc<dyn FileSystemAccess>> {
    Err(file_system_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client: Arc<dyn HttpClient> = Arc::new(ReqwestHttpClient::new());
    Some(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Option<Arc<dyn HttpClient>> {
    None
}

/// Builder for constructing [`RestoreConfig`] instances.
///
/// Call [`build()`](RestoreConfigBuilder::build) to validate and create the
/// final config.
#[derive(Default)]
pub struct RestoreConfigBuilder {
    manifest_path: Option<PathBuf>,
    audit_log_path: Option<PathBuf>,
    staging_dir: Option<PathBuf>,
    path_prefix: Option<PathBuf>,
    prior_manifest_path: Option<PathBuf>,
    default_project_name: Option<String>,
    project_from_path: bool,
    target_project: Option<String>,
    policy: StagingPolicy,
    dry_run: bool,
    max_folder_depth: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    file_system: Option<Arc<dyn FileSystemAccess>>,
}

impl RestoreConfigBuilder {
    /// Sets the manifest path.
    ///
    /// ```
    /// use core_runtime::config::RestoreConfig;
    ///
    /// let builder = RestoreConfig::builder()
    ///     .manifest_path("/tmp/restore/manifest.ndjson");
    /// ```
    pub fn manifest_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.manifest_path = Some(path.into());
        self
    }

    /// Sets the audit log path.
    pub fn audit_log_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.audit_log_path = Some(path.into());
        self
    }

    /// Sets the staging directory.
    pub fn staging_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.staging_dir = Some(path.into());
        self
    }

    /// Sets the repository prefix stripped from scanned paths.
    ///
    /// Backups stored under `backups/prod/` in a repository use
    /// `.path_prefix("backups/prod")` so that `Sales` is the first folder.
    pub fn path_prefix<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.path_prefix = Some(path.into());
        self
    }

    /// Sets the manifest of an earlier run to consult during staging.
    pub fn prior_manifest_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.prior_manifest_path = Some(path.into());
        self
    }

    /// Sets the default project name.
    ///
    /// Default: `"Personal"`
    pub fn default_project_name(mut self, name: impl Into<String>) -> Self {
        self.default_project_name = Some(name.into());
        self
    }

    /// Treats the first directory segment as the project name.
    ///
    /// Default: false
    pub fn project_from_path(mut self, enabled: bool) -> Self {
        self.project_from_path = enabled;
        self
    }

    /// Sends every workflow to the named project.
    pub fn target_project(mut self, name: impl Into<String>) -> Self {
        self.target_project = Some(name.into());
        self
    }

    /// Keeps declared ids instead of matching by name.
    ///
    /// Default: false
    pub fn preserve_ids(mut self, enabled: bool) -> Self {
        self.policy.preserve_ids = enabled;
        self
    }

    /// Clears every declared id so the importer assigns new ones.
    ///
    /// Default: false
    pub fn no_overwrite(mut self, enabled: bool) -> Self {
        self.policy.no_overwrite = enabled;
        self
    }

    /// Sets the folder (slash separated) used for files at the project root.
    pub fn default_folder_override(mut self, folder: impl Into<String>) -> Self {
        self.policy.default_folder_override = Some(folder.into());
        self
    }

    /// Plans folder sync without calling the remote API.
    ///
    /// Default: false
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Sets the parent-chain hop limit.
    ///
    /// Default: 200
    pub fn max_folder_depth(mut self, depth: usize) -> Self {
        self.max_folder_depth = Some(depth);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the desktop default (reqwest-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the file system access implementation.
    ///
    /// If not provided, the desktop default (tokio fs-based) will be used when
    /// the `desktop-shims` feature is enabled.
    pub fn file_system(mut self, fs: Arc<dyn FileSystemAccess>) -> Self {
        self.file_system = Some(fs);
        self
    }

    /// Builds the final `RestoreConfig` instance.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - A required path is missing
    /// - No `FileSystemAccess` is available
    /// - Configuration values are invalid
    pub fn build(self) -> Result<RestoreConfig> {
        let manifest_path = self.manifest_path.ok_or_else(|| {
            Error::Config("Manifest path is required. Use .manifest_path() to set it.".to_string())
        })?;

        let audit_log_path = self.audit_log_path.ok_or_else(|| {
            Error::Config(
                "Audit log path is required. Use .audit_log_path() to set it.".to_string(),
            )
        })?;

        let staging_dir = self.staging_dir.ok_or_else(|| {
            Error::Config(
                "Staging directory is required. Use .staging_dir() to set it.".to_string(),
            )
        })?;

        let file_system = match self.file_system {
            Some(fs) => fs,
            None => provide_default_file_system()?,
        };

        let http_client = self.http_client.or_else(provide_default_http_client);

        let config = RestoreConfig {
            manifest_path,
            audit_log_path,
            staging_dir,
            path_prefix: self.path_prefix,
            prior_manifest_path: self.prior_manifest_path,
            default_project_name: self
                .default_project_name
                .unwrap_or_else(|| DEFAULT_PROJECT_NAME.to_string()),
            project_from_path: self.project_from_path,
            target_project: self.target_project,
            policy: self.policy,
            dry_run: self.dry_run,
            max_folder_depth: self.max_folder_depth.unwrap_or(DEFAULT_MAX_FOLDER_DEPTH),
            http_client,
            file_system,
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::storage::FileMetadata;
    use bytes::Bytes;
    use std::path::Path;

    // Minimal file system that is never called by the config layer.
    struct NullFileSystem;

    #[async_trait]
    impl FileSystemAccess for NullFileSystem {
        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn metadata(&self, _path: &Path) -> BridgeResult<FileMetadata> {
            Ok(FileMetadata::default())
        }

        async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn read_file(&self, _path: &Path) -> BridgeResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn write_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }

        async fn append_file(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }

        async fn rename(&self, _from: &Path, _to: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn delete_file(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
            Ok(Vec::new())
        }
    }

    fn base_builder() -> RestoreConfigBuilder {
        RestoreConfig::builder()
            .manifest_path("/run/manifest.ndjson")
            .audit_log_path("/run/audit.ndjson")
            .staging_dir("/run/staging")
            .file_system(Arc::new(NullFileSystem))
    }

    #[test]
    fn test_builder_requires_manifest_path() {
        let result = RestoreConfig::builder()
            .audit_log_path("/run/audit.ndjson")
            .staging_dir("/run/staging")
            .file_system(Arc::new(NullFileSystem))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Manifest path is required"));
    }

    #[test]
    fn test_builder_requires_staging_dir() {
        let result = RestoreConfig::builder()
            .manifest_path("/run/manifest.ndjson")
            .audit_log_path("/run/audit.ndjson")
            .file_system(Arc::new(NullFileSystem))
            .build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Staging directory is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_file_system_without_shims() {
        let result = RestoreConfig::builder()
            .manifest_path("/run/manifest.ndjson")
            .audit_log_path("/run/audit.ndjson")
            .staging_dir("/run/staging")
            .build();

        let err_msg = result.unwrap_err().to_string();
        assert!(err_msg.contains("FileSystemAccess"));
    }

    #[test]
    fn test_builder_defaults() {
        let config = base_builder().build().unwrap();

        assert_eq!(config.default_project_name, "Personal");
        assert_eq!(config.max_folder_depth, 200);
        assert!(!config.dry_run);
        assert!(!config.project_from_path);
        assert_eq!(config.policy, StagingPolicy::default());
    }

    #[test]
    fn test_builder_sets_policy() {
        let config = base_builder()
            .preserve_ids(true)
            .no_overwrite(true)
            .default_folder_override("Restored/2024")
            .build()
            .unwrap();

        assert!(config.policy.preserve_ids);
        assert!(config.policy.no_overwrite);
        assert_eq!(
            config.policy.folder_override_segments(),
            vec!["Restored", "2024"]
        );
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let result = base_builder().max_folder_depth(0).build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("must be greater than 0"));
    }

    #[test]
    fn test_validate_rejects_empty_override_segments() {
        let result = base_builder().default_folder_override("Restored//2024").build();
        assert!(result.unwrap_err().to_string().contains("empty segments"));

        let result = base_builder().default_folder_override("/").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_shared_manifest_and_audit_path() {
        let result = base_builder()
            .audit_log_path("/run/manifest.ndjson")
            .build();

        assert!(result.unwrap_err().to_string().contains("must differ"));
    }

    #[test]
    fn test_config_debug_hides_bridges() {
        let config = base_builder().build().unwrap();
        let debug = format!("{:?}", config);

        assert!(debug.contains("FileSystemAccess { ... }"));
        assert!(debug.contains("manifest.ndjson"));
    }
}
