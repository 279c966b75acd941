//! # Local Tree Scanner
//!
//! Walks a backup directory and yields the workflow definitions it holds.
//!
//! ## Overview
//!
//! The scan is lazy and restartable: [`TreeScanner::scan`] hands back a fresh
//! iterator each time, visiting entries in file-name order. Non-workflow files
//! are skipped silently. Files that cannot be read or parsed are yielded as
//! [`RestoreError::Scan`] items so the caller can log them and keep going.
//!
//! ## Path to folder mapping
//!
//! ```text
//! <root>/<prefix>/Team A/Sales/Lead Gen/scorer.json
//!                 ^^^^^^ ^^^^^^^^^^^^^^ ^^^^^^^^^^^
//!                 project   folders       file
//! ```
//!
//! The first directory is a project only when `project_from_path` is set, or
//! when its slug matches the default project name (it is then dropped).

use core_runtime::config::{RestoreConfig, DEFAULT_PROJECT_NAME};
use serde_json::Value;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};
use walkdir::{DirEntry, WalkDir};

use crate::model::{slugify, FolderPath, FolderSegment, WorkflowFile};
use crate::{RestoreError, Result};

/// Credential export written next to workflow exports
const CREDENTIAL_FILE: &str = "credentials.json";

/// Credential export directory directly below the backup root
const CREDENTIAL_DIR: &str = "credentials";

/// Options controlling what the scanner picks up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Leading path removed before folder derivation
    pub path_prefix: Option<PathBuf>,
    pub default_project_name: String,
    /// Treat the first directory as a project name
    pub project_from_path: bool,
    /// Files and subtrees never visited, e.g. the staging directory and manifests
    pub exclude: Vec<PathBuf>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            path_prefix: None,
            default_project_name: DEFAULT_PROJECT_NAME.to_string(),
            project_from_path: false,
            exclude: Vec::new(),
        }
    }
}

impl From<&RestoreConfig> for ScanOptions {
    fn from(config: &RestoreConfig) -> Self {
        Self {
            path_prefix: config.path_prefix.clone(),
            default_project_name: config.default_project_name.clone(),
            project_from_path: config.project_from_path,
            exclude: [
                Some(&config.staging_dir),
                Some(&config.manifest_path),
                Some(&config.audit_log_path),
                config.prior_manifest_path.as_ref(),
            ]
            .into_iter()
            .flatten()
            .cloned()
            .collect(),
        }
    }
}

/// Scanner over one backup root
#[derive(Debug, Clone)]
pub struct TreeScanner {
    root: PathBuf,
    options: ScanOptions,
}

impl TreeScanner {
    pub fn new(root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            root: root.into(),
            options,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new pass over the tree
    pub fn scan(&self) -> ScanIter<'_> {
        ScanIter {
            scanner: self,
            walker: WalkDir::new(&self.root)
                .follow_links(false)
                .sort_by_file_name()
                .into_iter(),
        }
    }

    fn is_excluded(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if name.starts_with('.') {
            return true;
        }
        if entry.file_type().is_file() && name == CREDENTIAL_FILE {
            return true;
        }
        if entry.file_type().is_dir()
            && name == CREDENTIAL_DIR
            && self.relative_path(entry.path()).components().count() == 1
        {
            return true;
        }
        self.options
            .exclude
            .iter()
            .any(|excluded| entry.path().starts_with(excluded))
    }

    fn is_candidate_file(entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy().to_lowercase();
        entry.file_type().is_file() && name.ends_with(".json")
    }

    /// Path below the root with the configured prefix removed
    fn relative_path(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        let Some(prefix) = &self.options.path_prefix else {
            return relative.to_path_buf();
        };

        let normal: PathBuf = prefix
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect();
        path.strip_prefix(prefix)
            .or_else(|_| relative.strip_prefix(&normal))
            .unwrap_or(relative)
            .to_path_buf()
    }

    fn read_workflow(&self, entry: &DirEntry) -> Result<Option<WorkflowFile>> {
        let path = entry.path();
        let bytes = std::fs::read(path).map_err(|e| RestoreError::Scan {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let content: Value = serde_json::from_slice(&bytes).map_err(|e| RestoreError::Scan {
            path: path.to_path_buf(),
            message: format!("invalid JSON: {}", e),
        })?;

        if !is_workflow_definition(&content) {
            trace!(path = %path.display(), "Not a workflow definition");
            return Ok(None);
        }

        let relative_path = self.relative_path(path);
        let directories: Vec<String> = relative_path
            .parent()
            .map(|parent| {
                parent
                    .components()
                    .filter_map(|c| match c {
                        Component::Normal(segment) => Some(segment.to_string_lossy().into_owned()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let name = content
            .get("name")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| {
                path.file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned())
            })
            .unwrap_or_default();

        Ok(Some(WorkflowFile {
            declared_id: declared_id(&content),
            meta_instance_id: content
                .pointer("/meta/instanceId")
                .and_then(Value::as_str)
                .map(str::to_string),
            folder: derive_folder(&directories, &self.options),
            name,
            content,
            relative_path,
        }))
    }
}

/// Lazy pass over a backup tree
pub struct ScanIter<'a> {
    scanner: &'a TreeScanner,
    walker: walkdir::IntoIter,
}

impl Iterator for ScanIter<'_> {
    type Item = Result<WorkflowFile>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.walker.next()? {
                Ok(entry) => entry,
                Err(e) => {
                    return Some(Err(RestoreError::Scan {
                        path: e
                            .path()
                            .map(Path::to_path_buf)
                            .unwrap_or_else(|| self.scanner.root.clone()),
                        message: e.to_string(),
                    }))
                }
            };

            if self.scanner.is_excluded(&entry) {
                debug!(path = %entry.path().display(), "Skipping excluded entry");
                if entry.file_type().is_dir() {
                    self.walker.skip_current_dir();
                }
                continue;
            }

            if !TreeScanner::is_candidate_file(&entry) {
                continue;
            }

            match self.scanner.read_workflow(&entry) {
                Ok(Some(file)) => return Some(Ok(file)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// A JSON object with a node list or a connection map
fn is_workflow_definition(content: &Value) -> bool {
    content.as_object().is_some_and(|object| {
        object.get("nodes").is_some_and(Value::is_array)
            || object.get("connections").is_some_and(Value::is_object)
    })
}

fn declared_id(content: &Value) -> Option<String> {
    match content.get("id") {
        Some(Value::String(id)) if !id.trim().is_empty() => Some(id.trim().to_string()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    }
}

/// Map directory names below the root to a project and folder chain
pub fn derive_folder(directories: &[String], options: &ScanOptions) -> FolderPath {
    let mut segments = directories
        .iter()
        .map(|d| d.trim())
        .filter(|d| !d.is_empty());

    let mut path = FolderPath::default();
    let mut remaining: Vec<&str> = Vec::new();

    if let Some(first) = segments.next() {
        if slugify(first) == slugify(&options.default_project_name) {
            path = path.with_project(options.default_project_name.clone());
        } else if options.project_from_path {
            path = path.with_project(first);
        } else {
            remaining.push(first);
        }
    }
    remaining.extend(segments);

    path.segments = remaining.into_iter().map(FolderSegment::new).collect();
    path
}
