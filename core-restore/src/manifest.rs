//! # Staging Manifest
//!
//! One [`ManifestEntry`] per staged workflow, persisted as newline-delimited
//! JSON. Staging writes the identity decision; reconciliation adds the id the
//! instance actually assigned.
//!
//! The manifest is always replaced as a whole through
//! [`FileSystemAccess::write_atomic`], so a reader never sees a partial file.

use bridge_traits::FileSystemAccess;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::model::{FolderPath, WorkflowFile};
use crate::{RestoreError, Result};

// ============================================================================
// Decision Types
// ============================================================================

/// Which rule tied a file to an existing remote workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchStrategy {
    #[serde(rename = "name+folder")]
    NameFolder,
    #[serde(rename = "name-only")]
    NameOnly,
    #[serde(rename = "manifest-id")]
    ManifestId,
}

impl MatchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStrategy::NameFolder => "name+folder",
            MatchStrategy::NameOnly => "name-only",
            MatchStrategy::ManifestId => "manifest-id",
        }
    }
}

impl std::fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntendedAction {
    Create,
    Update,
}

impl IntendedAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntendedAction::Create => "create",
            IntendedAction::Update => "update",
        }
    }
}

/// Why a declared id was cleared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanitizationNote {
    InvalidIdFormat,
    NoOverwritePolicy,
    IdConflictDifferentWorkflow,
    IdConflictInBatch,
}

impl SanitizationNote {
    pub fn as_str(&self) -> &'static str {
        match self {
            SanitizationNote::InvalidIdFormat => "invalid_id_format",
            SanitizationNote::NoOverwritePolicy => "no_overwrite_policy",
            SanitizationNote::IdConflictDifferentWorkflow => "id_conflict_different_workflow",
            SanitizationNote::IdConflictInBatch => "id_conflict_in_batch",
        }
    }
}

impl std::fmt::Display for SanitizationNote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How reconciliation found the imported workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    AssignedId,
    ExistingId,
    OriginalId,
    MetaInstanceId,
    NewNameMatch,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionStrategy::AssignedId => "assigned-id",
            ResolutionStrategy::ExistingId => "existing-id",
            ResolutionStrategy::OriginalId => "original-id",
            ResolutionStrategy::MetaInstanceId => "meta-instance-id",
            ResolutionStrategy::NewNameMatch => "new-name-match",
        }
    }
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Manifest Entry
// ============================================================================

/// Identity decision and outcome for one staged workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    /// Id declared by the source file
    pub original_id: Option<String>,
    /// Id written into the staged copy; `None` lets the instance pick one
    pub assigned_id: Option<String>,
    /// Id of the remote workflow this entry updates
    pub existing_id: Option<String>,
    pub match_strategy: Option<MatchStrategy>,
    pub intended_action: IntendedAction,
    pub sanitization_note: Option<SanitizationNote>,
    /// Source path relative to the scan root
    pub storage_path: String,
    pub target_folder: FolderPath,

    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_imported_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_reconciled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_resolution_strategy: Option<ResolutionStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_reconciliation_warning: Option<String>,
}

impl ManifestEntry {
    /// Entry for a file before any identity decision
    pub fn for_file(file: &WorkflowFile, target_folder: FolderPath) -> Self {
        Self {
            original_id: file.declared_id.clone(),
            assigned_id: None,
            existing_id: None,
            match_strategy: None,
            intended_action: IntendedAction::Create,
            sanitization_note: None,
            storage_path: file.storage_path(),
            target_folder,
            name: file.name.clone(),
            meta_instance_id: file.meta_instance_id.clone(),
            staged_path: None,
            actual_imported_id: None,
            id_reconciled: None,
            id_resolution_strategy: None,
            id_reconciliation_warning: None,
        }
    }

    pub fn is_reconciled(&self) -> bool {
        self.id_reconciled == Some(true) && self.actual_imported_id.is_some()
    }

    /// Best-known remote id: reconciled first, then assigned
    pub fn effective_id(&self) -> Option<&str> {
        self.actual_imported_id
            .as_deref()
            .or(self.assigned_id.as_deref())
    }
}

// ============================================================================
// Manifest Store
// ============================================================================

/// NDJSON manifest file
#[derive(Clone)]
pub struct ManifestStore {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> Result<bool> {
        Ok(self.fs.exists(&self.path).await?)
    }

    /// Replace the manifest with `entries`
    pub async fn write_atomic(&self, entries: &[ManifestEntry]) -> Result<()> {
        let mut buffer = Vec::with_capacity(entries.len() * 256);
        for (i, entry) in entries.iter().enumerate() {
            serde_json::to_writer(&mut buffer, entry).map_err(|e| RestoreError::Manifest {
                line: i + 1,
                message: e.to_string(),
            })?;
            buffer.push(b'\n');
        }

        self.fs.write_atomic(&self.path, bytes::Bytes::from(buffer)).await?;
        debug!(path = %self.path.display(), entries = entries.len(), "Wrote manifest");
        Ok(())
    }

    /// Read every entry; blank lines are ignored
    pub async fn read(&self) -> Result<Vec<ManifestEntry>> {
        let bytes = self.fs.read_file(&self.path).await?;
        parse_manifest(&bytes)
    }
}

/// Parse NDJSON manifest content
pub fn parse_manifest(bytes: &[u8]) -> Result<Vec<ManifestEntry>> {
    let text = std::str::from_utf8(bytes).map_err(|e| RestoreError::Manifest {
        line: 0,
        message: e.to_string(),
    })?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|e| RestoreError::Manifest {
                line: i + 1,
                message: e.to_string(),
            })
        })
        .collect()
}

// ============================================================================
// Prior Manifest Lookup
// ============================================================================

/// Ids recorded by an earlier run, keyed three ways
#[derive(Debug, Clone, Default)]
pub struct PriorManifest {
    by_path: HashMap<String, String>,
    by_original_id: HashMap<String, String>,
    by_folder_name: HashMap<(String, String), String>,
}

impl PriorManifest {
    pub fn from_entries(entries: &[ManifestEntry]) -> Self {
        let mut prior = Self::default();
        for entry in entries {
            let Some(id) = entry.effective_id() else {
                continue;
            };
            prior
                .by_path
                .entry(entry.storage_path.clone())
                .or_insert_with(|| id.to_string());
            if let Some(original) = &entry.original_id {
                prior
                    .by_original_id
                    .entry(original.clone())
                    .or_insert_with(|| id.to_string());
            }
            prior
                .by_folder_name
                .entry((entry.target_folder.display_path(), entry.name.clone()))
                .or_insert_with(|| id.to_string());
        }
        prior
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Candidate ids for a file: same path, then same declared id, then same
    /// folder and name
    pub fn candidates(&self, file: &WorkflowFile, folder: &FolderPath) -> Vec<&str> {
        let found = [
            self.by_path.get(&file.storage_path()),
            file.declared_id
                .as_ref()
                .and_then(|declared| self.by_original_id.get(declared)),
            self.by_folder_name
                .get(&(folder.display_path(), file.name.clone())),
        ];

        let mut ids: Vec<&str> = Vec::with_capacity(found.len());
        for id in found.into_iter().flatten() {
            if !ids.contains(&id.as_str()) {
                ids.push(id.as_str());
            }
        }
        ids
    }
}
