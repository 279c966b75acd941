//! # Staging Resolver
//!
//! Decides, for each scanned file, which remote workflow it becomes, then
//! produces a sanitized copy ready for import.
//!
//! ## Resolution order
//!
//! The first rule that applies wins:
//!
//! 1. `name+folder`: a remote workflow with the same name at the same location
//! 2. `name-only`: a remote workflow whose name is unique on the instance
//! 3. `manifest-id`: an id recorded for this file by a prior run, still present
//!    under the same name
//! 4. declared id has the wrong shape: cleared (`invalid_id_format`)
//! 5. `no_overwrite` policy: cleared (`no_overwrite_policy`)
//! 6. declared id belongs to a differently named workflow: cleared
//!    (`id_conflict_different_workflow`)
//! 7. declared id already claimed in this batch: cleared (`id_conflict_in_batch`)
//! 8. declared id kept: update if it exists remotely, else create
//!
//! With `preserve_ids` rules 1 to 3 are skipped. A remote id matched by rules
//! 1 to 3 is claimed for the batch; a later file that would match the same id
//! falls through to the declared-id rules.

use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use core_runtime::config::StagingPolicy;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, instrument};

use crate::index::RemoteEntityIndex;
use crate::manifest::{IntendedAction, ManifestEntry, MatchStrategy, PriorManifest, SanitizationNote};
use crate::model::{is_valid_workflow_id, FolderPath, FolderSegment, WorkflowFile};
use crate::{RestoreError, Result};

/// Sanitized workflow body and where it goes
#[derive(Debug, Clone, PartialEq)]
pub struct StagedCopy {
    pub staged_path: PathBuf,
    pub content: Value,
}

/// Output of a staging pass
#[derive(Debug, Clone, Default)]
pub struct StageOutput {
    pub entries: Vec<ManifestEntry>,
    pub copies: Vec<StagedCopy>,
}

impl StageOutput {
    pub fn creates(&self) -> usize {
        self.count(IntendedAction::Create)
    }

    pub fn updates(&self) -> usize {
        self.count(IntendedAction::Update)
    }

    fn count(&self, action: IntendedAction) -> usize {
        self.entries
            .iter()
            .filter(|e| e.intended_action == action)
            .count()
    }
}

/// Per-batch identity resolver
pub struct StagingResolver<'a> {
    index: &'a RemoteEntityIndex,
    policy: &'a StagingPolicy,
    prior: Option<&'a PriorManifest>,
    target_project: Option<&'a str>,
    staging_dir: PathBuf,
    claimed: HashSet<String>,
}

impl<'a> StagingResolver<'a> {
    pub fn new(
        index: &'a RemoteEntityIndex,
        policy: &'a StagingPolicy,
        staging_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            policy,
            prior: None,
            target_project: None,
            staging_dir: staging_dir.into(),
            claimed: HashSet::new(),
        }
    }

    pub fn with_prior_manifest(mut self, prior: &'a PriorManifest) -> Self {
        self.prior = Some(prior);
        self
    }

    /// Project that overrides every path-derived project, as in folder sync
    pub fn with_target_project(mut self, name: Option<&'a str>) -> Self {
        self.target_project = name;
        self
    }

    /// Resolve every file, in order
    pub fn stage_all(&mut self, files: impl IntoIterator<Item = WorkflowFile>) -> StageOutput {
        let mut output = StageOutput::default();
        for file in files {
            let (entry, copy) = self.resolve(&file);
            output.entries.push(entry);
            output.copies.push(copy);
        }
        output
    }

    /// Decide the identity of one file and build its sanitized copy
    pub fn resolve(&mut self, file: &WorkflowFile) -> (ManifestEntry, StagedCopy) {
        let target = self.target_folder(file);
        let mut entry = ManifestEntry::for_file(file, target.clone());

        let matched = if self.policy.preserve_ids {
            None
        } else {
            self.match_existing(file, &target)
        };

        match matched {
            Some((id, strategy)) => {
                debug!(name = %file.name, workflow_id = %id, %strategy, "Matched remote workflow");
                entry.assigned_id = Some(id.clone());
                entry.existing_id = Some(id);
                entry.match_strategy = Some(strategy);
                entry.intended_action = IntendedAction::Update;
            }
            None => self.apply_declared_id(file, &mut entry),
        }

        if let Some(id) = &entry.assigned_id {
            self.claimed.insert(id.clone());
        }

        let staged_path = self.staging_dir.join(&file.relative_path);
        entry.staged_path = Some(staged_path.to_string_lossy().into_owned());
        let copy = StagedCopy {
            content: sanitize(&file.content, entry.assigned_id.as_deref()),
            staged_path,
        };

        (entry, copy)
    }

    /// File location, or the override for files at the project root
    fn target_folder(&self, file: &WorkflowFile) -> FolderPath {
        let mut target = file.folder.clone();
        if target.is_root() {
            target.segments = self
                .policy
                .folder_override_segments()
                .into_iter()
                .map(FolderSegment::new)
                .collect();
        }
        target
    }

    fn match_existing(
        &self,
        file: &WorkflowFile,
        target: &FolderPath,
    ) -> Option<(String, MatchStrategy)> {
        let project = self.index.target_project(self.target_project, target);
        let unclaimed = |id: &&str| !self.claimed.contains(*id);

        if let Some(id) = self
            .index
            .find_by_location(&project.id, &target.display_path(), &file.name)
            .filter(unclaimed)
        {
            return Some((id.to_string(), MatchStrategy::NameFolder));
        }

        if let Some(id) = self.index.find_unique_name(&file.name).filter(unclaimed) {
            return Some((id.to_string(), MatchStrategy::NameOnly));
        }

        let prior = self.prior?;
        prior
            .candidates(file, target)
            .into_iter()
            .filter(unclaimed)
            .find(|id| {
                self.index
                    .workflow(id)
                    .is_some_and(|remote| remote.name == file.name)
            })
            .map(|id| (id.to_string(), MatchStrategy::ManifestId))
    }

    fn apply_declared_id(&self, file: &WorkflowFile, entry: &mut ManifestEntry) {
        let Some(declared) = file.declared_id.as_deref() else {
            return;
        };

        let note = if !is_valid_workflow_id(declared) {
            debug!(error = %RestoreError::InvalidIdFormat(declared.to_string()), path = %entry.storage_path, "Clearing id");
            Some(SanitizationNote::InvalidIdFormat)
        } else if self.policy.no_overwrite {
            Some(SanitizationNote::NoOverwritePolicy)
        } else if self
            .index
            .workflow(declared)
            .is_some_and(|remote| remote.name != file.name)
        {
            Some(SanitizationNote::IdConflictDifferentWorkflow)
        } else if self.claimed.contains(declared) {
            Some(SanitizationNote::IdConflictInBatch)
        } else {
            None
        };

        match note {
            Some(note) => {
                entry.sanitization_note = Some(note);
                entry.intended_action = IntendedAction::Create;
            }
            None => {
                entry.assigned_id = Some(declared.to_string());
                if self.index.workflow(declared).is_some() {
                    entry.existing_id = Some(declared.to_string());
                    entry.intended_action = IntendedAction::Update;
                }
            }
        }
    }
}

/// Copy of `content` with the id, tags and active flag normalized
pub fn sanitize(content: &Value, assigned_id: Option<&str>) -> Value {
    let mut object = content.as_object().cloned().unwrap_or_default();

    match assigned_id {
        Some(id) => {
            object.insert("id".to_string(), Value::String(id.to_string()));
        }
        None => {
            object.remove("id");
        }
    }

    if let Some(tags) = object.remove("tags") {
        object.insert("tags".to_string(), normalize_tags(&tags));
    }

    let active = object.get("active").map(coerce_bool).unwrap_or(false);
    object.insert("active".to_string(), Value::Bool(active));

    Value::Object(object)
}

/// `[{"name": ..}]`, trimmed, first spelling kept among case-insensitive duplicates
fn normalize_tags(tags: &Value) -> Value {
    let names: Vec<&str> = match tags {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(name) => Some(name.as_str()),
                Value::Object(tag) => tag.get("name").and_then(Value::as_str),
                _ => None,
            })
            .collect(),
        Value::String(list) => list.split(',').collect(),
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    let normalized = names
        .into_iter()
        .map(str::trim)
        .filter(|name| !name.is_empty() && seen.insert(name.to_lowercase()))
        .map(|name| {
            let mut tag = Map::new();
            tag.insert("name".to_string(), Value::String(name.to_string()));
            Value::Object(tag)
        })
        .collect();

    Value::Array(normalized)
}

fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => matches!(text.trim().to_lowercase().as_str(), "true" | "1" | "yes"),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// Write sanitized copies concurrently
#[instrument(skip(fs, copies), fields(count = copies.len()))]
pub async fn write_staged(fs: &dyn FileSystemAccess, copies: &[StagedCopy]) -> Result<()> {
    let writes = copies.iter().map(|copy| async move {
        let body = serde_json::to_vec_pretty(&copy.content).map_err(|e| RestoreError::Scan {
            path: copy.staged_path.clone(),
            message: e.to_string(),
        })?;
        fs.write_file(&copy.staged_path, Bytes::from(body)).await?;
        Ok::<(), RestoreError>(())
    });

    try_join_all(writes).await?;
    info!(count = copies.len(), "Wrote staged copies");
    Ok(())
}
