//! # Folder Synchronizer
//!
//! Moves each reconciled workflow into the folder its source file sat in,
//! creating missing folders level by level.
//!
//! ## State Machine
//!
//! ```text
//! Pending → FolderResolved → Assigned
//!    │            ├────────→ Unchanged
//!    │            ├────────→ Failed
//!    │            └────────→ LicenseBlocked
//!    ├──────────────────────→ Failed
//!    └──────────────────────→ LicenseBlocked
//! ```
//!
//! ## Behavior
//!
//! - A workflow already at its target is `Unchanged` and costs no call.
//! - The first license refusal disables folder creation for the rest of the
//!   run. Moves into folders that already exist still go ahead.
//! - A failure on one entry never stops the others.
//! - In dry-run mode nothing is sent and the index is left untouched; planned
//!   folders are tracked locally so the plan stays consistent.

use bridge_traits::{AssignmentOutcome, AutomationApi, Clock, FolderCreation, RemoteWorkflow};
use core_runtime::config::RestoreConfig;
use core_runtime::events::{CoreEvent, EventBus, RestoreEvent};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, info, instrument, warn};

use crate::index::RemoteEntityIndex;
use crate::manifest::ManifestEntry;
use crate::model::{FolderPath, FolderSegment};
use crate::report::{AuditRecord, AuditStatus};
use crate::{RestoreError, Result};

// ============================================================================
// State Types
// ============================================================================

/// Progress of one entry through folder synchronization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Pending,
    FolderResolved,
    Assigned,
    Unchanged,
    Failed,
    LicenseBlocked,
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Assigned
                | SyncState::Unchanged
                | SyncState::Failed
                | SyncState::LicenseBlocked
        )
    }

    pub fn can_transition_to(&self, to: SyncState) -> bool {
        matches!(
            (self, to),
            (
                SyncState::Pending,
                SyncState::FolderResolved | SyncState::Failed | SyncState::LicenseBlocked
            ) | (
                SyncState::FolderResolved,
                SyncState::Assigned
                    | SyncState::Unchanged
                    | SyncState::Failed
                    | SyncState::LicenseBlocked
            )
        )
    }

    /// Audit status of a terminal state
    pub fn audit_status(&self) -> Option<AuditStatus> {
        match self {
            SyncState::Assigned => Some(AuditStatus::Success),
            SyncState::Unchanged => Some(AuditStatus::Unchanged),
            SyncState::Failed => Some(AuditStatus::Failed),
            SyncState::LicenseBlocked => Some(AuditStatus::LicenseBlocked),
            SyncState::Pending | SyncState::FolderResolved => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Pending => "pending",
            SyncState::FolderResolved => "folder_resolved",
            SyncState::Assigned => "assigned",
            SyncState::Unchanged => "unchanged",
            SyncState::Failed => "failed",
            SyncState::LicenseBlocked => "license_blocked",
        }
    }
}

impl FromStr for SyncState {
    type Err = RestoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SyncState::Pending),
            "folder_resolved" => Ok(SyncState::FolderResolved),
            "assigned" => Ok(SyncState::Assigned),
            "unchanged" => Ok(SyncState::Unchanged),
            "failed" => Ok(SyncState::Failed),
            "license_blocked" => Ok(SyncState::LicenseBlocked),
            _ => Err(RestoreError::InvalidState(s.to_string())),
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One entry's walk through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryProgress {
    pub workflow_id: String,
    pub state: SyncState,
    pub folder_id: Option<String>,
    pub note: Option<String>,
}

impl EntryProgress {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            state: SyncState::Pending,
            folder_id: None,
            note: None,
        }
    }

    pub fn resolve_folder(&mut self, folder_id: Option<String>) -> Result<()> {
        self.transition(SyncState::FolderResolved)?;
        self.folder_id = folder_id;
        Ok(())
    }

    /// Move to a terminal state
    pub fn finish(&mut self, state: SyncState, note: Option<String>) -> Result<()> {
        if !state.is_terminal() {
            return Err(RestoreError::InvalidStateTransition {
                from: self.state.to_string(),
                to: state.to_string(),
            });
        }
        self.transition(state)?;
        self.note = note;
        Ok(())
    }

    fn transition(&mut self, to: SyncState) -> Result<()> {
        if !self.state.can_transition_to(to) {
            return Err(RestoreError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        Ok(())
    }
}

// ============================================================================
// Synchronizer
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Project that overrides every path-derived project
    pub target_project: Option<String>,
    pub dry_run: bool,
}

impl From<&RestoreConfig> for SyncOptions {
    fn from(config: &RestoreConfig) -> Self {
        Self {
            target_project: config.target_project.clone(),
            dry_run: config.dry_run,
        }
    }
}

/// Outcome of a synchronization pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub records: Vec<AuditRecord>,
    pub assigned: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub license_blocked: u64,
    /// Entries skipped because reconciliation found no workflow
    pub skipped_unreconciled: u64,
    pub folders_created: u64,
    /// Folders a dry run would create
    pub folders_planned: u64,
    /// First license refusal seen, if any
    pub license_message: Option<String>,
}

enum FolderResolution {
    /// Folder id, `None` for the project root
    Resolved(Option<String>),
    LicenseBlocked(String),
    Failed(String),
}

/// Applies manifest target folders to the remote instance
pub struct FolderSynchronizer<'a> {
    api: &'a dyn AutomationApi,
    index: &'a mut RemoteEntityIndex,
    clock: &'a dyn Clock,
    options: SyncOptions,
    events: Option<&'a EventBus>,
    run_id: String,
    license_blocked: Option<String>,
    planned: HashMap<(String, String), String>,
    report: SyncReport,
}

impl<'a> FolderSynchronizer<'a> {
    pub fn new(
        api: &'a dyn AutomationApi,
        index: &'a mut RemoteEntityIndex,
        clock: &'a dyn Clock,
        options: SyncOptions,
    ) -> Self {
        Self {
            api,
            index,
            clock,
            options,
            events: None,
            run_id: String::new(),
            license_blocked: None,
            planned: HashMap::new(),
            report: SyncReport::default(),
        }
    }

    pub fn with_events(mut self, events: &'a EventBus, run_id: impl Into<String>) -> Self {
        self.events = Some(events);
        self.run_id = run_id.into();
        self
    }

    /// Process every entry in manifest order
    #[instrument(skip(self, entries), fields(entries = entries.len(), dry_run = self.options.dry_run))]
    pub async fn sync(mut self, entries: &[ManifestEntry]) -> SyncReport {
        for entry in entries {
            let Some(workflow_id) = entry
                .actual_imported_id
                .as_deref()
                .filter(|_| entry.is_reconciled())
            else {
                debug!(path = %entry.storage_path, "Skipping unreconciled entry");
                self.report.skipped_unreconciled += 1;
                continue;
            };

            let project_id = self.target_project_id(entry);
            let progress = match self.sync_entry(entry, workflow_id, &project_id).await {
                Ok(progress) => progress,
                Err(e) => {
                    warn!(workflow_id, error = %e, "Entry synchronization failed");
                    EntryProgress {
                        workflow_id: workflow_id.to_string(),
                        state: SyncState::Failed,
                        folder_id: None,
                        note: Some(e.to_string()),
                    }
                }
            };
            self.record(entry, &project_id, progress);
        }

        info!(
            assigned = self.report.assigned,
            unchanged = self.report.unchanged,
            failed = self.report.failed,
            license_blocked = self.report.license_blocked,
            skipped = self.report.skipped_unreconciled,
            folders_created = self.report.folders_created,
            "Folder synchronization finished"
        );
        self.emit(RestoreEvent::SyncCompleted {
            run_id: self.run_id.clone(),
            assigned: self.report.assigned,
            unchanged: self.report.unchanged,
            failed: self.report.failed,
            license_blocked: self.report.license_blocked,
        });

        self.report
    }

    async fn sync_entry(
        &mut self,
        entry: &ManifestEntry,
        workflow_id: &str,
        project_id: &str,
    ) -> Result<EntryProgress> {
        let mut progress = EntryProgress::new(workflow_id);

        let workflow = match self.current_workflow(workflow_id).await {
            Ok(workflow) => workflow,
            Err(e) => {
                progress.finish(SyncState::Failed, Some(e.to_string()))?;
                return Ok(progress);
            }
        };

        let folder_id = match self.resolve_folder(project_id, &entry.target_folder).await {
            FolderResolution::Resolved(folder_id) => folder_id,
            FolderResolution::LicenseBlocked(message) => {
                progress.finish(SyncState::LicenseBlocked, Some(message))?;
                return Ok(progress);
            }
            FolderResolution::Failed(message) => {
                progress.finish(SyncState::Failed, Some(message))?;
                return Ok(progress);
            }
        };
        progress.resolve_folder(folder_id.clone())?;

        if let Some(current) = &workflow {
            if self.index.workflow_project_id(current) == project_id
                && current.parent_folder_id == folder_id
            {
                progress.finish(SyncState::Unchanged, None)?;
                return Ok(progress);
            }
        }

        if self.options.dry_run {
            let place = match entry.target_folder.display_path() {
                path if path.is_empty() => "project root".to_string(),
                path => path,
            };
            progress.finish(SyncState::Assigned, Some(format!("would move to {}", place)))?;
            return Ok(progress);
        }

        let version_id = workflow.as_ref().and_then(|w| w.version_id.clone());
        let outcome = self
            .api
            .update_workflow_assignment(
                workflow_id,
                project_id,
                folder_id.as_deref(),
                version_id.as_deref(),
            )
            .await;

        match outcome {
            Ok(AssignmentOutcome::Updated { version_id }) => {
                self.index.update_workflow_location(
                    workflow_id,
                    project_id,
                    folder_id.as_deref(),
                    version_id,
                );
                self.emit(RestoreEvent::WorkflowAssigned {
                    run_id: self.run_id.clone(),
                    workflow_id: workflow_id.to_string(),
                    folder_id: folder_id.clone(),
                });
                progress.finish(SyncState::Assigned, None)?;
            }
            Ok(AssignmentOutcome::VersionConflict { message }) => {
                let error = RestoreError::VersionConflict {
                    workflow_id: workflow_id.to_string(),
                    message,
                };
                warn!(%error, "Workflow changed since it was listed");
                progress.finish(SyncState::Failed, Some(error.to_string()))?;
            }
            Ok(AssignmentOutcome::LicenseRestricted { message }) => {
                self.block_license(&message);
                let error = RestoreError::LicenseRestricted(message);
                progress.finish(SyncState::LicenseBlocked, Some(error.to_string()))?;
            }
            Err(e) => {
                warn!(workflow_id, error = %e, "Workflow move failed");
                progress.finish(SyncState::Failed, Some(e.to_string()))?;
            }
        }

        Ok(progress)
    }

    /// Indexed record, refreshed from the instance when missing
    async fn current_workflow(&mut self, workflow_id: &str) -> Result<Option<RemoteWorkflow>> {
        if let Some(workflow) = self.index.workflow(workflow_id) {
            return Ok(Some(workflow.clone()));
        }
        if self.options.dry_run {
            return Ok(None);
        }

        debug!(workflow_id, "Workflow not indexed, fetching");
        let workflow = self.api.get_workflow(workflow_id).await?;
        self.index.upsert_workflow(workflow.clone());
        Ok(Some(workflow))
    }

    fn target_project_id(&self, entry: &ManifestEntry) -> String {
        self.index
            .target_project(self.options.target_project.as_deref(), &entry.target_folder)
            .id
            .clone()
    }

    async fn resolve_folder(&mut self, project_id: &str, target: &FolderPath) -> FolderResolution {
        let mut parent: Option<String> = None;
        let mut slug_path = String::new();

        for (depth, segment) in target.segments.iter().enumerate() {
            if depth > 0 {
                slug_path.push('/');
            }
            slug_path.push_str(&segment.slug.to_lowercase());

            if let Some(id) = self.lookup_folder(project_id, parent.as_deref(), &slug_path, segment)
            {
                parent = Some(id);
                continue;
            }

            if let Some(message) = &self.license_blocked {
                return FolderResolution::LicenseBlocked(format!(
                    "folder creation skipped: {}",
                    RestoreError::LicenseRestricted(message.clone())
                ));
            }

            if self.options.dry_run {
                let placeholder = format!("planned:{}", slug_path);
                self.planned
                    .insert((project_id.to_string(), slug_path.clone()), placeholder.clone());
                self.report.folders_planned += 1;
                parent = Some(placeholder);
                continue;
            }

            let created = self
                .api
                .create_folder(&segment.display_name, project_id, parent.as_deref())
                .await;
            match created {
                Ok(FolderCreation::Created(folder)) => {
                    let folder_id = folder.id.clone();
                    if let Err(duplicate) = self.index.record_created_folder(folder) {
                        warn!(%duplicate, "Created folder collides with an indexed folder");
                    }
                    self.report.folders_created += 1;
                    info!(folder_id = %folder_id, path = %slug_path, "Created folder");
                    self.emit(RestoreEvent::FolderCreated {
                        run_id: self.run_id.clone(),
                        folder_id: folder_id.clone(),
                        project_id: project_id.to_string(),
                        display_path: target.segments[..=depth]
                            .iter()
                            .map(|s| s.display_name.as_str())
                            .collect::<Vec<_>>()
                            .join("/"),
                    });
                    parent = Some(folder_id);
                }
                Ok(FolderCreation::LicenseRestricted { message }) => {
                    self.block_license(&message);
                    return FolderResolution::LicenseBlocked(
                        RestoreError::LicenseRestricted(message).to_string(),
                    );
                }
                Err(e) => {
                    warn!(path = %slug_path, error = %e, "Folder creation failed");
                    return FolderResolution::Failed(format!(
                        "folder '{}' could not be created: {}",
                        segment.display_name, e
                    ));
                }
            }
        }

        FolderResolution::Resolved(parent)
    }

    /// Full path, then slug, then name, then a scan of the parent's children
    fn lookup_folder(
        &self,
        project_id: &str,
        parent: Option<&str>,
        slug_path: &str,
        segment: &FolderSegment,
    ) -> Option<String> {
        if let Some(planned) = self
            .planned
            .get(&(project_id.to_string(), slug_path.to_string()))
        {
            return Some(planned.clone());
        }

        self.index
            .folder_by_path(project_id, slug_path)
            .or_else(|| self.index.child_by_slug(project_id, parent, &segment.slug))
            .or_else(|| {
                self.index
                    .child_by_name(project_id, parent, &segment.display_name)
            })
            .or_else(|| {
                self.index
                    .scan_children(project_id, parent, &segment.display_name, &segment.slug)
            })
            .map(|folder| folder.id.clone())
    }

    fn block_license(&mut self, message: &str) {
        if self.license_blocked.is_some() {
            return;
        }
        warn!(%message, "License restriction, folder creation disabled for this run");
        self.license_blocked = Some(message.to_string());
        self.report.license_message = Some(message.to_string());
        self.emit(RestoreEvent::LicenseBlocked {
            run_id: self.run_id.clone(),
            message: message.to_string(),
        });
    }

    fn record(&mut self, entry: &ManifestEntry, project_id: &str, progress: EntryProgress) {
        let Some(status) = progress.state.audit_status() else {
            return;
        };
        match status {
            AuditStatus::Success => self.report.assigned += 1,
            AuditStatus::Unchanged => self.report.unchanged += 1,
            AuditStatus::Failed => self.report.failed += 1,
            AuditStatus::LicenseBlocked => self.report.license_blocked += 1,
        }

        let note = if self.options.dry_run {
            Some(match progress.note {
                Some(note) => format!("dry run: {}", note),
                None => "dry run".to_string(),
            })
        } else {
            progress.note
        };

        self.report.records.push(AuditRecord {
            workflow_id: progress.workflow_id,
            workflow_name: entry.name.clone(),
            project_id: project_id.to_string(),
            folder_id: progress.folder_id,
            display_path: entry.target_folder.display_path(),
            status,
            note,
            timestamp: self.clock.now(),
        });
    }

    fn emit(&self, event: RestoreEvent) {
        if let Some(bus) = self.events {
            bus.emit(CoreEvent::Restore(event)).ok();
        }
    }
}
