//! # Restore Engine
//!
//! Drives one restore run through its phases. Each phase is a separate call so
//! the host can run the platform's own import between staging and
//! reconciliation:
//!
//! ```text
//! capture → load_index → stage ─┐
//!                               │  external import of the staging dir
//! capture ──────────────────────┴→ reconcile → load_index → sync → summarize
//! ```
//!
//! The manifest on disk is the hand-off between phases, so a run can resume
//! from any phase boundary.

use bridge_traits::{AutomationApi, Clock, RemoteSnapshot, SystemClock};
use core_runtime::config::RestoreConfig;
use core_runtime::events::{CoreEvent, EventBus, RestoreEvent};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::folder_sync::{FolderSynchronizer, SyncOptions, SyncReport};
use crate::index::{IndexOptions, RemoteEntityIndex};
use crate::manifest::{ManifestEntry, ManifestStore, PriorManifest};
use crate::model::RestoreRunId;
use crate::reconciler::{reconcile, ReconcileStats};
use crate::report::{summarize, AuditLog, RunSummary};
use crate::scanner::{ScanOptions, TreeScanner};
use crate::staging::{write_staged, StagingResolver};
use crate::{RestoreError, Result};

/// Result of the staging phase
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub entries: Vec<ManifestEntry>,
    pub creates: u64,
    pub updates: u64,
    /// Files that could not be read, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Facade over the restore phases
pub struct RestoreEngine {
    api: Arc<dyn AutomationApi>,
    config: RestoreConfig,
    clock: Arc<dyn Clock>,
    events: EventBus,
    run_id: RestoreRunId,
    manifest: ManifestStore,
    audit: AuditLog,
}

impl RestoreEngine {
    /// # Errors
    ///
    /// Returns an error if `config` fails validation.
    pub fn new(api: Arc<dyn AutomationApi>, config: RestoreConfig) -> Result<Self> {
        config.validate()?;
        let manifest = ManifestStore::new(config.file_system.clone(), &config.manifest_path);
        let audit = AuditLog::new(config.file_system.clone(), &config.audit_log_path);

        Ok(Self {
            api,
            config,
            clock: Arc::new(SystemClock),
            events: EventBus::default(),
            run_id: RestoreRunId::new(),
            manifest,
            audit,
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn run_id(&self) -> RestoreRunId {
        self.run_id
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn config(&self) -> &RestoreConfig {
        &self.config
    }

    pub fn manifest(&self) -> &ManifestStore {
        &self.manifest
    }

    /// Fetch the current remote state
    pub async fn capture(&self) -> Result<RemoteSnapshot> {
        let snapshot = self.api.snapshot().await?;
        info!(
            projects = snapshot.projects.len(),
            folders = snapshot.folders.len(),
            workflows = snapshot.workflows.len(),
            "Captured remote snapshot"
        );
        Ok(snapshot)
    }

    pub fn load_index(&self, snapshot: &RemoteSnapshot) -> Result<RemoteEntityIndex> {
        RemoteEntityIndex::load(snapshot, IndexOptions::from(&self.config))
    }

    /// Scan `root`, resolve identities, write staged copies and the manifest
    #[instrument(skip(self, root, index), fields(run_id = %self.run_id, root = %root.display()))]
    pub async fn stage(&self, root: &Path, index: &RemoteEntityIndex) -> Result<StageReport> {
        let scanner = TreeScanner::new(root, ScanOptions::from(&self.config));
        let scanned = tokio::task::spawn_blocking(move || scanner.scan().collect::<Vec<_>>())
            .await
            .map_err(|e| RestoreError::Scan {
                path: root.to_path_buf(),
                message: e.to_string(),
            })?;

        let mut files = Vec::with_capacity(scanned.len());
        let mut skipped = Vec::new();
        for item in scanned {
            match item {
                Ok(file) => files.push(file),
                Err(RestoreError::Scan { path, message }) => {
                    warn!(path = %path.display(), %message, "Skipping unreadable file");
                    skipped.push((path, message));
                }
                Err(e) => return Err(e),
            }
        }

        let prior = self.load_prior_manifest().await?;
        let mut resolver =
            StagingResolver::new(index, &self.config.policy, &self.config.staging_dir)
                .with_target_project(self.config.target_project.as_deref());
        if let Some(prior) = &prior {
            resolver = resolver.with_prior_manifest(prior);
        }
        let output = resolver.stage_all(files);

        write_staged(self.config.file_system.as_ref(), &output.copies).await?;
        self.manifest.write_atomic(&output.entries).await?;

        let report = StageReport {
            creates: output.creates() as u64,
            updates: output.updates() as u64,
            entries: output.entries,
            skipped,
        };
        info!(
            entries = report.entries.len(),
            creates = report.creates,
            updates = report.updates,
            skipped = report.skipped.len(),
            "Staging finished"
        );
        self.emit(RestoreEvent::StageCompleted {
            run_id: self.run_id.to_string(),
            entries: report.entries.len() as u64,
            creates: report.creates,
            updates: report.updates,
        });

        Ok(report)
    }

    /// Match manifest entries against the post-import state and persist the result
    #[instrument(skip(self, pre, post), fields(run_id = %self.run_id))]
    pub async fn reconcile(
        &self,
        pre: &RemoteSnapshot,
        post: &RemoteSnapshot,
    ) -> Result<(Vec<ManifestEntry>, ReconcileStats)> {
        let mut entries = self.manifest.read().await?;
        let stats = reconcile(&mut entries, pre, post);
        self.manifest.write_atomic(&entries).await?;

        self.emit(RestoreEvent::ReconcileCompleted {
            run_id: self.run_id.to_string(),
            reconciled: stats.reconciled,
            unreconciled: stats.unreconciled,
        });
        Ok((entries, stats))
    }

    /// Move reconciled workflows into their folders and append the audit log
    #[instrument(skip(self, index), fields(run_id = %self.run_id, dry_run = self.config.dry_run))]
    pub async fn sync(&self, index: &mut RemoteEntityIndex) -> Result<SyncReport> {
        let entries = self.manifest.read().await?;
        let report = FolderSynchronizer::new(
            self.api.as_ref(),
            index,
            self.clock.as_ref(),
            SyncOptions::from(&self.config),
        )
        .with_events(&self.events, self.run_id.to_string())
        .sync(&entries)
        .await;

        self.audit.append(&report.records).await?;
        Ok(report)
    }

    /// Summary of the manifest and a sync pass
    pub async fn summarize(&self, sync: &SyncReport) -> Result<RunSummary> {
        let entries = if self.manifest.exists().await? {
            self.manifest.read().await?
        } else {
            Vec::new()
        };
        let summary = summarize(&entries, &sync.records, self.config.dry_run);
        info!(%summary, "Run finished");
        Ok(summary)
    }

    async fn load_prior_manifest(&self) -> Result<Option<PriorManifest>> {
        let Some(path) = &self.config.prior_manifest_path else {
            return Ok(None);
        };
        let store = ManifestStore::new(self.config.file_system.clone(), path);
        if !store.exists().await? {
            warn!(path = %path.display(), "Prior manifest not found");
            return Ok(None);
        }
        Ok(Some(PriorManifest::from_entries(&store.read().await?)))
    }

    fn emit(&self, event: RestoreEvent) {
        self.events.emit(CoreEvent::Restore(event)).ok();
    }
}
