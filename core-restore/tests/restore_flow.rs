//! End-to-end restore runs against an in-memory instance and a real temp directory.

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{
    AssignmentOutcome, AutomationApi, BridgeError, FixedClock, FolderCreation, RemoteFolder,
    RemoteProject, RemoteSnapshot, RemoteWorkflow,
};
use chrono::{TimeZone, Utc};
use core_restore::reconciler::NOT_FOUND_WARNING;
use core_restore::{
    AuditRecord, AuditStatus, IntendedAction, ManifestStore, RestoreEngine, SanitizationNote,
    SummaryOutcome,
};
use core_runtime::config::RestoreConfig;
use core_runtime::events::{CoreEvent, RestoreEvent};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// In-memory instance
// ============================================================================

const PROJECT_ID: &str = "proj-personal";

#[derive(Default)]
struct InstanceState {
    folders: Vec<RemoteFolder>,
    workflows: Vec<RemoteWorkflow>,
    create_calls: usize,
    move_calls: usize,
    next_id: usize,
}

#[derive(Default)]
struct FakeInstance {
    state: Mutex<InstanceState>,
    license_restricted: bool,
}

impl FakeInstance {
    fn licensed() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn unlicensed() -> Arc<Self> {
        Arc::new(Self {
            license_restricted: true,
            ..Self::default()
        })
    }

    fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    fn move_calls(&self) -> usize {
        self.state.lock().unwrap().move_calls
    }

    fn workflow_named(&self, name: &str) -> RemoteWorkflow {
        self.state
            .lock()
            .unwrap()
            .workflows
            .iter()
            .find(|w| w.name == name)
            .cloned()
            .unwrap()
    }

    fn folder(&self, id: &str) -> RemoteFolder {
        self.state
            .lock()
            .unwrap()
            .folders
            .iter()
            .find(|f| f.id == id)
            .cloned()
            .unwrap()
    }

    /// Import every staged file the way the platform's CLI would: keep a
    /// supplied id, otherwise generate one, and land at the project root.
    fn import(&self, staging_dir: &Path, skip_names: &[&str]) {
        let mut files = Vec::new();
        collect_json(staging_dir, &mut files);
        files.sort();

        let mut state = self.state.lock().unwrap();
        for path in files {
            let content: Value =
                serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
            let name = content["name"].as_str().unwrap().to_string();
            if skip_names.contains(&name.as_str()) {
                continue;
            }
            let meta = content
                .pointer("/meta/instanceId")
                .and_then(Value::as_str)
                .map(str::to_string);

            match content.get("id").and_then(Value::as_str) {
                Some(id) if state.workflows.iter().any(|w| w.id == id) => {
                    let existing = state.workflows.iter_mut().find(|w| w.id == id).unwrap();
                    existing.name = name;
                    existing.version_id = Some(format!("{}-reimported", id));
                }
                supplied => {
                    state.next_id += 1;
                    let id = supplied
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("gen{:013}", state.next_id));
                    state.workflows.push(RemoteWorkflow {
                        version_id: Some(format!("{}-v1", id)),
                        id,
                        name,
                        parent_folder_id: None,
                        home_project_id: Some(PROJECT_ID.to_string()),
                        meta_instance_id: meta,
                    });
                }
            }
        }
    }
}

fn collect_json(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_json(&path, out);
        } else if path.extension().is_some_and(|e| e == "json") {
            out.push(path);
        }
    }
}

#[async_trait]
impl AutomationApi for FakeInstance {
    async fn list_projects(&self) -> BridgeResult<Vec<RemoteProject>> {
        Ok(vec![RemoteProject {
            id: PROJECT_ID.to_string(),
            name: "Personal".to_string(),
            slug: None,
            project_type: Some("personal".to_string()),
        }])
    }

    async fn list_folders(&self) -> BridgeResult<Vec<RemoteFolder>> {
        Ok(self.state.lock().unwrap().folders.clone())
    }

    async fn list_workflows(&self) -> BridgeResult<Vec<RemoteWorkflow>> {
        Ok(self.state.lock().unwrap().workflows.clone())
    }

    async fn get_workflow(&self, id: &str) -> BridgeResult<RemoteWorkflow> {
        self.state
            .lock()
            .unwrap()
            .workflows
            .iter()
            .find(|w| w.id == id)
            .cloned()
            .ok_or_else(|| BridgeError::Remote {
                status: 404,
                message: format!("workflow {} not found", id),
            })
    }

    async fn create_folder(
        &self,
        name: &str,
        project_id: &str,
        parent_folder_id: Option<&str>,
    ) -> BridgeResult<FolderCreation> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        if self.license_restricted {
            return Ok(FolderCreation::LicenseRestricted {
                message: "Plan lacks support for folders".to_string(),
            });
        }
        let folder = RemoteFolder {
            id: format!("folder-{}", state.folders.len() + 1),
            name: name.to_string(),
            slug: None,
            parent_folder_id: parent_folder_id.map(str::to_string),
            project_id: project_id.to_string(),
        };
        state.folders.push(folder.clone());
        Ok(FolderCreation::Created(folder))
    }

    async fn update_workflow_assignment(
        &self,
        workflow_id: &str,
        project_id: &str,
        folder_id: Option<&str>,
        _version_id: Option<&str>,
    ) -> BridgeResult<AssignmentOutcome> {
        let mut state = self.state.lock().unwrap();
        state.move_calls += 1;
        let workflow = state
            .workflows
            .iter_mut()
            .find(|w| w.id == workflow_id)
            .ok_or_else(|| BridgeError::Remote {
                status: 404,
                message: format!("workflow {} not found", workflow_id),
            })?;
        workflow.home_project_id = Some(project_id.to_string());
        workflow.parent_folder_id = folder_id.map(str::to_string);
        workflow.version_id = Some(format!("{}-moved", workflow_id));
        Ok(AssignmentOutcome::Updated {
            version_id: workflow.version_id.clone(),
        })
    }
}

// ============================================================================
// Fixtures
// ============================================================================

struct Workspace {
    backup: TempDir,
    work: TempDir,
}

impl Workspace {
    fn new() -> Self {
        Self {
            backup: TempDir::new().unwrap(),
            work: TempDir::new().unwrap(),
        }
    }

    fn write(&self, relative: &str, content: Value) {
        let path = self.backup.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, serde_json::to_string_pretty(&content).unwrap()).unwrap();
    }

    fn staging_dir(&self) -> PathBuf {
        self.work.path().join("staging")
    }

    fn manifest_path(&self) -> PathBuf {
        self.work.path().join("manifest.ndjson")
    }

    fn audit_path(&self) -> PathBuf {
        self.work.path().join("audit.ndjson")
    }

    fn config(&self, dry_run: bool) -> RestoreConfig {
        RestoreConfig::builder()
            .manifest_path(self.manifest_path())
            .audit_log_path(self.audit_path())
            .staging_dir(self.staging_dir())
            .dry_run(dry_run)
            .file_system(Arc::new(TokioFileSystem))
            .build()
            .unwrap()
    }

    fn engine(&self, api: Arc<FakeInstance>, dry_run: bool) -> RestoreEngine {
        RestoreEngine::new(api, self.config(dry_run))
            .unwrap()
            .with_clock(Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            )))
    }

    fn audit_records(&self) -> Vec<AuditRecord> {
        std::fs::read_to_string(self.audit_path())
            .unwrap_or_default()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn workflow_json(id: Option<&str>, name: &str) -> Value {
    let mut value = json!({
        "name": name,
        "nodes": [],
        "connections": {},
        "active": "true",
        "tags": "ops, Ops",
    });
    if let Some(id) = id {
        value["id"] = json!(id);
    }
    value
}

/// Stage, import, reconcile and sync once
async fn run_once(
    engine: &RestoreEngine,
    api: &FakeInstance,
    root: &Path,
    skip_names: &[&str],
) -> (core_restore::SyncReport, core_restore::RunSummary) {
    let before = engine.capture().await.unwrap();
    let index = engine.load_index(&before).unwrap();
    engine.stage(root, &index).await.unwrap();

    api.import(&engine.config().staging_dir, skip_names);

    let after: RemoteSnapshot = engine.capture().await.unwrap();
    engine.reconcile(&before, &after).await.unwrap();
    let mut index = engine.load_index(&after).unwrap();
    let report = engine.sync(&mut index).await.unwrap();
    let summary = engine.summarize(&report).await.unwrap();
    (report, summary)
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_restore_places_workflows_and_second_run_is_unchanged() {
    let ws = Workspace::new();
    ws.write("Sales/Leads/alpha.json", workflow_json(Some("AlphaWorkflow001"), "Alpha"));
    ws.write("beta.json", workflow_json(None, "Beta"));
    ws.write(".git/objects.json", workflow_json(None, "Hidden"));
    ws.write("credentials.json", json!({"name": "secret", "nodes": []}));
    let api = FakeInstance::licensed();

    let engine = ws.engine(api.clone(), false);
    let (report, summary) = run_once(&engine, &api, ws.backup.path(), &[]).await;

    assert_eq!(report.folders_created, 2);
    assert_eq!(report.assigned, 1);
    assert_eq!(report.unchanged, 1);
    assert_eq!(summary.total, 2);
    assert_eq!(summary.outcome(), SummaryOutcome::Clean);

    let alpha = api.workflow_named("Alpha");
    assert_eq!(alpha.id, "AlphaWorkflow001");
    let leads = api.folder(alpha.parent_folder_id.as_deref().unwrap());
    assert_eq!(leads.name, "Leads");
    let sales = api.folder(leads.parent_folder_id.as_deref().unwrap());
    assert_eq!(sales.name, "Sales");
    assert_eq!(sales.parent_folder_id, None);
    assert_eq!(api.workflow_named("Beta").parent_folder_id, None);

    let second = ws.engine(api.clone(), false);
    let (report, summary) = run_once(&second, &api, ws.backup.path(), &[]).await;

    assert_eq!(report.unchanged, 2);
    assert_eq!(report.assigned, 0);
    assert_eq!(report.folders_created, 0);
    assert_eq!(summary.updated, 2);
    assert_eq!(api.create_calls(), 2);
    assert_eq!(api.move_calls(), 1);
    assert_eq!(
        second.manifest().read().await.unwrap()[0].existing_id.as_deref(),
        Some("AlphaWorkflow001")
    );
    assert_eq!(ws.audit_records().len(), 4);
}

#[tokio::test]
async fn test_staged_copies_are_sanitized_and_manifest_persists() {
    let ws = Workspace::new();
    ws.write("a/one.json", workflow_json(Some("DuplicateId00001"), "One"));
    ws.write("b/two.json", workflow_json(Some("DuplicateId00001"), "Two"));
    ws.write("c/short.json", workflow_json(Some("abc"), "Short"));
    let api = FakeInstance::licensed();
    let engine = ws.engine(api.clone(), false);

    let index = engine.load_index(&engine.capture().await.unwrap()).unwrap();
    let staged = engine.stage(ws.backup.path(), &index).await.unwrap();

    assert_eq!(staged.entries.len(), 3);
    assert_eq!(staged.creates, 3);
    assert_eq!(staged.entries[0].assigned_id.as_deref(), Some("DuplicateId00001"));
    assert_eq!(staged.entries[1].assigned_id, None);
    assert_eq!(
        staged.entries[1].sanitization_note,
        Some(SanitizationNote::IdConflictInBatch)
    );
    assert_eq!(
        staged.entries[2].sanitization_note,
        Some(SanitizationNote::InvalidIdFormat)
    );

    let copy: Value = serde_json::from_str(
        &std::fs::read_to_string(ws.staging_dir().join("b/two.json")).unwrap(),
    )
    .unwrap();
    assert!(copy.get("id").is_none());
    assert_eq!(copy["active"], json!(true));
    assert_eq!(copy["tags"], json!([{"name": "ops"}]));

    let persisted = ManifestStore::new(Arc::new(TokioFileSystem), ws.manifest_path())
        .read()
        .await
        .unwrap();
    assert_eq!(persisted, staged.entries);
}

#[tokio::test]
async fn test_same_name_in_two_folders_stages_two_creates() {
    let ws = Workspace::new();
    ws.write("Sales/untitled.json", workflow_json(None, "Untitled"));
    ws.write("Support/untitled.json", workflow_json(None, "Untitled"));
    let api = FakeInstance::licensed();
    let engine = ws.engine(api.clone(), false);

    let index = engine.load_index(&engine.capture().await.unwrap()).unwrap();
    let staged = engine.stage(ws.backup.path(), &index).await.unwrap();

    assert_eq!(staged.creates, 2);
    assert_eq!(staged.updates, 0);

    let persisted = engine.manifest().read().await.unwrap();
    assert_eq!(persisted.len(), 2);
    for entry in &persisted {
        assert_eq!(entry.name, "Untitled");
        assert_eq!(entry.intended_action, IntendedAction::Create);
        assert_eq!(entry.assigned_id, None);
        assert_eq!(entry.existing_id, None);
        assert_eq!(entry.sanitization_note, None);
    }
    assert_ne!(persisted[0].target_folder, persisted[1].target_folder);
}

#[tokio::test]
async fn test_license_refusal_stops_folder_creation() {
    let ws = Workspace::new();
    ws.write("Sales/alpha.json", workflow_json(None, "Alpha"));
    ws.write("Support/bravo.json", workflow_json(None, "Bravo"));
    ws.write("root.json", workflow_json(None, "Root"));
    let api = FakeInstance::unlicensed();
    let engine = ws.engine(api.clone(), false);

    let (report, summary) = run_once(&engine, &api, ws.backup.path(), &[]).await;

    assert_eq!(api.create_calls(), 1);
    assert_eq!(report.license_blocked, 2);
    assert_eq!(report.unchanged, 1);
    assert_eq!(summary.failed, 0);
    assert!(report.license_message.is_some());

    let blocked: Vec<_> = ws
        .audit_records()
        .into_iter()
        .filter(|r| r.status == AuditStatus::LicenseBlocked)
        .collect();
    assert_eq!(blocked.len(), 2);
    assert!(blocked
        .iter()
        .any(|r| r.note.as_deref().is_some_and(|n| n.starts_with("folder creation skipped"))));
}

#[tokio::test]
async fn test_dry_run_plans_without_remote_changes() {
    let ws = Workspace::new();
    ws.write("Sales/Leads/alpha.json", workflow_json(None, "Alpha"));
    let api = FakeInstance::licensed();
    let engine = ws.engine(api.clone(), true);

    let (report, summary) = run_once(&engine, &api, ws.backup.path(), &[]).await;

    assert_eq!(api.create_calls(), 0);
    assert_eq!(api.move_calls(), 0);
    assert_eq!(report.folders_planned, 2);
    assert_eq!(report.assigned, 1);
    assert_eq!(
        report.records[0].note.as_deref(),
        Some("dry run: would move to Sales/Leads")
    );
    assert!(summary.to_string().starts_with("[dry run] "));
}

#[tokio::test]
async fn test_missing_import_is_reported_as_failure() {
    let ws = Workspace::new();
    ws.write("alpha.json", workflow_json(None, "Alpha"));
    ws.write("beta.json", workflow_json(None, "Beta"));
    let api = FakeInstance::licensed();
    let engine = ws.engine(api.clone(), false);

    let (report, summary) = run_once(&engine, &api, ws.backup.path(), &["Beta"]).await;

    let entries = engine.manifest().read().await.unwrap();
    let beta = entries.iter().find(|e| e.name == "Beta").unwrap();
    assert_eq!(beta.id_reconciled, Some(false));
    assert_eq!(beta.id_reconciliation_warning.as_deref(), Some(NOT_FOUND_WARNING));
    assert_eq!(report.skipped_unreconciled, 1);
    assert_eq!(summary.unreconciled, 1);
    assert_eq!(summary.outcome(), SummaryOutcome::WithFailures(1));
}

#[tokio::test]
async fn test_empty_tree_is_nothing_to_do() {
    let ws = Workspace::new();
    let api = FakeInstance::licensed();
    let engine = ws.engine(api.clone(), false);
    let mut events = engine.events().subscribe();

    let (report, summary) = run_once(&engine, &api, ws.backup.path(), &[]).await;

    assert!(report.records.is_empty());
    assert_eq!(summary.outcome(), SummaryOutcome::NothingToDo);
    assert_eq!(summary.to_string(), "nothing to do: no workflows found");

    match events.try_recv().unwrap() {
        CoreEvent::Restore(RestoreEvent::StageCompleted { entries, .. }) => assert_eq!(entries, 0),
        other => panic!("unexpected event: {:?}", other),
    }
}
