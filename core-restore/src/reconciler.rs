//! # Post-Import Reconciler
//!
//! Works out which remote workflow each manifest entry became once the
//! external import has run, by comparing snapshots taken before and after.
//!
//! Strategies run in a fixed order and the first unambiguous match wins:
//!
//! | Strategy | Candidate |
//! |----------|-----------|
//! | `assigned-id` | id written into the staged copy |
//! | `existing-id` | remote workflow the entry updated, if its id was not cleared |
//! | `original-id` | id declared by the source file, if it was not cleared |
//! | `meta-instance-id` | sole post-import workflow with the same `meta.instanceId` |
//! | `new-name-match` | sole newly appeared workflow with the same name |
//!
//! Ambiguous candidates are never resolved automatically; they leave a warning
//! on the entry.

use bridge_traits::{RemoteSnapshot, RemoteWorkflow};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

use crate::manifest::{ManifestEntry, ResolutionStrategy};
use crate::RestoreError;

/// Warning left on entries nothing matched
pub const NOT_FOUND_WARNING: &str = "workflow not found after import";

/// Result of one strategy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    Matched(String),
    Ambiguous(String),
    NoMatch,
}

/// Counts from one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    pub reconciled: u64,
    pub unreconciled: u64,
    pub ambiguous: u64,
}

/// Lookups over the post-import snapshot
pub struct ReconcileContext<'a> {
    post_ids: HashSet<&'a str>,
    by_meta_instance: HashMap<String, Vec<&'a RemoteWorkflow>>,
    new_by_name: HashMap<String, Vec<&'a RemoteWorkflow>>,
}

impl<'a> ReconcileContext<'a> {
    pub fn new(pre: &RemoteSnapshot, post: &'a RemoteSnapshot) -> Self {
        let pre_ids: HashSet<&str> = pre.workflows.iter().map(|w| w.id.as_str()).collect();

        let mut by_meta_instance: HashMap<String, Vec<&RemoteWorkflow>> = HashMap::new();
        let mut new_by_name: HashMap<String, Vec<&RemoteWorkflow>> = HashMap::new();
        for workflow in &post.workflows {
            if let Some(meta) = &workflow.meta_instance_id {
                by_meta_instance
                    .entry(meta.to_lowercase())
                    .or_default()
                    .push(workflow);
            }
            if !pre_ids.contains(workflow.id.as_str()) {
                new_by_name
                    .entry(workflow.name.to_lowercase())
                    .or_default()
                    .push(workflow);
            }
        }

        Self {
            post_ids: post.workflows.iter().map(|w| w.id.as_str()).collect(),
            by_meta_instance,
            new_by_name,
        }
    }

    fn present(&self, id: Option<&str>) -> MatchOutcome {
        match id {
            Some(id) if self.post_ids.contains(id) => MatchOutcome::Matched(id.to_string()),
            _ => MatchOutcome::NoMatch,
        }
    }
}

type Matcher = fn(&ManifestEntry, &ReconcileContext<'_>) -> MatchOutcome;

const STRATEGIES: &[(ResolutionStrategy, Matcher)] = &[
    (ResolutionStrategy::AssignedId, match_assigned_id),
    (ResolutionStrategy::ExistingId, match_existing_id),
    (ResolutionStrategy::OriginalId, match_original_id),
    (ResolutionStrategy::MetaInstanceId, match_meta_instance_id),
    (ResolutionStrategy::NewNameMatch, match_new_name),
];

fn match_assigned_id(entry: &ManifestEntry, ctx: &ReconcileContext<'_>) -> MatchOutcome {
    ctx.present(entry.assigned_id.as_deref())
}

fn match_existing_id(entry: &ManifestEntry, ctx: &ReconcileContext<'_>) -> MatchOutcome {
    if entry.sanitization_note.is_some() {
        return MatchOutcome::NoMatch;
    }
    ctx.present(entry.existing_id.as_deref())
}

fn match_original_id(entry: &ManifestEntry, ctx: &ReconcileContext<'_>) -> MatchOutcome {
    if entry.sanitization_note.is_some() {
        return MatchOutcome::NoMatch;
    }
    ctx.present(entry.original_id.as_deref())
}

fn match_meta_instance_id(entry: &ManifestEntry, ctx: &ReconcileContext<'_>) -> MatchOutcome {
    let Some(meta) = entry.meta_instance_id.as_deref() else {
        return MatchOutcome::NoMatch;
    };
    unique(
        &entry.name,
        ctx.by_meta_instance.get(&meta.to_lowercase()),
    )
}

fn match_new_name(entry: &ManifestEntry, ctx: &ReconcileContext<'_>) -> MatchOutcome {
    unique(&entry.name, ctx.new_by_name.get(&entry.name.to_lowercase()))
}

fn unique(name: &str, candidates: Option<&Vec<&RemoteWorkflow>>) -> MatchOutcome {
    match candidates.map(Vec::as_slice) {
        None | Some([]) => MatchOutcome::NoMatch,
        Some([only]) => MatchOutcome::Matched(only.id.clone()),
        Some(many) => MatchOutcome::Ambiguous(
            RestoreError::AmbiguousMatch {
                name: name.to_string(),
                candidates: many.iter().map(|w| w.id.clone()).collect(),
            }
            .to_string(),
        ),
    }
}

/// Fill in the reconciliation fields of every entry
///
/// Entries are updated in place; the caller persists them.
pub fn reconcile(
    entries: &mut [ManifestEntry],
    pre: &RemoteSnapshot,
    post: &RemoteSnapshot,
) -> ReconcileStats {
    let ctx = ReconcileContext::new(pre, post);
    let mut stats = ReconcileStats::default();

    for entry in entries.iter_mut() {
        let mut warnings = Vec::new();
        let mut resolved = None;

        for (strategy, matcher) in STRATEGIES {
            match matcher(entry, &ctx) {
                MatchOutcome::Matched(id) => {
                    resolved = Some((id, *strategy));
                    break;
                }
                MatchOutcome::Ambiguous(warning) => warnings.push(warning),
                MatchOutcome::NoMatch => {}
            }
        }

        if !warnings.is_empty() {
            stats.ambiguous += 1;
        }

        match resolved {
            Some((id, strategy)) => {
                debug!(path = %entry.storage_path, workflow_id = %id, %strategy, "Reconciled entry");
                entry.actual_imported_id = Some(id);
                entry.id_reconciled = Some(true);
                entry.id_resolution_strategy = Some(strategy);
                entry.id_reconciliation_warning =
                    (!warnings.is_empty()).then(|| warnings.join("; "));
                stats.reconciled += 1;
            }
            None => {
                let warning = if warnings.is_empty() {
                    NOT_FOUND_WARNING.to_string()
                } else {
                    warnings.join("; ")
                };
                warn!(path = %entry.storage_path, name = %entry.name, %warning, "Entry not reconciled");
                entry.actual_imported_id = None;
                entry.id_reconciled = Some(false);
                entry.id_resolution_strategy = None;
                entry.id_reconciliation_warning = Some(warning);
                stats.unreconciled += 1;
            }
        }
    }

    info!(
        reconciled = stats.reconciled,
        unreconciled = stats.unreconciled,
        ambiguous = stats.ambiguous,
        "Reconciliation finished"
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{IntendedAction, SanitizationNote};
    use crate::model::FolderPath;

    fn workflow(id: &str, name: &str, meta: Option<&str>) -> RemoteWorkflow {
        RemoteWorkflow {
            id: id.to_string(),
            name: name.to_string(),
            version_id: None,
            parent_folder_id: None,
            home_project_id: None,
            meta_instance_id: meta.map(str::to_string),
        }
    }

    fn entry(name: &str) -> ManifestEntry {
        ManifestEntry {
            original_id: None,
            assigned_id: None,
            existing_id: None,
            match_strategy: None,
            intended_action: IntendedAction::Create,
            sanitization_note: None,
            storage_path: format!("{}.json", name),
            target_folder: FolderPath::default(),
            name: name.to_string(),
            meta_instance_id: None,
            staged_path: None,
            actual_imported_id: None,
            id_reconciled: None,
            id_resolution_strategy: None,
            id_reconciliation_warning: None,
        }
    }

    fn snapshot(workflows: Vec<RemoteWorkflow>) -> RemoteSnapshot {
        RemoteSnapshot {
            projects: vec![],
            folders: vec![],
            workflows,
        }
    }

    #[test]
    fn test_assigned_id_wins() {
        let pre = snapshot(vec![]);
        let post = snapshot(vec![workflow("wf1", "Alpha", None), workflow("wf2", "Alpha", None)]);
        let mut entries = vec![entry("Alpha")];
        entries[0].assigned_id = Some("wf1".to_string());

        let stats = reconcile(&mut entries, &pre, &post);

        assert_eq!(stats.reconciled, 1);
        assert_eq!(entries[0].actual_imported_id.as_deref(), Some("wf1"));
        assert_eq!(
            entries[0].id_resolution_strategy,
            Some(ResolutionStrategy::AssignedId)
        );
        assert!(entries[0].id_reconciliation_warning.is_none());
    }

    #[test]
    fn test_cleared_original_id_is_not_used() {
        let pre = snapshot(vec![workflow("wf1", "Other", None)]);
        let post = snapshot(vec![workflow("wf1", "Other", None), workflow("wf9", "Alpha", None)]);
        let mut entries = vec![entry("Alpha")];
        entries[0].original_id = Some("wf1".to_string());
        entries[0].sanitization_note = Some(SanitizationNote::IdConflictDifferentWorkflow);

        reconcile(&mut entries, &pre, &post);

        assert_eq!(entries[0].actual_imported_id.as_deref(), Some("wf9"));
        assert_eq!(
            entries[0].id_resolution_strategy,
            Some(ResolutionStrategy::NewNameMatch)
        );
    }

    #[test]
    fn test_existing_id_used_when_not_cleared() {
        let pre = snapshot(vec![workflow("wf1", "Alpha", None)]);
        let post = pre.clone();
        let mut entries = vec![entry("Alpha")];
        entries[0].existing_id = Some("wf1".to_string());

        reconcile(&mut entries, &pre, &post);

        assert_eq!(
            entries[0].id_resolution_strategy,
            Some(ResolutionStrategy::ExistingId)
        );
    }

    #[test]
    fn test_meta_instance_id_is_case_insensitive() {
        let pre = snapshot(vec![]);
        let post = snapshot(vec![workflow("wf5", "Renamed", Some("ABC-123"))]);
        let mut entries = vec![entry("Alpha")];
        entries[0].meta_instance_id = Some("abc-123".to_string());

        reconcile(&mut entries, &pre, &post);

        assert_eq!(entries[0].actual_imported_id.as_deref(), Some("wf5"));
        assert_eq!(
            entries[0].id_resolution_strategy,
            Some(ResolutionStrategy::MetaInstanceId)
        );
    }

    #[test]
    fn test_ambiguous_meta_falls_through_to_name_with_warning() {
        let pre = snapshot(vec![workflow("wf1", "Other", Some("inst"))]);
        let post = snapshot(vec![
            workflow("wf1", "Other", Some("inst")),
            workflow("wf2", "Alpha", Some("inst")),
        ]);
        let mut entries = vec![entry("Alpha")];
        entries[0].meta_instance_id = Some("inst".to_string());

        let stats = reconcile(&mut entries, &pre, &post);

        assert_eq!(entries[0].actual_imported_id.as_deref(), Some("wf2"));
        assert_eq!(
            entries[0].id_resolution_strategy,
            Some(ResolutionStrategy::NewNameMatch)
        );
        assert!(entries[0]
            .id_reconciliation_warning
            .as_deref()
            .unwrap()
            .contains("Ambiguous"));
        assert_eq!(stats.ambiguous, 1);
    }

    #[test]
    fn test_ambiguous_new_names_stay_unreconciled() {
        let pre = snapshot(vec![]);
        let post = snapshot(vec![workflow("wf1", "untitled", None), workflow("wf2", "Untitled", None)]);
        let mut entries = vec![entry("Untitled")];

        let stats = reconcile(&mut entries, &pre, &post);

        assert_eq!(stats.unreconciled, 1);
        assert_eq!(entries[0].id_reconciled, Some(false));
        assert!(entries[0].actual_imported_id.is_none());
        assert!(entries[0]
            .id_reconciliation_warning
            .as_deref()
            .unwrap()
            .contains("2 candidates"));
    }

    #[test]
    fn test_missing_workflow_gets_not_found_warning() {
        let pre = snapshot(vec![]);
        let post = snapshot(vec![]);
        let mut entries = vec![entry("Alpha")];
        entries[0].assigned_id = Some("wf1".to_string());

        let stats = reconcile(&mut entries, &pre, &post);

        assert_eq!(stats.unreconciled, 1);
        assert_eq!(
            entries[0].id_reconciliation_warning.as_deref(),
            Some(NOT_FOUND_WARNING)
        );
    }
}
