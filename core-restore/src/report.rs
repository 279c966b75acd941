//! # Audit and Summary Reporting
//!
//! One [`AuditRecord`] per folder-assignment attempt, appended to an NDJSON
//! log that is written and never read back by the engine. [`RunSummary`]
//! folds a manifest and its audit records into the counts shown to an
//! operator at the end of a run.

use bridge_traits::FileSystemAccess;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::manifest::{IntendedAction, ManifestEntry};
use crate::{RestoreError, Result};

/// Outcome of one assignment attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditStatus {
    Success,
    Failed,
    Unchanged,
    LicenseBlocked,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
            AuditStatus::Unchanged => "unchanged",
            AuditStatus::LicenseBlocked => "license-blocked",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub workflow_id: String,
    pub workflow_name: String,
    pub project_id: String,
    /// `None` at the project root
    pub folder_id: Option<String>,
    pub display_path: String,
    pub status: AuditStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only NDJSON audit log
#[derive(Clone)]
pub struct AuditLog {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
}

impl AuditLog {
    pub fn new(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append records in one write
    pub async fn append(&self, records: &[AuditRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buffer = Vec::with_capacity(records.len() * 200);
        for (i, record) in records.iter().enumerate() {
            serde_json::to_writer(&mut buffer, record).map_err(|e| RestoreError::Manifest {
                line: i + 1,
                message: e.to_string(),
            })?;
            buffer.push(b'\n');
        }

        self.fs.append_file(&self.path, Bytes::from(buffer)).await?;
        debug!(path = %self.path.display(), records = records.len(), "Appended audit records");
        Ok(())
    }
}

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// No workflows were found
    NothingToDo,
    Clean,
    /// Count of failed plus unreconciled entries
    WithFailures(u64),
}

/// Counts for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub assigned: u64,
    pub unchanged: u64,
    pub failed: u64,
    pub license_blocked: u64,
    pub unreconciled: u64,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn outcome(&self) -> SummaryOutcome {
        let failures = self.failed + self.unreconciled;
        if self.total == 0 {
            SummaryOutcome::NothingToDo
        } else if failures == 0 {
            SummaryOutcome::Clean
        } else {
            SummaryOutcome::WithFailures(failures)
        }
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = if self.dry_run { "[dry run] " } else { "" };
        match self.outcome() {
            SummaryOutcome::NothingToDo => write!(f, "{}nothing to do: no workflows found", prefix),
            outcome => {
                write!(
                    f,
                    "{}processed {} workflows: {} created, {} updated, {} assigned, {} unchanged, {} failed, {} license-blocked, {} unreconciled",
                    prefix,
                    self.total,
                    self.created,
                    self.updated,
                    self.assigned,
                    self.unchanged,
                    self.failed,
                    self.license_blocked,
                    self.unreconciled
                )?;
                if let SummaryOutcome::WithFailures(n) = outcome {
                    write!(f, " ({} failures)", n)?;
                }
                Ok(())
            }
        }
    }
}

/// Fold a manifest and its audit records into a summary
pub fn summarize(entries: &[ManifestEntry], records: &[AuditRecord], dry_run: bool) -> RunSummary {
    let mut summary = RunSummary {
        total: entries.len() as u64,
        dry_run,
        ..RunSummary::default()
    };

    for entry in entries {
        match entry.intended_action {
            IntendedAction::Create => summary.created += 1,
            IntendedAction::Update => summary.updated += 1,
        }
        if entry.id_reconciled == Some(false) {
            summary.unreconciled += 1;
        }
    }

    for record in records {
        match record.status {
            AuditStatus::Success => summary.assigned += 1,
            AuditStatus::Unchanged => summary.unchanged += 1,
            AuditStatus::Failed => summary.failed += 1,
            AuditStatus::LicenseBlocked => summary.license_blocked += 1,
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FolderPath;
    use bridge_desktop::TokioFileSystem;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn record(id: &str, status: AuditStatus) -> AuditRecord {
        AuditRecord {
            workflow_id: id.to_string(),
            workflow_name: "Alpha".to_string(),
            project_id: "p1".to_string(),
            folder_id: Some("f1".to_string()),
            display_path: "Sales".to_string(),
            status,
            note: None,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn entry(action: IntendedAction, reconciled: Option<bool>) -> ManifestEntry {
        ManifestEntry {
            original_id: None,
            assigned_id: None,
            existing_id: None,
            match_strategy: None,
            intended_action: action,
            sanitization_note: None,
            storage_path: "a.json".to_string(),
            target_folder: FolderPath::default(),
            name: "Alpha".to_string(),
            meta_instance_id: None,
            staged_path: None,
            actual_imported_id: None,
            id_reconciled: reconciled,
            id_resolution_strategy: None,
            id_reconciliation_warning: None,
        }
    }

    #[test]
    fn test_record_wire_format() {
        let json = serde_json::to_value(record("wf1", AuditStatus::LicenseBlocked)).unwrap();

        assert_eq!(json["workflowId"], "wf1");
        assert_eq!(json["status"], "license-blocked");
        assert_eq!(json["displayPath"], "Sales");
        assert!(json.get("note").is_none());
    }

    #[test]
    fn test_nothing_to_do_is_distinct() {
        let summary = summarize(&[], &[], false);

        assert_eq!(summary.outcome(), SummaryOutcome::NothingToDo);
        assert_eq!(summary.to_string(), "nothing to do: no workflows found");
    }

    #[test]
    fn test_summary_counts_failures() {
        let entries = vec![
            entry(IntendedAction::Create, Some(true)),
            entry(IntendedAction::Update, Some(true)),
            entry(IntendedAction::Create, Some(false)),
        ];
        let records = vec![
            record("wf1", AuditStatus::Success),
            record("wf2", AuditStatus::Failed),
        ];

        let summary = summarize(&entries, &records, false);

        assert_eq!(summary.created, 2);
        assert_eq!(summary.updated, 1);
        assert_eq!(summary.assigned, 1);
        assert_eq!(summary.unreconciled, 1);
        assert_eq!(summary.outcome(), SummaryOutcome::WithFailures(2));
        assert!(summary.to_string().ends_with("(2 failures)"));
    }

    #[test]
    fn test_clean_dry_run_summary() {
        let entries = vec![entry(IntendedAction::Create, Some(true))];
        let records = vec![record("wf1", AuditStatus::Unchanged)];

        let summary = summarize(&entries, &records, true);

        assert_eq!(summary.outcome(), SummaryOutcome::Clean);
        assert!(summary.to_string().starts_with("[dry run] processed 1 workflows"));
    }

    #[tokio::test]
    async fn test_audit_log_appends_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs/audit.ndjson");
        let log = AuditLog::new(Arc::new(TokioFileSystem), &path);

        log.append(&[record("wf1", AuditStatus::Success)]).await.unwrap();
        log.append(&[record("wf2", AuditStatus::Unchanged)]).await.unwrap();
        log.append(&[]).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: AuditRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second.workflow_id, "wf2");
        assert_eq!(second.status, AuditStatus::Unchanged);
    }
}
