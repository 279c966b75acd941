//! Automation Platform Abstraction
//!
//! Describes the remote operations the restore engine consumes: listing the
//! project/folder/workflow graph, fetching a single workflow, creating folders
//! and moving workflows between folders under an optimistic-concurrency token.
//!
//! Implementations receive an already-authenticated transport; session and
//! API-key handshakes happen before a connector is constructed.
//!
//! Outcomes that the engine treats as non-fatal (license restrictions, version
//! conflicts) are returned as values rather than errors so callers can branch on
//! them without string matching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Project as listed by the remote instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteProject {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// `personal` or `team`
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
}

impl RemoteProject {
    pub fn is_personal(&self) -> bool {
        self.project_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("personal"))
    }
}

/// Folder as listed by the remote instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    /// `None` for folders directly under the project root
    #[serde(default)]
    pub parent_folder_id: Option<String>,
    pub project_id: String,
}

/// Workflow summary as listed by the remote instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteWorkflow {
    pub id: String,
    pub name: String,
    /// Optimistic-concurrency token
    #[serde(default)]
    pub version_id: Option<String>,
    #[serde(default)]
    pub parent_folder_id: Option<String>,
    #[serde(default)]
    pub home_project_id: Option<String>,
    /// Identifier carried in the workflow's `meta` block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_instance_id: Option<String>,
}

/// Point-in-time view of the remote entity graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteSnapshot {
    pub projects: Vec<RemoteProject>,
    pub folders: Vec<RemoteFolder>,
    pub workflows: Vec<RemoteWorkflow>,
}

impl RemoteSnapshot {
    pub fn workflow(&self, id: &str) -> Option<&RemoteWorkflow> {
        self.workflows.iter().find(|w| w.id == id)
    }

    pub fn contains_workflow(&self, id: &str) -> bool {
        self.workflow(id).is_some()
    }
}

/// Result of a folder-creation call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderCreation {
    Created(RemoteFolder),
    /// The instance's plan does not include folders
    LicenseRestricted { message: String },
}

/// Result of a workflow move/transfer call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentOutcome {
    /// The workflow now lives at the requested location
    Updated { version_id: Option<String> },
    /// The supplied `versionId` was stale
    VersionConflict { message: String },
    /// The instance's plan does not include folders or project transfers
    LicenseRestricted { message: String },
}

/// Remote automation platform trait
///
/// # Example
///
/// ```ignore
/// use bridge_traits::automation::AutomationApi;
///
/// async fn count(api: &dyn AutomationApi) -> Result<usize> {
///     let snapshot = api.snapshot().await?;
///     Ok(snapshot.workflows.len())
/// }
/// ```
#[async_trait]
pub trait AutomationApi: Send + Sync {
    /// List all projects visible to the authenticated user
    async fn list_projects(&self) -> Result<Vec<RemoteProject>>;

    /// List all folders across all projects
    async fn list_folders(&self) -> Result<Vec<RemoteFolder>>;

    /// List all workflows across all projects
    async fn list_workflows(&self) -> Result<Vec<RemoteWorkflow>>;

    /// Fetch one workflow, including its current `versionId`
    async fn get_workflow(&self, id: &str) -> Result<RemoteWorkflow>;

    /// Create a folder under `parent_folder_id` (or the project root)
    async fn create_folder(
        &self,
        name: &str,
        project_id: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<FolderCreation>;

    /// Move a workflow into `folder_id` of `project_id`
    ///
    /// `version_id` is the last-known optimistic-concurrency token. It only
    /// guards moves within the workflow's current project: a cross-project
    /// transfer takes no version token, so implementations may ignore
    /// `version_id` there and a concurrent edit is not detected.
    async fn update_workflow_assignment(
        &self,
        workflow_id: &str,
        project_id: &str,
        folder_id: Option<&str>,
        version_id: Option<&str>,
    ) -> Result<AssignmentOutcome>;

    /// Capture projects, folders and workflows in one call
    async fn snapshot(&self) -> Result<RemoteSnapshot> {
        let projects = self.list_projects().await?;
        let folders = self.list_folders().await?;
        let workflows = self.list_workflows().await?;
        Ok(RemoteSnapshot {
            projects,
            folders,
            workflows,
        })
    }
}
