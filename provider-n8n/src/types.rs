//! n8n API response types
//!
//! Data structures for deserializing n8n REST responses.

use serde::{Deserialize, Serialize};

/// Cursor-paginated list returned by the public API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,

    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Internal REST endpoints wrap their payload in `{"data": ...}`; some versions don't.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    pub fn into_inner(self) -> T {
        match self {
            Envelope::Wrapped { data } => data,
            Envelope::Bare(value) => value,
        }
    }
}

/// Folder list: either a bare array or `{count, data}`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FolderList {
    Counted {
        /// Total folders in the project, across all pages
        #[serde(default)]
        count: Option<u64>,
        data: Vec<N8nFolder>,
    },
    Plain(Vec<N8nFolder>),
}

impl FolderList {
    pub fn total(&self) -> Option<u64> {
        match self {
            FolderList::Counted { count, .. } => *count,
            FolderList::Plain(_) => None,
        }
    }

    pub fn into_folders(self) -> Vec<N8nFolder> {
        match self {
            FolderList::Counted { data, .. } => data,
            FolderList::Plain(folders) => folders,
        }
    }
}

/// Project resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N8nProject {
    pub id: String,
    pub name: String,

    /// `personal` or `team`
    #[serde(rename = "type", default)]
    pub project_type: Option<String>,
}

/// Reference to another entity by id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdRef {
    pub id: String,
}

/// Folder resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N8nFolder {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub parent_folder_id: Option<String>,

    /// Older versions nest the parent instead of flattening it
    #[serde(default)]
    pub parent_folder: Option<IdRef>,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub home_project: Option<IdRef>,
}

impl N8nFolder {
    pub fn parent_id(&self) -> Option<String> {
        self.parent_folder_id
            .clone()
            .or_else(|| self.parent_folder.as_ref().map(|p| p.id.clone()))
    }
}

/// Project sharing record on a workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedWith {
    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub role: Option<String>,

    #[serde(default)]
    pub project: Option<IdRef>,
}

impl SharedWith {
    fn project_id(&self) -> Option<&str> {
        self.project_id
            .as_deref()
            .or_else(|| self.project.as_ref().map(|p| p.id.as_str()))
    }

    fn is_owner(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|r| r.ends_with(":owner"))
    }
}

/// Workflow `meta` block
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMeta {
    #[serde(default)]
    pub instance_id: Option<String>,
}

/// Workflow resource (nodes and connections are not needed here)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct N8nWorkflow {
    pub id: String,
    pub name: String,

    #[serde(default)]
    pub version_id: Option<String>,

    #[serde(default)]
    pub parent_folder_id: Option<String>,

    #[serde(default)]
    pub parent_folder: Option<IdRef>,

    #[serde(default)]
    pub home_project: Option<IdRef>,

    #[serde(default)]
    pub shared: Vec<SharedWith>,

    #[serde(default)]
    pub meta: Option<WorkflowMeta>,
}

impl N8nWorkflow {
    pub fn folder_id(&self) -> Option<String> {
        self.parent_folder_id
            .clone()
            .or_else(|| self.parent_folder.as_ref().map(|p| p.id.clone()))
    }

    /// Home project, falling back to the owning share, then any share
    pub fn project_id(&self) -> Option<String> {
        if let Some(home) = &self.home_project {
            return Some(home.id.clone());
        }
        self.shared
            .iter()
            .find(|s| s.is_owner())
            .or_else(|| self.shared.first())
            .and_then(|s| s.project_id())
            .map(str::to_string)
    }
}

/// Body of a folder-creation request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFolderRequest<'a> {
    pub name: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_folder_id: Option<&'a str>,
}

/// Body of a workflow move request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveWorkflowRequest<'a> {
    /// `None` moves the workflow to the project root
    pub parent_folder_id: Option<&'a str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_id: Option<&'a str>,
}

/// Body of a project transfer request
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferWorkflowRequest<'a> {
    pub destination_project_id: &'a str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_parent_folder_id: Option<&'a str>,
}

/// Error body returned by the API
#[derive(Debug, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub message: Option<String>,

    #[serde(default)]
    pub hint: Option<String>,
}
