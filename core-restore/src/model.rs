//! # Restore Domain Model
//!
//! Value types shared by the scanner, the staging resolver, the reconciler and
//! the folder synchronizer.
//!
//! A [`WorkflowFile`] is one workflow definition read from the backup tree.
//! Its directory position becomes a [`FolderPath`]: an optional project segment
//! followed by folder segments, each carrying a display name and a slug.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::{RestoreError, Result};

/// Length of a workflow id issued by the remote instance
pub const WORKFLOW_ID_LEN: usize = 16;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for one restore run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RestoreRunId(Uuid);

impl RestoreRunId {
    /// Create a new random run ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a run ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| RestoreError::InvalidIdFormat(e.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RestoreRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RestoreRunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RestoreRunId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Whether `id` has the shape of an instance-issued workflow id
pub fn is_valid_workflow_id(id: &str) -> bool {
    id.len() == WORKFLOW_ID_LEN && id.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Lowercase, hyphen-separated form of a name.
///
/// Runs of non-alphanumeric characters collapse to a single `-`. A name with no
/// alphanumeric characters falls back to its trimmed lowercase form.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for ch in name.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.is_empty() {
        name.trim().to_lowercase()
    } else {
        slug
    }
}

// ============================================================================
// Folder Paths
// ============================================================================

/// One directory level of a target location
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderSegment {
    pub slug: String,
    pub display_name: String,
}

impl FolderSegment {
    pub fn new(display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        Self {
            slug: slugify(&display_name),
            display_name,
        }
    }
}

/// Target location of a workflow: project plus folder chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderPath {
    /// `None` places the workflow in the default project
    #[serde(default)]
    pub project_slug: Option<String>,

    #[serde(default)]
    pub project_display_name: Option<String>,

    #[serde(default)]
    pub segments: Vec<FolderSegment>,
}

impl FolderPath {
    /// Build a path in the default project from display names
    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            project_slug: None,
            project_display_name: None,
            segments: names.into_iter().map(FolderSegment::new).collect(),
        }
    }

    pub fn with_project(mut self, display_name: impl Into<String>) -> Self {
        let display_name = display_name.into();
        self.project_slug = Some(slugify(&display_name));
        self.project_display_name = Some(display_name);
        self
    }

    /// Project root, no folders
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Slash-joined display names, empty at the project root
    pub fn display_path(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.display_name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Slash-joined lowercase slugs, empty at the project root
    pub fn slug_path(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.slug.to_lowercase())
            .collect::<Vec<_>>()
            .join("/")
    }
}

// ============================================================================
// Workflow Files
// ============================================================================

/// A workflow definition found in the local backup tree
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowFile {
    /// Id declared in the file, if any
    pub declared_id: Option<String>,
    /// Declared name, or the file stem when the file has none
    pub name: String,
    /// Parsed JSON object
    pub content: serde_json::Value,
    /// Path relative to the scan root, with any configured prefix removed
    pub relative_path: PathBuf,
    /// Target location derived from `relative_path`
    pub folder: FolderPath,
    /// `meta.instanceId` of the export
    pub meta_instance_id: Option<String>,
}

impl WorkflowFile {
    /// `relative_path` with forward slashes on every platform
    pub fn storage_path(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_id_shape() {
        assert!(is_valid_workflow_id("aB3dE5gH7jK9mN1p"));
        assert!(!is_valid_workflow_id("aB3dE5gH7jK9mN1"));
        assert!(!is_valid_workflow_id("aB3dE5gH7jK9mN1-"));
        assert!(!is_valid_workflow_id("42"));
        assert!(!is_valid_workflow_id(""));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Lead Gen"), "lead-gen");
        assert_eq!(slugify("  Sales & Marketing  "), "sales-marketing");
        assert_eq!(slugify("Q3--Reports_2024"), "q3-reports-2024");
        assert_eq!(slugify("Ünïcode Folder"), "ünïcode-folder");
        assert_eq!(slugify("!!!"), "!!!");
    }

    #[test]
    fn test_folder_path_rendering() {
        let path = FolderPath::from_names(["Sales", "Lead Gen"]).with_project("Team A");

        assert_eq!(path.display_path(), "Sales/Lead Gen");
        assert_eq!(path.slug_path(), "sales/lead-gen");
        assert_eq!(path.project_slug.as_deref(), Some("team-a"));
        assert!(!path.is_root());
        assert!(FolderPath::default().is_root());
    }

    #[test]
    fn test_folder_path_serializes_camel_case() {
        let path = FolderPath::from_names(["Ops"]);
        let json = serde_json::to_value(&path).unwrap();

        assert_eq!(json["segments"][0]["displayName"], "Ops");
        assert_eq!(json["segments"][0]["slug"], "ops");
        assert!(json["projectSlug"].is_null());
    }

    #[test]
    fn test_run_id_parse() {
        let id = RestoreRunId::new();
        let parsed = RestoreRunId::from_string(&id.as_str()).unwrap();
        assert_eq!(id, parsed);
        assert!(RestoreRunId::from_string("not-a-uuid").is_err());
    }
}
