//! # Remote State Index
//!
//! In-memory lookup structure over a [`RemoteSnapshot`].
//!
//! ## Overview
//!
//! The index answers the questions the staging resolver and the folder
//! synchronizer ask of the remote instance without issuing further calls:
//!
//! - Which project does a path segment name?
//! - Which folder sits at a given slug path, or under a parent by slug or name?
//! - Which workflow lives at a location under a name?
//!
//! Folder keys are first-seen-wins. A later folder that collides on a key is
//! still reachable by id, and the collision is kept as a [`DuplicateFolder`]
//! warning. Workflow name keys that map to more than one workflow are marked
//! as conflicts and never resolve.
//!
//! The folder synchronizer writes created folders and moved workflows back
//! through [`RemoteEntityIndex::record_created_folder`] and
//! [`RemoteEntityIndex::update_workflow_location`], so later entries in the
//! same run see them.

use bridge_traits::{RemoteFolder, RemoteProject, RemoteSnapshot, RemoteWorkflow};
use core_runtime::config::{RestoreConfig, DEFAULT_MAX_FOLDER_DEPTH, DEFAULT_PROJECT_NAME};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::model::{slugify, FolderPath};
use crate::{RestoreError, Result};

/// Options for building an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexOptions {
    /// Project that receives workflows with no explicit project
    pub default_project_name: String,
    /// Parent-chain hop limit
    pub max_folder_depth: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            default_project_name: DEFAULT_PROJECT_NAME.to_string(),
            max_folder_depth: DEFAULT_MAX_FOLDER_DEPTH,
        }
    }
}

impl From<&RestoreConfig> for IndexOptions {
    fn from(config: &RestoreConfig) -> Self {
        Self {
            default_project_name: config.default_project_name.clone(),
            max_folder_depth: config.max_folder_depth,
        }
    }
}

/// Two folders claimed the same lookup key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateFolder {
    pub key: String,
    pub kept_id: String,
    pub duplicate_id: String,
}

impl std::fmt::Display for DuplicateFolder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "folder {} shadowed by {} on key '{}'",
            self.duplicate_id, self.kept_id, self.key
        )
    }
}

/// Folder with its resolved paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRecord {
    pub id: String,
    pub name: String,
    /// Lowercase slug
    pub slug: String,
    pub parent_id: Option<String>,
    pub project_id: String,
    /// Slash-joined names from the project root; `None` if the chain is broken
    pub display_path: Option<String>,
    /// Slash-joined lowercase slugs from the project root
    pub slug_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChildKey {
    project_id: String,
    parent_id: Option<String>,
    key: String,
}

/// Workflows registered under one key
#[derive(Debug, Clone, PartialEq, Eq)]
enum NameSlot {
    Unique(String),
    Conflict(Vec<String>),
}

impl NameSlot {
    fn insert(&mut self, id: &str) {
        match self {
            NameSlot::Unique(existing) if existing == id => {}
            NameSlot::Unique(existing) => {
                *self = NameSlot::Conflict(vec![existing.clone(), id.to_string()]);
            }
            NameSlot::Conflict(ids) => {
                if !ids.iter().any(|i| i == id) {
                    ids.push(id.to_string());
                }
            }
        }
    }

    /// Returns true when the slot is now empty
    fn remove(&mut self, id: &str) -> bool {
        match self {
            NameSlot::Unique(existing) => existing == id,
            NameSlot::Conflict(ids) => {
                ids.retain(|i| i != id);
                match ids.len() {
                    0 => true,
                    1 => {
                        *self = NameSlot::Unique(ids[0].clone());
                        false
                    }
                    _ => false,
                }
            }
        }
    }

    fn unique(&self) -> Option<&str> {
        match self {
            NameSlot::Unique(id) => Some(id),
            NameSlot::Conflict(_) => None,
        }
    }
}

/// (project id, folder display path, exact workflow name)
type LocationKey = (String, String, String);

/// Lookup structure over projects, folders and workflows
#[derive(Debug, Clone)]
pub struct RemoteEntityIndex {
    options: IndexOptions,

    projects: Vec<RemoteProject>,
    project_by_id: HashMap<String, usize>,
    project_by_name: HashMap<String, usize>,
    project_by_slug: HashMap<String, usize>,
    default_project: usize,

    folders: HashMap<String, FolderRecord>,
    folder_order: Vec<String>,
    folder_by_slug: HashMap<ChildKey, String>,
    folder_by_name: HashMap<ChildKey, String>,
    folder_by_path: HashMap<(String, String), String>,

    workflows: HashMap<String, RemoteWorkflow>,
    by_location: HashMap<LocationKey, NameSlot>,
    by_project_name: HashMap<(String, String), NameSlot>,
    by_exact_name: HashMap<String, NameSlot>,

    warnings: Vec<DuplicateFolder>,
}

/// List payloads arrive bare or wrapped in `{"data": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum ListPayload<T> {
    Wrapped { data: Vec<T> },
    Bare(Vec<T>),
}

fn parse_list<T: DeserializeOwned>(what: &str, bytes: &[u8]) -> Result<Vec<T>> {
    let payload: ListPayload<T> = serde_json::from_slice(bytes)
        .map_err(|e| RestoreError::MalformedSnapshot(format!("{}: {}", what, e)))?;
    Ok(match payload {
        ListPayload::Wrapped { data } => data,
        ListPayload::Bare(items) => items,
    })
}

impl RemoteEntityIndex {
    /// Build an index from raw JSON listings
    pub fn load_json(
        projects: &[u8],
        folders: &[u8],
        workflows: &[u8],
        options: IndexOptions,
    ) -> Result<Self> {
        let snapshot = RemoteSnapshot {
            projects: parse_list("projects", projects)?,
            folders: parse_list("folders", folders)?,
            workflows: parse_list("workflows", workflows)?,
        };
        Self::load(&snapshot, options)
    }

    /// Build an index from a snapshot
    ///
    /// # Errors
    ///
    /// - `MalformedSnapshot` on missing or duplicate ids
    /// - `NoProjectsAvailable` when no default project can be chosen
    pub fn load(snapshot: &RemoteSnapshot, options: IndexOptions) -> Result<Self> {
        validate_snapshot(snapshot)?;

        let default_project =
            choose_default_project(&snapshot.projects, &options.default_project_name)?;

        let mut index = Self {
            options,
            projects: Vec::with_capacity(snapshot.projects.len()),
            project_by_id: HashMap::new(),
            project_by_name: HashMap::new(),
            project_by_slug: HashMap::new(),
            default_project,
            folders: HashMap::with_capacity(snapshot.folders.len()),
            folder_order: Vec::with_capacity(snapshot.folders.len()),
            folder_by_slug: HashMap::new(),
            folder_by_name: HashMap::new(),
            folder_by_path: HashMap::new(),
            workflows: HashMap::with_capacity(snapshot.workflows.len()),
            by_location: HashMap::new(),
            by_project_name: HashMap::new(),
            by_exact_name: HashMap::new(),
            warnings: Vec::new(),
        };

        for project in &snapshot.projects {
            index.insert_project(project.clone());
        }

        // Records first so parent chains can be walked in any listing order.
        for folder in &snapshot.folders {
            if !index.project_by_id.contains_key(&folder.project_id) {
                warn!(
                    folder_id = %folder.id,
                    project_id = %folder.project_id,
                    "Folder references an unknown project"
                );
            }
            index.folders.insert(folder.id.clone(), folder_record(folder));
            index.folder_order.push(folder.id.clone());
        }

        let ids = index.folder_order.clone();
        for id in &ids {
            let paths = index.resolve_paths(id);
            if let Some(record) = index.folders.get_mut(id) {
                match paths {
                    Some((display, slug)) => {
                        record.display_path = Some(display);
                        record.slug_path = Some(slug);
                    }
                    None => warn!(
                        folder_id = %id,
                        max_depth = index.options.max_folder_depth,
                        "Folder parent chain does not reach the project root"
                    ),
                }
            }
            if let Err(duplicate) = index.register_folder_keys(id) {
                warn!(%duplicate, "Duplicate folder key");
                index.warnings.push(duplicate);
            }
        }

        for workflow in &snapshot.workflows {
            index.insert_workflow(workflow.clone());
        }

        debug!(
            projects = index.projects.len(),
            folders = index.folders.len(),
            workflows = index.workflows.len(),
            duplicates = index.warnings.len(),
            "Loaded remote entity index"
        );

        Ok(index)
    }

    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// Folder key collisions found while loading or recording folders
    pub fn warnings(&self) -> &[DuplicateFolder] {
        &self.warnings
    }

    // ------------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------------

    pub fn projects(&self) -> &[RemoteProject] {
        &self.projects
    }

    pub fn project(&self, id: &str) -> Option<&RemoteProject> {
        self.project_by_id.get(id).map(|&i| &self.projects[i])
    }

    pub fn default_project(&self) -> &RemoteProject {
        &self.projects[self.default_project]
    }

    /// Project by name (case-insensitive), then by slug, then the default
    pub fn resolve_project(&self, name: Option<&str>) -> &RemoteProject {
        let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
            return self.default_project();
        };

        if let Some(&i) = self.project_by_name.get(&name.to_lowercase()) {
            return &self.projects[i];
        }
        if let Some(&i) = self.project_by_slug.get(&slugify(name)) {
            return &self.projects[i];
        }

        debug!(project = %name, "Unknown project, using default");
        self.default_project()
    }

    /// Project a target lands in: the override, then the path project, then the default
    pub fn target_project(&self, override_name: Option<&str>, target: &FolderPath) -> &RemoteProject {
        self.resolve_project(override_name.or(target.project_display_name.as_deref()))
    }

    fn insert_project(&mut self, project: RemoteProject) {
        let position = self.projects.len();
        let slug = project_slug(&project);

        self.project_by_id.insert(project.id.clone(), position);
        self.project_by_name
            .entry(project.name.to_lowercase())
            .or_insert(position);
        self.project_by_slug.entry(slug).or_insert(position);
        self.projects.push(project);
    }

    // ------------------------------------------------------------------------
    // Folders
    // ------------------------------------------------------------------------

    pub fn folder(&self, id: &str) -> Option<&FolderRecord> {
        self.folders.get(id)
    }

    pub fn folder_count(&self) -> usize {
        self.folders.len()
    }

    /// Folder at a full slug path within a project
    pub fn folder_by_path(&self, project_id: &str, slug_path: &str) -> Option<&FolderRecord> {
        self.folder_by_path
            .get(&(project_id.to_string(), slug_path.to_lowercase()))
            .and_then(|id| self.folders.get(id))
    }

    /// Child of `parent_id` whose slug matches (case-insensitive)
    pub fn child_by_slug(
        &self,
        project_id: &str,
        parent_id: Option<&str>,
        slug: &str,
    ) -> Option<&FolderRecord> {
        self.folder_by_slug
            .get(&child_key(project_id, parent_id, &slug.to_lowercase()))
            .and_then(|id| self.folders.get(id))
    }

    /// Child of `parent_id` whose name matches (case-insensitive)
    pub fn child_by_name(
        &self,
        project_id: &str,
        parent_id: Option<&str>,
        name: &str,
    ) -> Option<&FolderRecord> {
        self.folder_by_name
            .get(&child_key(project_id, parent_id, &name.to_lowercase()))
            .and_then(|id| self.folders.get(id))
    }

    /// Linear scan over children of `parent_id`, in listing order
    ///
    /// Catches folders shadowed by a duplicate key.
    pub fn scan_children(
        &self,
        project_id: &str,
        parent_id: Option<&str>,
        name: &str,
        slug: &str,
    ) -> Option<&FolderRecord> {
        self.folder_order
            .iter()
            .filter_map(|id| self.folders.get(id))
            .filter(|f| f.project_id == project_id && f.parent_id.as_deref() == parent_id)
            .find(|f| f.name.eq_ignore_ascii_case(name) || f.slug.eq_ignore_ascii_case(slug))
    }

    /// Add a folder created during this run
    ///
    /// The folder is always reachable by id. A key collision is returned and
    /// recorded as a warning.
    pub fn record_created_folder(
        &mut self,
        folder: RemoteFolder,
    ) -> std::result::Result<String, DuplicateFolder> {
        let id = folder.id.clone();
        let mut record = folder_record(&folder);
        if !self.folders.contains_key(&id) {
            self.folder_order.push(id.clone());
        }
        self.folders.insert(id.clone(), record.clone());

        if let Some((display, slug)) = self.resolve_paths(&id) {
            record.display_path = Some(display);
            record.slug_path = Some(slug);
            self.folders.insert(id.clone(), record);
        }

        match self.register_folder_keys(&id) {
            Ok(()) => Ok(id),
            Err(duplicate) => {
                self.warnings.push(duplicate.clone());
                Err(duplicate)
            }
        }
    }

    /// Walk the parent chain and build (display path, slug path)
    fn resolve_paths(&self, id: &str) -> Option<(String, String)> {
        let mut names = Vec::new();
        let mut slugs = Vec::new();
        let mut visited = HashSet::new();
        let mut current = self.folders.get(id)?;

        loop {
            if !visited.insert(current.id.as_str()) || names.len() >= self.options.max_folder_depth
            {
                return None;
            }
            names.push(current.name.as_str());
            slugs.push(current.slug.as_str());

            match current.parent_id.as_deref() {
                None => break,
                Some(parent) => current = self.folders.get(parent)?,
            }
        }

        names.reverse();
        slugs.reverse();
        Some((names.join("/"), slugs.join("/")))
    }

    fn register_folder_keys(&mut self, id: &str) -> std::result::Result<(), DuplicateFolder> {
        let Some(record) = self.folders.get(id) else {
            return Ok(());
        };
        let parent = record.parent_id.as_deref();
        let slug_key = child_key(&record.project_id, parent, &record.slug);
        let name_key = child_key(&record.project_id, parent, &record.name.to_lowercase());
        let path_key = record
            .slug_path
            .as_ref()
            .map(|p| (record.project_id.clone(), p.clone()));

        let mut first_duplicate = None;
        let mut note = |kept: &String, key: String| {
            if kept != id && first_duplicate.is_none() {
                first_duplicate = Some(DuplicateFolder {
                    key,
                    kept_id: kept.clone(),
                    duplicate_id: id.to_string(),
                });
            }
        };

        let label = format!("{}/{}", record.project_id, record.slug);
        note(
            self.folder_by_slug
                .entry(slug_key)
                .or_insert_with(|| id.to_string()),
            format!("slug {}", label),
        );
        let label = format!("{}/{}", record.project_id, record.name.to_lowercase());
        note(
            self.folder_by_name
                .entry(name_key)
                .or_insert_with(|| id.to_string()),
            format!("name {}", label),
        );
        if let Some(path_key) = path_key {
            let label = format!("{}:{}", path_key.0, path_key.1);
            note(
                self.folder_by_path
                    .entry(path_key)
                    .or_insert_with(|| id.to_string()),
                format!("path {}", label),
            );
        }

        match first_duplicate {
            Some(duplicate) => Err(duplicate),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------------

    pub fn workflow(&self, id: &str) -> Option<&RemoteWorkflow> {
        self.workflows.get(id)
    }

    pub fn workflow_count(&self) -> usize {
        self.workflows.len()
    }

    /// Home project of a workflow, the default project when unset
    pub fn workflow_project_id<'a>(&'a self, workflow: &'a RemoteWorkflow) -> &'a str {
        workflow
            .home_project_id
            .as_deref()
            .unwrap_or(self.default_project().id.as_str())
    }

    /// Folder display path of a workflow, empty at the project root
    pub fn workflow_display_path(&self, workflow: &RemoteWorkflow) -> Option<String> {
        match workflow.parent_folder_id.as_deref() {
            None => Some(String::new()),
            Some(folder_id) => self
                .folders
                .get(folder_id)
                .and_then(|f| f.display_path.clone()),
        }
    }

    /// Workflow with exactly this name at this location (case-sensitive)
    pub fn find_by_location(
        &self,
        project_id: &str,
        display_path: &str,
        name: &str,
    ) -> Option<&str> {
        self.by_location
            .get(&(
                project_id.to_string(),
                display_path.to_string(),
                name.to_string(),
            ))
            .and_then(NameSlot::unique)
    }

    /// Workflow whose exact name is unique across the instance
    ///
    /// Also requires that no other workflow in its project shares the name
    /// case-insensitively.
    pub fn find_unique_name(&self, name: &str) -> Option<&str> {
        let id = self.by_exact_name.get(name).and_then(NameSlot::unique)?;
        let workflow = self.workflows.get(id)?;
        let project_key = (
            self.workflow_project_id(workflow).to_string(),
            name.to_lowercase(),
        );
        self.by_project_name
            .get(&project_key)
            .and_then(NameSlot::unique)
            .filter(|unique| *unique == id)
    }

    /// Insert or replace a workflow
    pub fn upsert_workflow(&mut self, workflow: RemoteWorkflow) {
        if let Some(previous) = self.workflows.remove(&workflow.id) {
            self.unregister_workflow(&previous);
        }
        self.insert_workflow(workflow);
    }

    /// Apply a successful move to the cached record
    ///
    /// Returns false when the workflow is not indexed.
    pub fn update_workflow_location(
        &mut self,
        workflow_id: &str,
        project_id: &str,
        folder_id: Option<&str>,
        version_id: Option<String>,
    ) -> bool {
        let Some(mut workflow) = self.workflows.get(workflow_id).cloned() else {
            return false;
        };
        workflow.home_project_id = Some(project_id.to_string());
        workflow.parent_folder_id = folder_id.map(str::to_string);
        if version_id.is_some() {
            workflow.version_id = version_id;
        }
        self.upsert_workflow(workflow);
        true
    }

    fn workflow_keys(&self, workflow: &RemoteWorkflow) -> (Option<LocationKey>, (String, String)) {
        let project_id = self.workflow_project_id(workflow).to_string();
        let location = self
            .workflow_display_path(workflow)
            .map(|path| (project_id.clone(), path, workflow.name.clone()));
        (location, (project_id, workflow.name.to_lowercase()))
    }

    fn insert_workflow(&mut self, workflow: RemoteWorkflow) {
        let (location, project_name) = self.workflow_keys(&workflow);
        let id = workflow.id.as_str();

        if let Some(location) = location {
            insert_slot(&mut self.by_location, location, id);
        }
        insert_slot(&mut self.by_project_name, project_name, id);
        insert_slot(&mut self.by_exact_name, workflow.name.clone(), id);

        self.workflows.insert(workflow.id.clone(), workflow);
    }

    fn unregister_workflow(&mut self, workflow: &RemoteWorkflow) {
        let (location, project_name) = self.workflow_keys(workflow);
        if let Some(location) = location {
            remove_slot(&mut self.by_location, location, &workflow.id);
        }
        remove_slot(&mut self.by_project_name, project_name, &workflow.id);
        remove_slot(&mut self.by_exact_name, workflow.name.clone(), &workflow.id);
    }
}

fn insert_slot<K: std::hash::Hash + Eq>(map: &mut HashMap<K, NameSlot>, key: K, id: &str) {
    map.entry(key)
        .and_modify(|slot| slot.insert(id))
        .or_insert_with(|| NameSlot::Unique(id.to_string()));
}

fn remove_slot<K: std::hash::Hash + Eq>(map: &mut HashMap<K, NameSlot>, key: K, id: &str) {
    if let Some(slot) = map.get_mut(&key) {
        if slot.remove(id) {
            map.remove(&key);
        }
    }
}

fn child_key(project_id: &str, parent_id: Option<&str>, key: &str) -> ChildKey {
    ChildKey {
        project_id: project_id.to_string(),
        parent_id: parent_id.map(str::to_string),
        key: key.to_string(),
    }
}

fn folder_record(folder: &RemoteFolder) -> FolderRecord {
    FolderRecord {
        id: folder.id.clone(),
        name: folder.name.clone(),
        slug: folder
            .slug
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::to_lowercase)
            .unwrap_or_else(|| slugify(&folder.name)),
        parent_id: folder.parent_folder_id.clone(),
        project_id: folder.project_id.clone(),
        display_path: None,
        slug_path: None,
    }
}

fn validate_snapshot(snapshot: &RemoteSnapshot) -> Result<()> {
    let mut seen = HashSet::new();
    for project in &snapshot.projects {
        if project.id.trim().is_empty() {
            return Err(RestoreError::MalformedSnapshot(format!(
                "project '{}' has an empty id",
                project.name
            )));
        }
        if !seen.insert(project.id.as_str()) {
            return Err(RestoreError::MalformedSnapshot(format!(
                "duplicate project id {}",
                project.id
            )));
        }
    }

    seen.clear();
    for folder in &snapshot.folders {
        if folder.id.trim().is_empty() || folder.project_id.trim().is_empty() {
            return Err(RestoreError::MalformedSnapshot(format!(
                "folder '{}' is missing its id or project",
                folder.name
            )));
        }
        if !seen.insert(folder.id.as_str()) {
            return Err(RestoreError::MalformedSnapshot(format!(
                "duplicate folder id {}",
                folder.id
            )));
        }
    }

    seen.clear();
    for workflow in &snapshot.workflows {
        if workflow.id.trim().is_empty() {
            return Err(RestoreError::MalformedSnapshot(format!(
                "workflow '{}' has an empty id",
                workflow.name
            )));
        }
        if !seen.insert(workflow.id.as_str()) {
            return Err(RestoreError::MalformedSnapshot(format!(
                "duplicate workflow id {}",
                workflow.id
            )));
        }
    }

    Ok(())
}

fn project_slug(project: &RemoteProject) -> String {
    project
        .slug
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_else(|| slugify(&project.name))
}

/// Configured name, then its slug, then the first personal project
fn choose_default_project(projects: &[RemoteProject], name: &str) -> Result<usize> {
    let slug = slugify(name);
    projects
        .iter()
        .position(|p| p.name.eq_ignore_ascii_case(name))
        .or_else(|| projects.iter().position(|p| project_slug(p) == slug))
        .or_else(|| projects.iter().position(RemoteProject::is_personal))
        .ok_or_else(|| RestoreError::NoProjectsAvailable {
            default_project: name.to_string(),
        })
}
