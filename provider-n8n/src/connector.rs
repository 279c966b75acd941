//! n8n API connector implementation
//!
//! Implements the `AutomationApi` trait for n8n. Listing goes through the
//! public API (`/api/v1`); folders and moves use the REST endpoints the editor
//! UI calls, since the public API does not expose folders.

use async_trait::async_trait;
use bridge_traits::automation::{
    AssignmentOutcome, AutomationApi, FolderCreation, RemoteFolder, RemoteProject,
    RemoteWorkflow,
};
use bridge_traits::error::Result;
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
use core_runtime::config::RestoreConfig;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::N8nError;
use crate::types::{
    ApiErrorBody, CreateFolderRequest, Envelope, FolderList, MoveWorkflowRequest, N8nFolder,
    N8nProject, N8nWorkflow, Page, TransferWorkflowRequest,
};

/// Page size requested from list endpoints (public API maximum)
const PAGE_LIMIT: u32 = 250;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size for the folder listing, which pages by `skip`/`take`
const FOLDER_PAGE_SIZE: usize = 1000;

/// Gated-feature marker in a 403 body, e.g. `feat:folders`
const FEATURE_MARKER: &str = "feat:";

/// Whole words in a 403 body that identify a plan restriction rather than a permission problem
const LICENSE_WORDS: &[&str] = &["license", "licence", "licensed", "plan", "upgrade"];

/// Credentials attached to every request
#[derive(Clone)]
pub enum N8nAuth {
    /// Public API key (`X-N8N-API-KEY`)
    ApiKey(String),
    /// Browser session cookie (`n8n-auth=...`)
    SessionCookie(String),
}

impl std::fmt::Debug for N8nAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            N8nAuth::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            N8nAuth::SessionCookie(_) => f.write_str("SessionCookie([REDACTED])"),
        }
    }
}

/// n8n API connector
///
/// # Example
///
/// ```ignore
/// use provider_n8n::{N8nAuth, N8nConnector};
/// use bridge_traits::automation::AutomationApi;
///
/// let connector = N8nConnector::new(http_client, "https://n8n.example.com", N8nAuth::ApiKey(key))?;
/// let snapshot = connector.snapshot().await?;
/// ```
pub struct N8nConnector {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    auth: N8nAuth,
}

impl N8nConnector {
    /// Create a new connector
    ///
    /// # Errors
    ///
    /// Returns [`N8nError::InvalidBaseUrl`] unless `base_url` starts with `http://` or `https://`.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        auth: N8nAuth,
    ) -> crate::Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(N8nError::InvalidBaseUrl(base_url));
        }

        Ok(Self {
            http_client,
            base_url,
            auth,
        })
    }

    /// Create a connector over the HTTP client of a restore configuration
    ///
    /// # Errors
    ///
    /// Returns [`N8nError::MissingHttpClient`] when the configuration has no
    /// client, or the errors of [`N8nConnector::new`].
    pub fn from_config(
        config: &RestoreConfig,
        base_url: impl Into<String>,
        auth: N8nAuth,
    ) -> crate::Result<Self> {
        let http_client = config
            .http_client
            .clone()
            .ok_or(N8nError::MissingHttpClient)?;
        Self::new(http_client, base_url, auth)
    }

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        let request = HttpRequest::new(method, format!("{}{}", self.base_url, path))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        match &self.auth {
            N8nAuth::ApiKey(key) => request.header("X-N8N-API-KEY", key.clone()),
            N8nAuth::SessionCookie(cookie) => request.header("Cookie", cookie.clone()),
        }
    }

    /// Extract a readable message from an error response
    fn error_message(response: &HttpResponse) -> String {
        let body: ApiErrorBody = response.json().unwrap_or_default();
        match (body.message, body.hint) {
            (Some(message), Some(hint)) => format!("{} ({})", message, hint),
            (Some(message), None) => message,
            _ => String::from_utf8_lossy(&response.body).trim().to_string(),
        }
    }

    fn is_license_restriction(response: &HttpResponse) -> bool {
        if response.status != 403 {
            return false;
        }
        let body = String::from_utf8_lossy(&response.body).to_lowercase();
        body.contains(FEATURE_MARKER)
            || body
                .split(|c: char| !c.is_alphanumeric())
                .any(|word| LICENSE_WORDS.contains(&word))
    }

    fn is_version_conflict(response: &HttpResponse) -> bool {
        if response.status == 409 {
            return true;
        }
        response.status == 400
            && String::from_utf8_lossy(&response.body)
                .to_lowercase()
                .contains("versionid")
    }

    fn api_error(response: &HttpResponse) -> N8nError {
        match response.status {
            401 => N8nError::AuthenticationFailed(Self::error_message(response)),
            status => N8nError::ApiError {
                status_code: status,
                message: Self::error_message(response),
            },
        }
    }

    fn parse<T: DeserializeOwned>(response: &HttpResponse, what: &str) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| {
            N8nError::ParseError(format!("Failed to parse {} response: {}", what, e)).into()
        })
    }

    /// GET with the default retry policy, failing on any non-2xx status
    async fn get(&self, path: &str) -> Result<HttpResponse> {
        let request = self.request(HttpMethod::Get, path);
        let response = self
            .http_client
            .execute_with_retry(request, RetryPolicy::default())
            .await?;

        if response.status == 404 {
            return Err(N8nError::NotFound(path.to_string()).into());
        }
        if !response.is_success() {
            warn!(status = response.status, path, "n8n request failed");
            return Err(Self::api_error(&response).into());
        }
        Ok(response)
    }

    /// Follow `nextCursor` until the listing is exhausted
    async fn list_paginated<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        let separator = if path.contains('?') { '&' } else { '?' };

        loop {
            let mut page_path = format!("{}{}limit={}", path, separator, PAGE_LIMIT);
            if let Some(ref c) = cursor {
                page_path.push_str(&format!("&cursor={}", urlencoding::encode(c)));
            }

            let response = self.get(&page_path).await?;
            let page: Page<T> = Self::parse(&response, path)?;
            items.extend(page.data);

            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next)
                }
                _ => break,
            }
        }

        debug!(path, count = items.len(), "Listed n8n resources");
        Ok(items)
    }

    fn convert_project(project: N8nProject) -> RemoteProject {
        RemoteProject {
            id: project.id,
            name: project.name,
            slug: None,
            project_type: project.project_type,
        }
    }

    fn convert_folder(folder: N8nFolder, listed_project_id: &str) -> RemoteFolder {
        let parent_folder_id = folder.parent_id();
        let project_id = folder
            .project_id
            .clone()
            .or_else(|| folder.home_project.as_ref().map(|p| p.id.clone()))
            .unwrap_or_else(|| listed_project_id.to_string());

        RemoteFolder {
            id: folder.id,
            name: folder.name,
            slug: None,
            parent_folder_id,
            project_id,
        }
    }

    fn convert_workflow(workflow: N8nWorkflow) -> RemoteWorkflow {
        let parent_folder_id = workflow.folder_id();
        let home_project_id = workflow.project_id();
        let meta_instance_id = workflow.meta.and_then(|m| m.instance_id);

        RemoteWorkflow {
            id: workflow.id,
            name: workflow.name,
            version_id: workflow.version_id,
            parent_folder_id,
            home_project_id,
            meta_instance_id,
        }
    }

    async fn move_within_project(
        &self,
        workflow_id: &str,
        folder_id: Option<&str>,
        version_id: Option<&str>,
    ) -> Result<AssignmentOutcome> {
        let body = MoveWorkflowRequest {
            parent_folder_id: folder_id,
            version_id,
        };
        let request = self
            .request(
                HttpMethod::Patch,
                &format!("/rest/workflows/{}", urlencoding::encode(workflow_id)),
            )
            .json(&body)?;

        let response = self.http_client.execute(request).await?;
        if let Some(outcome) = Self::classify_refusal(&response) {
            return Ok(outcome);
        }
        if !response.is_success() {
            return Err(Self::api_error(&response).into());
        }

        let updated: Envelope<N8nWorkflow> = Self::parse(&response, "workflow update")?;
        Ok(AssignmentOutcome::Updated {
            version_id: updated.into_inner().version_id,
        })
    }

    /// Cross-project transfer. The endpoint takes no `versionId`, so no
    /// optimistic-concurrency check applies.
    async fn transfer(
        &self,
        workflow_id: &str,
        project_id: &str,
        folder_id: Option<&str>,
    ) -> Result<AssignmentOutcome> {
        let body = TransferWorkflowRequest {
            destination_project_id: project_id,
            destination_parent_folder_id: folder_id,
        };
        let request = self
            .request(
                HttpMethod::Put,
                &format!(
                    "/api/v1/workflows/{}/transfer",
                    urlencoding::encode(workflow_id)
                ),
            )
            .json(&body)?;

        let response = self.http_client.execute(request).await?;
        if let Some(outcome) = Self::classify_refusal(&response) {
            return Ok(outcome);
        }
        if !response.is_success() {
            return Err(Self::api_error(&response).into());
        }

        // Transfers do not return the workflow; read back its new version
        let refreshed = self.get_workflow(workflow_id).await?;
        Ok(AssignmentOutcome::Updated {
            version_id: refreshed.version_id,
        })
    }

    /// Page through one project's folders until `count` is reached or a short page arrives
    async fn list_project_folders(&self, project_id: &str) -> Result<Vec<RemoteFolder>> {
        let mut folders = Vec::new();

        loop {
            let path = format!(
                "/rest/projects/{}/folders?skip={}&take={}",
                urlencoding::encode(project_id),
                folders.len(),
                FOLDER_PAGE_SIZE
            );
            let request = self.request(HttpMethod::Get, &path);
            let response = self
                .http_client
                .execute_with_retry(request, RetryPolicy::default())
                .await?;

            // Instances without the folders feature refuse the listing; treat as empty
            if Self::is_license_restriction(&response) || response.status == 404 {
                debug!(project_id, status = response.status, "Folders unavailable");
                break;
            }
            if !response.is_success() {
                return Err(Self::api_error(&response).into());
            }

            let listed: Envelope<FolderList> = Self::parse(&response, "folder list")?;
            let listed = listed.into_inner();
            let total = listed.total();
            let page = listed.into_folders();
            let received = page.len();
            folders.extend(
                page.into_iter()
                    .map(|f| Self::convert_folder(f, project_id)),
            );

            let exhausted = match total {
                Some(total) => folders.len() as u64 >= total,
                None => received < FOLDER_PAGE_SIZE,
            };
            if received == 0 || exhausted {
                break;
            }
        }

        debug!(project_id, count = folders.len(), "Listed project folders");
        Ok(folders)
    }

    /// Map refusals the engine treats as values
    fn classify_refusal(response: &HttpResponse) -> Option<AssignmentOutcome> {
        if Self::is_license_restriction(response) {
            return Some(AssignmentOutcome::LicenseRestricted {
                message: Self::error_message(response),
            });
        }
        if Self::is_version_conflict(response) {
            return Some(AssignmentOutcome::VersionConflict {
                message: Self::error_message(response),
            });
        }
        None
    }
}

#[async_trait]
impl AutomationApi for N8nConnector {
    #[instrument(skip(self))]
    async fn list_projects(&self) -> Result<Vec<RemoteProject>> {
        let projects: Vec<N8nProject> = self.list_paginated("/api/v1/projects").await?;
        info!(count = projects.len(), "Listed projects");
        Ok(projects.into_iter().map(Self::convert_project).collect())
    }

    #[instrument(skip(self))]
    async fn list_folders(&self) -> Result<Vec<RemoteFolder>> {
        let projects = self.list_projects().await?;
        let mut folders = Vec::new();

        for project in &projects {
            folders.extend(self.list_project_folders(&project.id).await?);
        }

        info!(count = folders.len(), "Listed folders");
        Ok(folders)
    }

    #[instrument(skip(self))]
    async fn list_workflows(&self) -> Result<Vec<RemoteWorkflow>> {
        let workflows: Vec<N8nWorkflow> = self
            .list_paginated("/api/v1/workflows?excludePinnedData=true")
            .await?;
        info!(count = workflows.len(), "Listed workflows");
        Ok(workflows.into_iter().map(Self::convert_workflow).collect())
    }

    #[instrument(skip(self), fields(workflow_id = %id))]
    async fn get_workflow(&self, id: &str) -> Result<RemoteWorkflow> {
        let response = self
            .get(&format!("/api/v1/workflows/{}", urlencoding::encode(id)))
            .await?;
        let workflow: N8nWorkflow = Self::parse(&response, "workflow")?;
        Ok(Self::convert_workflow(workflow))
    }

    #[instrument(skip(self), fields(project_id = %project_id))]
    async fn create_folder(
        &self,
        name: &str,
        project_id: &str,
        parent_folder_id: Option<&str>,
    ) -> Result<FolderCreation> {
        let body = CreateFolderRequest {
            name,
            parent_folder_id,
        };
        let request = self
            .request(
                HttpMethod::Post,
                &format!("/rest/projects/{}/folders", urlencoding::encode(project_id)),
            )
            .json(&body)?;

        let response = self.http_client.execute(request).await?;

        if Self::is_license_restriction(&response) {
            let message = Self::error_message(&response);
            warn!(%message, "Folder creation refused by license");
            return Ok(FolderCreation::LicenseRestricted { message });
        }
        if !response.is_success() {
            return Err(Self::api_error(&response).into());
        }

        let created: Envelope<N8nFolder> = Self::parse(&response, "folder creation")?;
        let mut folder = Self::convert_folder(created.into_inner(), project_id);
        if folder.parent_folder_id.is_none() {
            folder.parent_folder_id = parent_folder_id.map(str::to_string);
        }

        info!(folder_id = %folder.id, "Created folder");
        Ok(FolderCreation::Created(folder))
    }

    #[instrument(skip(self, version_id), fields(workflow_id = %workflow_id, project_id = %project_id))]
    async fn update_workflow_assignment(
        &self,
        workflow_id: &str,
        project_id: &str,
        folder_id: Option<&str>,
        version_id: Option<&str>,
    ) -> Result<AssignmentOutcome> {
        let current = self.get_workflow(workflow_id).await?;

        if current.home_project_id.as_deref() != Some(project_id) {
            debug!("Transferring workflow to another project");
            return self.transfer(workflow_id, project_id, folder_id).await;
        }

        self.move_within_project(workflow_id, folder_id, version_id)
            .await
    }
}
