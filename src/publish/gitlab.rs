//! GitLab REST (v4) implementation of [`ChangeRequestApi`].

use crate::log_debug;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// A failed version-control API call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{detail}")]
pub struct ApiError {
    pub status: Option<u16>,
    pub detail: String,
}

impl ApiError {
    pub fn new(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            status,
            detail: detail.into(),
        }
    }
}

/// Whether a commit creates the file or overwrites it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileAction {
    Create,
    Update,
}

/// A single-file commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCommit {
    pub branch: String,
    pub message: String,
    pub file_path: String,
    pub content: String,
    pub action: FileAction,
}

/// Parameters of a change request (GitLab merge request)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRequestSpec {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
    pub remove_source_branch: bool,
}

/// An opened change request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChangeRequest {
    pub iid: u64,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// Remote operations needed to open a change request
#[async_trait::async_trait]
pub trait ChangeRequestApi: Send + Sync {
    async fn create_branch(&self, project: &str, branch: &str, from: &str) -> Result<(), ApiError>;

    async fn file_exists(&self, project: &str, branch: &str, path: &str) -> Result<bool, ApiError>;

    /// Returns the new commit id
    async fn create_commit(&self, project: &str, commit: &FileCommit) -> Result<String, ApiError>;

    async fn create_change_request(
        &self,
        project: &str,
        spec: &ChangeRequestSpec,
    ) -> Result<ChangeRequest, ApiError>;
}

/// Client for a GitLab instance, authenticated with a private token
pub struct GitLabClient {
    http: Client,
    api_base: Url,
    token: String,
}

impl std::fmt::Debug for GitLabClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitLabClient")
            .field("api_base", &self.api_base.as_str())
            .field("token", &"<redacted>")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct CommitAction<'a> {
    action: FileAction,
    file_path: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct CommitBody<'a> {
    branch: &'a str,
    commit_message: &'a str,
    actions: [CommitAction<'a>; 1],
}

#[derive(Deserialize)]
struct CommitResponse {
    id: String,
}

impl GitLabClient {
    /// `host` is a bare host name (`gitlab.com`) or a base URL; bare hosts use https
    pub fn new(host: &str, token: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let host = host.trim().trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/api/v4")
        } else {
            format!("https://{host}/api/v4")
        };
        let api_base =
            Url::parse(&base).map_err(|e| ApiError::new(None, format!("invalid host '{host}': {e}")))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::new(None, e.to_string()))?;
        Ok(Self {
            http,
            api_base,
            token: token.into(),
        })
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_str()
    }

    /// Build an endpoint URL; each segment is percent-encoded, including any `/`
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::new(None, "host URL cannot carry a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .header("PRIVATE-TOKEN", &self.token)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await.map_err(|e| {
            let detail = if e.is_connect() {
                format!("cannot reach GitLab: {e}")
            } else {
                e.to_string()
            };
            ApiError::new(e.status().map(|s| s.as_u16()), detail)
        })?;
        Ok(response)
    }

    async fn expect_success(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::new(Some(status.as_u16()), error_detail(&body, status)))
    }
}

/// GitLab reports errors as `{"message": ...}` or `{"error": ...}`
fn error_detail(body: &str, status: StatusCode) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error"))
            .map(|m| m.as_str().map_or_else(|| m.to_string(), str::to_string))
    });
    match message {
        Some(message) => message,
        None if body.trim().is_empty() => status.to_string(),
        None => body.trim().to_string(),
    }
}

#[async_trait::async_trait]
impl ChangeRequestApi for GitLabClient {
    async fn create_branch(&self, project: &str, branch: &str, from: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["projects", project, "repository", "branches"])?;
        log_debug!("Creating branch '{}' from '{}' in project {}", branch, from, project);
        let request = self
            .request(Method::POST, url)
            .query(&[("branch", branch), ("ref", from)]);
        Self::expect_success(self.send(request).await?).await?;
        Ok(())
    }

    async fn file_exists(&self, project: &str, branch: &str, path: &str) -> Result<bool, ApiError> {
        let url = self.endpoint(&["projects", project, "repository", "files", path])?;
        let request = self.request(Method::HEAD, url).query(&[("ref", branch)]);
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success(response).await?;
        Ok(true)
    }

    async fn create_commit(&self, project: &str, commit: &FileCommit) -> Result<String, ApiError> {
        let url = self.endpoint(&["projects", project, "repository", "commits"])?;
        let body = CommitBody {
            branch: &commit.branch,
            commit_message: &commit.message,
            actions: [CommitAction {
                action: commit.action,
                file_path: &commit.file_path,
                content: &commit.content,
            }],
        };
        log_debug!(
            "Committing '{}' ({}) to '{}'",
            commit.file_path,
            commit.action,
            commit.branch
        );
        let response = Self::expect_success(self.send(self.request(Method::POST, url).json(&body)).await?)
            .await?;
        let created: CommitResponse = response
            .json()
            .await
            .map_err(|e| ApiError::new(None, format!("unexpected commit response: {e}")))?;
        Ok(created.id)
    }

    async fn create_change_request(
        &self,
        project: &str,
        spec: &ChangeRequestSpec,
    ) -> Result<ChangeRequest, ApiError> {
        let url = self.endpoint(&["projects", project, "merge_requests"])?;
        log_debug!(
            "Opening merge request '{}' -> '{}'",
            spec.source_branch,
            spec.target_branch
        );
        let response = Self::expect_success(self.send(self.request(Method::POST, url).json(spec)).await?)
            .await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::new(None, format!("unexpected merge request response: {e}")))
    }
}
