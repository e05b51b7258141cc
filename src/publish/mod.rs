//! Persistence of an extracted artifact: a local file, or a change request
//! on a freshly named branch of a remote repository.

pub mod gitlab;
pub mod local;

pub use gitlab::{
    ApiError, ChangeRequest, ChangeRequestApi, ChangeRequestSpec, FileAction, FileCommit,
    GitLabClient,
};
pub use local::write_atomic;

use crate::error::{PartialState, PipelineError, PublishError, PublishStage};
use crate::extract::ExtractedArtifact;
use crate::{log_info, log_warn};

use std::fmt::Write;
use std::path::PathBuf;
use uuid::Uuid;

/// Where an artifact goes
pub enum Destination<'a> {
    LocalFile(PathBuf),
    RemoteChangeRequest {
        api: &'a dyn ChangeRequestApi,
        request: PublishRequest,
    },
}

/// Everything needed to open one change request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub target_project: String,
    pub target_branch: String,
    /// Unique per run, see [`generate_branch_name`]
    pub branch_name: String,
    pub file_path: String,
    pub source_project: Option<String>,
    pub source_commit: Option<String>,
}

impl PublishRequest {
    fn source_label(&self) -> String {
        let project = self.source_project.as_deref().unwrap_or("specification");
        match &self.source_commit {
            Some(commit) => format!("{project}@{}", short_sha(commit)),
            None => project.to_string(),
        }
    }

    fn title(&self) -> String {
        format!("Generated tests from {}", self.source_label())
    }

    fn description(&self) -> String {
        let mut description = String::from("Generated automatically from an API specification.\n\n");
        if let Some(project) = &self.source_project {
            writeln!(description, "- Source project: `{project}`")
                .expect("writing to string should never fail");
        }
        if let Some(commit) = &self.source_commit {
            writeln!(description, "- Source commit: `{commit}`")
                .expect("writing to string should never fail");
        }
        writeln!(description, "- Generated file: `{}`", self.file_path)
            .expect("writing to string should never fail");
        description
    }
}

/// Outcome of a successful publish
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    LocalFile {
        path: PathBuf,
    },
    ChangeRequest {
        branch: String,
        commit: String,
        change_request: ChangeRequest,
    },
}

/// `{prefix}-{8 hex chars}`, random per call so concurrent runs never share a branch
pub fn generate_branch_name(prefix: &str) -> String {
    let suffix: String = Uuid::new_v4().simple().to_string().chars().take(8).collect();
    format!("{}-{suffix}", prefix.trim_end_matches(['-', '/']))
}

/// Persist `artifact.body` verbatim at `destination`
pub async fn publish(
    artifact: &ExtractedArtifact,
    destination: Destination<'_>,
) -> Result<PublishResult, PipelineError> {
    match destination {
        Destination::LocalFile(path) => {
            let path = write_atomic(&path, &artifact.body)?;
            Ok(PublishResult::LocalFile { path })
        }
        Destination::RemoteChangeRequest { api, request } => {
            Ok(publish_change_request(api, &request, &artifact.body).await?)
        }
    }
}

/// Branch off the target branch, commit `content`, then open the change request.
///
/// A failure at any step is returned with whatever was already created remotely;
/// nothing is rolled back.
pub async fn publish_change_request(
    api: &dyn ChangeRequestApi,
    request: &PublishRequest,
    content: &str,
) -> Result<PublishResult, PublishError> {
    let project = request.target_project.as_str();
    let branch = request.branch_name.as_str();
    let mut partial = PartialState::default();

    api.create_branch(project, branch, &request.target_branch)
        .await
        .map_err(|e| failure(PublishStage::CreateBranch, e, &partial))?;
    partial.branch = Some(branch.to_string());

    let exists = api
        .file_exists(project, branch, &request.file_path)
        .await
        .map_err(|e| failure(PublishStage::CheckFile, e, &partial))?;
    let action = if exists {
        FileAction::Update
    } else {
        FileAction::Create
    };

    let commit = FileCommit {
        branch: branch.to_string(),
        message: format!("Add generated tests from {}", request.source_label()),
        file_path: request.file_path.clone(),
        content: content.to_string(),
        action,
    };
    let commit_id = api
        .create_commit(project, &commit)
        .await
        .map_err(|e| failure(PublishStage::CreateCommit, e, &partial))?;
    partial.commit = Some(commit_id.clone());

    let spec = ChangeRequestSpec {
        source_branch: branch.to_string(),
        target_branch: request.target_branch.clone(),
        title: request.title(),
        description: request.description(),
        remove_source_branch: true,
    };
    let change_request = api
        .create_change_request(project, &spec)
        .await
        .map_err(|e| failure(PublishStage::CreateChangeRequest, e, &partial))?;

    log_info!(
        "Opened change request !{} from '{}' into '{}'",
        change_request.iid,
        branch,
        request.target_branch
    );

    Ok(PublishResult::ChangeRequest {
        branch: branch.to_string(),
        commit: commit_id,
        change_request,
    })
}

fn failure(stage: PublishStage, error: ApiError, partial: &PartialState) -> PublishError {
    if !partial.is_empty() {
        log_warn!("Publishing stopped during {}; remote state left in place", stage);
    }
    PublishError {
        stage,
        status: error.status,
        detail: error.detail,
        partial: partial.clone(),
    }
}

fn short_sha(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}
