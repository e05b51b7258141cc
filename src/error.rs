//! Error taxonomy for a generation run.
//!
//! Every fatal condition a run can hit maps to exactly one variant here so the
//! CLI (or any other caller) can tell connectivity failures apart from input
//! failures and publishing failures.

use std::fmt;
use std::path::PathBuf;

/// Fatal errors surfaced by the generation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// One or more required input files do not exist.
    #[error("missing required input: {}", format_paths(.paths))]
    MissingInput { paths: Vec<PathBuf> },

    /// The model backend was unreachable, timed out, or answered with an error.
    #[error("model backend at {endpoint} is unavailable{}: {reason}", format_status(.status))]
    ModelUnavailable {
        endpoint: String,
        status: Option<u16>,
        reason: String,
    },

    /// The run was cancelled by the caller (token or deadline).
    #[error("generation cancelled")]
    Cancelled,

    /// The model produced an empty response.
    #[error("no artifact found: the model response was empty")]
    NoArtifactFound,

    /// A version-control publishing step failed.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// An input existed but could not be read, or an output file could not be written.
    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration is incomplete or inconsistent for the requested operation.
    #[error("configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn model_unavailable(endpoint: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::ModelUnavailable {
            endpoint: endpoint.into(),
            status: None,
            reason: reason.to_string(),
        }
    }

    /// Whether this error came from the model backend rather than the caller's inputs.
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::ModelUnavailable { .. })
    }
}

/// The remote step that was executing when publishing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum PublishStage {
    #[strum(to_string = "create branch")]
    CreateBranch,
    #[strum(to_string = "check existing file")]
    CheckFile,
    #[strum(to_string = "create commit")]
    CreateCommit,
    #[strum(to_string = "create change request")]
    CreateChangeRequest,
}

/// Remote state already created when a publish failed. Left in place for manual
/// inspection; nothing is rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialState {
    pub branch: Option<String>,
    pub commit: Option<String>,
}

impl PartialState {
    pub fn is_empty(&self) -> bool {
        self.branch.is_none() && self.commit.is_none()
    }
}

/// Failure of a version-control API call during publishing.
#[derive(Debug, thiserror::Error)]
#[error(
    "publish failed during {stage}{}: {detail}{}",
    format_status(.status),
    format_partial(.partial)
)]
pub struct PublishError {
    pub stage: PublishStage,
    pub status: Option<u16>,
    pub detail: String,
    pub partial: PartialState,
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| format!("'{}'", p.display()))
        .collect::<Vec<_>>()
        .join(", ")
}

#[allow(clippy::ref_option)]
fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

fn format_partial(partial: &PartialState) -> String {
    if partial.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    if let Some(branch) = &partial.branch {
        parts.push(format!("branch '{branch}' was created"));
    }
    if let Some(commit) = &partial.commit {
        parts.push(format!("commit {commit} was pushed"));
    }
    format!(" [partial state left in place: {}]", parts.join(", "))
}
