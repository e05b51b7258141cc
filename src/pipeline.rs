//! One generation run: load, compose, invoke, accumulate, extract, publish.
//!
//! Every stage receives what it needs explicitly; nothing here outlives the run,
//! so independent runs may execute concurrently.

use crate::accumulator::{ChunkObserver, ModelResponse, accumulate};
use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::{ExtractedArtifact, ExtractionMethod, extract};
use crate::input;
use crate::llm::{ChatBackend, invoke};
use crate::prompt::{CompositePrompt, compose};
use crate::publish::{
    ChangeRequestApi, Destination, PublishRequest, PublishResult, generate_branch_name, publish,
};
use crate::{log_debug, log_info, log_warn};

use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// External collaborators for a run
pub struct Collaborators<'a> {
    pub backend: &'a dyn ChatBackend,
    /// Required when publishing is enabled
    pub change_requests: Option<&'a dyn ChangeRequestApi>,
    pub observer: Option<&'a mut dyn ChunkObserver>,
}

/// What a successful run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub response: ModelResponse,
    pub artifact: ExtractedArtifact,
    /// Set when the artifact was written locally
    pub written: Option<PathBuf>,
    /// Set when a change request was opened
    pub change_request: Option<PublishResult>,
}

/// Load the inputs and compose the prompt. No model call happens here.
pub fn prepare(config: &Config) -> Result<CompositePrompt, PipelineError> {
    let inputs = input::load(&config.input_paths())?;
    Ok(compose(&inputs, config.inputs.composition))
}

/// Run the whole pipeline
pub async fn run(
    config: &Config,
    collaborators: Collaborators<'_>,
    cancel: CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    let prompt = prepare(config)?;
    execute(config, &prompt, collaborators, cancel).await
}

/// Run everything after prompt composition
pub async fn execute(
    config: &Config,
    prompt: &CompositePrompt,
    collaborators: Collaborators<'_>,
    cancel: CancellationToken,
) -> Result<RunOutcome, PipelineError> {
    let Collaborators {
        backend,
        change_requests,
        observer,
    } = collaborators;

    // Check publishing settings before spending time on the model
    let remote = if config.publish.enabled {
        Some(remote_destination(config, change_requests)?)
    } else {
        None
    };

    let response = generate(config, prompt, backend, observer, cancel).await?;
    let artifact = select_artifact(config, &response)?;

    // The local file is written last so a failed publish leaves nothing behind
    let change_request = match remote {
        Some((api, request)) => {
            Some(publish(&artifact, Destination::RemoteChangeRequest { api, request }).await?)
        }
        None => None,
    };

    let written = if config.output.write_to_file {
        match publish(&artifact, Destination::LocalFile(config.output.path.clone())).await? {
            PublishResult::LocalFile { path } => Some(path),
            PublishResult::ChangeRequest { .. } => None,
        }
    } else {
        None
    };

    Ok(RunOutcome {
        response,
        artifact,
        written,
        change_request,
    })
}

async fn generate(
    config: &Config,
    prompt: &CompositePrompt,
    backend: &dyn ChatBackend,
    observer: Option<&mut dyn ChunkObserver>,
    cancel: CancellationToken,
) -> Result<ModelResponse, PipelineError> {
    let settings = config.invocation_settings();
    let span = tracing::info_span!(
        "generate",
        model = %settings.model,
        streaming = settings.streaming,
        prompt_chars = prompt.text().len()
    );
    let generation = async {
        let invocation = invoke(backend, prompt, &settings, cancel).await?;
        accumulate(invocation, observer).await
    }
    .instrument(span);

    match config.run_deadline() {
        Some(deadline) => tokio::time::timeout(deadline, generation)
            .await
            .unwrap_or_else(|_| {
                log_warn!("Run deadline of {}s passed; cancelling", deadline.as_secs());
                Err(PipelineError::Cancelled)
            }),
        None => generation.await,
    }
}

fn select_artifact(
    config: &Config,
    response: &ModelResponse,
) -> Result<ExtractedArtifact, PipelineError> {
    if config.output.extract {
        let language = config.expected_language();
        return extract(response, language.as_deref());
    }

    if response.is_blank() {
        return Err(PipelineError::NoArtifactFound);
    }
    log_debug!("Extraction disabled; keeping the raw response");
    Ok(ExtractedArtifact {
        language_tag: None,
        body: response.full_text.clone(),
        method: ExtractionMethod::RawFallback,
    })
}

fn remote_destination<'a>(
    config: &Config,
    api: Option<&'a dyn ChangeRequestApi>,
) -> Result<(&'a dyn ChangeRequestApi, PublishRequest), PipelineError> {
    let settings = &config.publish;
    let api = api.ok_or_else(|| {
        PipelineError::Config("publishing is enabled but no version-control client is available".into())
    })?;
    let target_project = settings.target_project.clone().ok_or_else(|| {
        PipelineError::Config(
            "publishing is enabled but no target project is set (TARGET_PROJECT_ID)".into(),
        )
    })?;

    let request = PublishRequest {
        target_project,
        target_branch: settings.target_branch.clone(),
        branch_name: generate_branch_name(&settings.branch_prefix),
        file_path: settings.file_path.clone(),
        source_project: settings.spec_project.clone(),
        source_commit: settings.spec_commit.clone(),
    };
    log_info!(
        "Will publish to project {} on branch '{}'",
        request.target_project,
        request.branch_name
    );
    Ok((api, request))
}
