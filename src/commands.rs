use crate::accumulator::{ChunkObserver, ConsoleEcho, ModelResponse};
use crate::common::CommonParams;
use crate::config::Config;
use crate::error::PipelineError;
use crate::extract::dependencies::{DependencyDialect, extract_dependency_lines};
use crate::extract::language::language_for_path;
use crate::extract::{ExtractedArtifact, ExtractionMethod, extract};
use crate::input::NO_DEPENDENCIES;
use crate::llm::{OllamaClient, ResponseChunk};
use crate::messages;
use crate::pipeline::{self, Collaborators, RunOutcome};
use crate::prompt::CompositionMode;
use crate::publish::{GitLabClient, PublishResult, write_atomic};
use crate::ui::{self, rgb};
use crate::{git, log_debug};

use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

const PREVIEW_CHARS: usize = 500;

/// Per-run settings given on the `generate` command line
#[derive(Debug, Clone, Default)]
#[allow(clippy::struct_excessive_bools)]
pub struct GenerateOverrides {
    pub spec: Option<PathBuf>,
    pub prompt: Option<PathBuf>,
    pub deps: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub language: Option<String>,
    pub stream: bool,
    pub echo: bool,
    pub raw: bool,
    pub mode: Option<CompositionMode>,
    pub publish: bool,
    pub preview: bool,
    pub deadline: Option<u64>,
}

impl GenerateOverrides {
    /// Fold into `config`; flags only ever switch behavior on
    pub fn apply_to_config(&self, config: &mut Config) {
        if let Some(spec) = &self.spec {
            config.inputs.spec.clone_from(spec);
        }
        if let Some(prompt) = &self.prompt {
            config.inputs.prompt.clone_from(prompt);
        }
        if let Some(deps) = &self.deps {
            config.inputs.dependencies = Some(deps.clone());
        }
        if let Some(output) = &self.output {
            config.output.path.clone_from(output);
        }
        if let Some(language) = &self.language {
            config.output.language = Some(language.clone());
        }
        if let Some(mode) = self.mode {
            config.inputs.composition = mode;
        }
        if let Some(deadline) = self.deadline {
            config.model.run_deadline_seconds = Some(deadline);
        }
        if !self.stream {
            config.model.stream = false;
        }
        if self.echo {
            config.output.echo_response = true;
        }
        if self.raw {
            config.output.extract = false;
        }
        if self.publish {
            config.publish.enabled = true;
        }
    }
}

/// Handle the `generate` command
pub async fn handle_generate(common: &CommonParams, overrides: GenerateOverrides) -> Result<()> {
    let mut config = Config::load()?;
    common.apply_to_config(&mut config)?;
    overrides.apply_to_config(&mut config);

    if config.publish.enabled && config.publish.spec_commit.is_none() {
        match git::head_commit(Path::new(".")) {
            Ok(id) => config.publish.spec_commit = Some(id),
            Err(e) => log_debug!("No source commit available: {:#}", e),
        }
    }

    let prompt = pipeline::prepare(&config)?;
    for slot in prompt.missing_slots() {
        ui::print_warning(&format!(
            "Prompt template has no {slot} placeholder; that input was not inserted"
        ));
    }
    if overrides.preview {
        ui::print_info("Prompt preview:");
        ui::print_bordered_content(&prompt.preview(PREVIEW_CHARS));
    }

    let backend = OllamaClient::new(
        &config.model.host,
        config.connect_timeout(),
        config.request_timeout(),
    )?;
    let gitlab = if config.publish.enabled {
        let token = config.publish.token.clone().ok_or_else(|| {
            PipelineError::Config("publishing needs an access token in CI_GITLAB_TOKEN".into())
        })?;
        let client = GitLabClient::new(&config.publish.host, token, config.request_timeout())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Some(client)
    } else {
        None
    };

    ui::print_field("Model", &config.model.model);
    ui::print_field("Backend", backend.base_url());
    if let Some(client) = &gitlab {
        ui::print_field("GitLab", client.api_base());
        let publishing = messages::get_publish_message();
        ui::print_info(&ui::paint(&publishing.text, publishing.color).to_string());
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let echo = config.output.echo_response;
    let waiting = messages::get_waiting_message();
    let spinner = if echo {
        indicatif::ProgressBar::hidden()
    } else {
        ui::create_spinner(&ui::paint(&waiting.text, waiting.color).to_string())
    };
    let mut observer: Box<dyn ChunkObserver> = if echo {
        Box::new(ConsoleEcho::stdout())
    } else {
        let spinner = spinner.clone();
        let text = waiting.text;
        Box::new(move |chunk: &ResponseChunk| -> anyhow::Result<()> {
            spinner.set_message(format!("{text} ({} chunks)", chunk.index + 1));
            Ok(())
        })
    };

    let result = pipeline::execute(
        &config,
        &prompt,
        Collaborators {
            backend: &backend,
            change_requests: gitlab.as_ref().map(|c| c as &dyn crate::publish::ChangeRequestApi),
            observer: Some(observer.as_mut()),
        },
        cancel,
    )
    .await;
    spinner.finish_and_clear();
    interrupt.abort();

    let outcome = result?;
    report_outcome(&config, &outcome);
    Ok(())
}

fn report_outcome(config: &Config, outcome: &RunOutcome) {
    report_artifact(&outcome.artifact);
    ui::print_field(
        "Response",
        &format!(
            "{} chars in {} chunk(s)",
            outcome.response.full_text.chars().count(),
            outcome.response.chunk_count
        ),
    );
    if !outcome.response.completed {
        ui::print_warning("The model stream ended without a completion signal; output may be cut off");
    }

    match &outcome.written {
        Some(path) => ui::print_success(&format!("Wrote {}", path.display())),
        None if !config.output.echo_response => println!("{}", outcome.artifact.body),
        None => {}
    }

    if let Some(PublishResult::ChangeRequest {
        branch,
        commit,
        change_request,
    }) = &outcome.change_request
    {
        ui::print_success(&format!("Opened merge request !{}", change_request.iid));
        ui::print_field("Branch", branch);
        ui::print_field("Commit", commit);
        if let Some(url) = &change_request.web_url {
            ui::print_field("URL", url);
        }
    }
}

fn report_artifact(artifact: &ExtractedArtifact) {
    let color = match artifact.method {
        ExtractionMethod::FencedBlock => rgb::SUCCESS_GREEN,
        ExtractionMethod::HeuristicScan => rgb::ELECTRIC_YELLOW,
        ExtractionMethod::RawFallback => rgb::CORAL,
    };
    ui::print_field(
        "Extraction",
        &ui::paint(&artifact.method.to_string(), color).to_string(),
    );
    if let Some(tag) = &artifact.language_tag {
        ui::print_field("Language", tag);
    }
    if artifact.method == ExtractionMethod::RawFallback {
        ui::print_warning("No code block found; the raw response was used as-is");
    }
}

/// Handle the `extract` command
pub fn handle_extract(input: &Path, language: Option<&str>, output: Option<&Path>) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read response file '{}'", input.display()))?;

    let language = language
        .map(str::to_string)
        .or_else(|| output.and_then(language_for_path).map(str::to_string));
    let artifact = extract(&ModelResponse::from_text(text), language.as_deref())?;
    report_artifact(&artifact);

    match output {
        Some(path) => {
            write_atomic(path, &artifact.body)?;
            ui::print_success(&format!("Wrote {}", path.display()));
        }
        None => println!("{}", artifact.body),
    }
    Ok(())
}

/// Handle the `deps` command
pub fn handle_deps(manifest: &Path) -> Result<()> {
    let content = fs::read_to_string(manifest)
        .with_context(|| format!("Failed to read manifest '{}'", manifest.display()))?;
    let dialect = DependencyDialect::for_path(manifest);
    let lines = extract_dependency_lines(&content, dialect);

    ui::print_field("Dialect", &dialect.to_string());
    if lines.is_empty() {
        ui::print_warning("No dependency declarations found");
        println!("{NO_DEPENDENCIES}");
    } else {
        println!("{lines}");
    }
    Ok(())
}

/// Handle the `config` command
pub fn handle_config(common: &CommonParams, print: bool) -> Result<()> {
    let mut personal = Config::load_personal()?;
    let changes_made = common.apply_to_config(&mut personal)?;
    if changes_made {
        personal.save()?;
        ui::print_success("Configuration updated successfully.");
    }

    if print || !changes_made {
        let effective = Config::load()?;
        print_configuration(&effective)?;
    }
    Ok(())
}

fn print_configuration(config: &Config) -> Result<()> {
    println!("{}", ui::paint("SPECFORGE CONFIGURATION", rgb::NEON_CYAN).bold());
    println!();
    print!("{}", config.to_toml()?);
    let token_state = if config.publish.token.is_some() {
        "set (CI_GITLAB_TOKEN)"
    } else {
        "not set"
    };
    println!();
    println!("# publish token: {token_state}");
    Ok(())
}
