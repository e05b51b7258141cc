use crate::extract::language::language_for_path;
use crate::input::InputPaths;
use crate::llm::{DEFAULT_OLLAMA_HOST, DecodingOptions, InvocationSettings};
use crate::log_debug;
use crate::prompt::CompositionMode;

use anyhow::{Context, Result, anyhow};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project configuration filename, looked up in the current directory
pub const PROJECT_CONFIG_FILENAME: &str = ".specforge.toml";

/// Configuration for one generation run
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub inputs: InputsConfig,
    pub output: OutputConfig,
    pub publish: PublishConfig,
    /// Flag indicating if this config is from a project file
    #[serde(skip)]
    pub is_project_config: bool,
}

/// Model backend settings
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub host: String,
    pub model: String,
    /// Request incremental chunks instead of one message
    pub stream: bool,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Whole-run deadline; the run is cancelled when it passes
    pub run_deadline_seconds: Option<u64>,
    /// Extra backend options; numeric and boolean strings are sent typed
    pub additional_params: HashMap<String, String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_OLLAMA_HOST.to_string(),
            model: "llama3.2:1b".to_string(),
            stream: true,
            temperature: None,
            top_p: None,
            connect_timeout_seconds: 10,
            request_timeout_seconds: 600,
            run_deadline_seconds: None,
            additional_params: HashMap::new(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct InputsConfig {
    pub spec: PathBuf,
    pub prompt: PathBuf,
    pub dependencies: Option<PathBuf>,
    pub composition: CompositionMode,
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            spec: PathBuf::from("spec/openapi.yaml"),
            prompt: PathBuf::from("prompt/prompt.txt"),
            dependencies: None,
            composition: CompositionMode::default(),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Expected fence tag; inferred from the output extension when unset
    pub language: Option<String>,
    pub write_to_file: bool,
    pub echo_response: bool,
    /// When false the raw response is written without extraction
    pub extract: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("output/ai_generated_tests.py"),
            language: None,
            write_to_file: true,
            echo_response: false,
            extract: true,
        }
    }
}

/// Change-request publishing. The token only ever comes from the environment.
#[derive(Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct PublishConfig {
    pub enabled: bool,
    pub host: String,
    pub target_project: Option<String>,
    pub target_branch: String,
    pub file_path: String,
    pub branch_prefix: String,
    pub spec_project: Option<String>,
    pub spec_commit: Option<String>,
    #[serde(skip)]
    pub token: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "gitlab.com".to_string(),
            target_project: None,
            target_branch: "develop".to_string(),
            file_path: "src/generated_tests.py".to_string(),
            branch_prefix: "feature/gen-tests".to_string(),
            spec_project: None,
            spec_commit: None,
            token: None,
        }
    }
}

impl std::fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("target_project", &self.target_project)
            .field("target_branch", &self.target_branch)
            .field("file_path", &self.file_path)
            .field("branch_prefix", &self.branch_prefix)
            .field("spec_project", &self.spec_project)
            .field("spec_commit", &self.spec_commit)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    /// Load personal config, then the project config, then the environment
    pub fn load() -> Result<Self> {
        let personal = Self::get_config_path()?;
        let project = std::env::current_dir()
            .context("Unable to determine current directory")?
            .join(PROJECT_CONFIG_FILENAME);

        let mut config = Self::load_from(Some(&personal), Some(&project))?;
        config.apply_env(|key| std::env::var(key).ok());

        log_debug!("Configuration loaded: {:?}", config);
        Ok(config)
    }

    /// Personal config alone, as edited by `specforge config`
    pub fn load_personal() -> Result<Self> {
        let personal = Self::get_config_path()?;
        Self::load_from(Some(&personal), None)
    }

    /// Layer the given files over the defaults; absent files are skipped
    pub fn load_from(personal: Option<&Path>, project: Option<&Path>) -> Result<Self> {
        let mut config = match personal {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };

        if let Some(path) = project.filter(|p| p.exists()) {
            let mut project_config = Self::from_file(path).with_context(|| {
                format!(
                    "Invalid project configuration file format. Please check your {PROJECT_CONFIG_FILENAME} file for syntax errors."
                )
            })?;
            project_config.is_project_config = true;
            config.merge_with_project_config(project_config);
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))
    }

    /// Apply values the project config changed from the defaults, field by field.
    /// The access token is never taken from a project config.
    pub fn merge_with_project_config(&mut self, project_config: Self) {
        log_debug!("Merging with project configuration");
        let defaults = Self::default();

        let model = project_config.model;
        overlay(&mut self.model.host, model.host, &defaults.model.host);
        overlay(&mut self.model.model, model.model, &defaults.model.model);
        overlay(&mut self.model.stream, model.stream, &defaults.model.stream);
        overlay(&mut self.model.temperature, model.temperature, &None);
        overlay(&mut self.model.top_p, model.top_p, &None);
        self.model.additional_params.extend(model.additional_params);
        overlay(
            &mut self.model.connect_timeout_seconds,
            model.connect_timeout_seconds,
            &defaults.model.connect_timeout_seconds,
        );
        overlay(
            &mut self.model.request_timeout_seconds,
            model.request_timeout_seconds,
            &defaults.model.request_timeout_seconds,
        );
        overlay(&mut self.model.run_deadline_seconds, model.run_deadline_seconds, &None);

        let inputs = project_config.inputs;
        overlay(&mut self.inputs.spec, inputs.spec, &defaults.inputs.spec);
        overlay(&mut self.inputs.prompt, inputs.prompt, &defaults.inputs.prompt);
        overlay(&mut self.inputs.dependencies, inputs.dependencies, &None);
        overlay(
            &mut self.inputs.composition,
            inputs.composition,
            &defaults.inputs.composition,
        );

        let output = project_config.output;
        overlay(&mut self.output.path, output.path, &defaults.output.path);
        overlay(&mut self.output.language, output.language, &None);
        overlay(
            &mut self.output.write_to_file,
            output.write_to_file,
            &defaults.output.write_to_file,
        );
        overlay(
            &mut self.output.echo_response,
            output.echo_response,
            &defaults.output.echo_response,
        );
        overlay(&mut self.output.extract, output.extract, &defaults.output.extract);

        let publish = project_config.publish;
        overlay(&mut self.publish.enabled, publish.enabled, &defaults.publish.enabled);
        overlay(&mut self.publish.host, publish.host, &defaults.publish.host);
        overlay(&mut self.publish.target_project, publish.target_project, &None);
        overlay(
            &mut self.publish.target_branch,
            publish.target_branch,
            &defaults.publish.target_branch,
        );
        overlay(
            &mut self.publish.file_path,
            publish.file_path,
            &defaults.publish.file_path,
        );
        overlay(
            &mut self.publish.branch_prefix,
            publish.branch_prefix,
            &defaults.publish.branch_prefix,
        );
        overlay(&mut self.publish.spec_project, publish.spec_project, &None);
        overlay(&mut self.publish.spec_commit, publish.spec_commit, &None);
    }

    /// Overlay environment variables as set by a CI pipeline
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(project) = get("SPEC_PROJECT_ID") {
            self.publish.spec_project = Some(project);
        }
        if let Some(commit) = get("SPEC_COMMIT_SHA") {
            self.publish.spec_commit = Some(commit);
        }
        if let Some(project) = get("TARGET_PROJECT_ID") {
            self.publish.target_project = Some(project);
        }
        if let Some(token) = get("CI_GITLAB_TOKEN") {
            self.publish.token = Some(token);
        }
        if let Some(host) = get("CI_SERVER_HOST") {
            self.publish.host = host;
        }
        if let Some(model) = get("SPECFORGE_MODEL") {
            self.model.model = model;
        }
        if let Some(host) = get("OLLAMA_HOST") {
            self.model.host = host;
        }
    }

    /// Save the configuration to the personal config file
    pub fn save(&self) -> Result<()> {
        // Don't save project configs to personal config file
        if self.is_project_config {
            return Ok(());
        }
        let config_path = Self::get_config_path()?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let config_content = self.to_toml()?;
        fs::write(path, config_content)
            .with_context(|| format!("Failed to write config file '{}'", path.display()))?;
        log_debug!("Configuration saved to '{}'", path.display());
        Ok(())
    }

    /// TOML form; the access token is never included
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Get the path to the configuration file
    fn get_config_path() -> Result<PathBuf> {
        let mut path =
            config_dir().ok_or_else(|| anyhow!("Unable to determine config directory"))?;
        path.push("specforge");
        fs::create_dir_all(&path)?;
        path.push("config.toml");
        Ok(path)
    }

    /// Update the model settings with new values
    pub fn update(
        &mut self,
        model: Option<String>,
        host: Option<String>,
        temperature: Option<f32>,
        top_p: Option<f32>,
        additional_params: Option<HashMap<String, String>>,
    ) {
        if let Some(model) = model {
            self.model.model = model;
        }
        if let Some(host) = host {
            self.model.host = host;
        }
        if let Some(temperature) = temperature {
            self.model.temperature = Some(temperature);
        }
        if let Some(top_p) = top_p {
            self.model.top_p = Some(top_p);
        }
        if let Some(params) = additional_params {
            self.model.additional_params.extend(params);
        }
        log_debug!("Configuration updated: {:?}", self);
    }

    pub fn input_paths(&self) -> InputPaths {
        let paths = InputPaths::new(&self.inputs.spec, &self.inputs.prompt);
        match &self.inputs.dependencies {
            Some(dependencies) => paths.with_dependencies(dependencies),
            None => paths,
        }
    }

    pub fn invocation_settings(&self) -> InvocationSettings {
        InvocationSettings {
            model: self.model.model.clone(),
            streaming: self.model.stream,
            options: DecodingOptions::from_params(
                self.model.temperature,
                self.model.top_p,
                &self.model.additional_params,
            ),
        }
    }

    /// Configured language, else the one implied by the output extension
    pub fn expected_language(&self) -> Option<String> {
        self.output
            .language
            .clone()
            .or_else(|| language_for_path(&self.output.path).map(str::to_string))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.model.connect_timeout_seconds)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.model.request_timeout_seconds)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.model.run_deadline_seconds.map(Duration::from_secs)
    }
}

/// Take `value` unless it is still the default
fn overlay<T: PartialEq>(target: &mut T, value: T, default: &T) {
    if value != *default {
        *target = value;
    }
}
