use crate::config::Config;

use anyhow::Result;
use clap::Args;
use std::collections::HashMap;

/// Model overrides shared by every command that talks to the backend
#[derive(Args, Clone, Default, Debug)]
pub struct CommonParams {
    /// Override the model name
    #[arg(short, long, help = "Override the model name (e.g. llama3.2:1b)")]
    pub model: Option<String>,

    /// Override the model backend host
    #[arg(long, help = "Override the Ollama host (e.g. http://localhost:11434)")]
    pub host: Option<String>,

    /// Sampling temperature
    #[arg(long, help = "Sampling temperature passed to the model")]
    pub temperature: Option<f32>,

    /// Nucleus sampling threshold
    #[arg(long = "top-p", help = "Nucleus sampling threshold passed to the model")]
    pub top_p: Option<f32>,

    /// Extra backend options
    #[arg(
        long = "param",
        help = "Extra model option as key=value (repeatable)",
        value_parser = parse_key_val
    )]
    pub params: Vec<(String, String)>,
}

impl CommonParams {
    /// Apply the overrides; returns whether anything changed
    pub fn apply_to_config(&self, config: &mut Config) -> Result<bool> {
        let before = config.model.clone();

        let params: Option<HashMap<String, String>> = if self.params.is_empty() {
            None
        } else {
            Some(self.params.iter().cloned().collect())
        };
        config.update(
            self.model.clone(),
            self.host.clone(),
            self.temperature,
            self.top_p,
            params,
        );

        if let Some(temperature) = config.model.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            anyhow::bail!("Temperature must be between 0.0 and 2.0, got {temperature}");
        }
        if let Some(top_p) = config.model.top_p
            && !(0.0..=1.0).contains(&top_p)
        {
            anyhow::bail!("top-p must be between 0.0 and 1.0, got {top_p}");
        }

        Ok(config.model != before)
    }
}

/// Parse a `key=value` pair
pub fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid KEY=value: no `=` found in `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid KEY=value: empty key in `{s}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
