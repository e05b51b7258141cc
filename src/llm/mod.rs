//! Chat-completion backend contract and the model invoker built on it.
//!
//! The backend itself is external; this module only knows the request shape
//! (model, role-tagged messages, streaming flag, decoding options) and the
//! incremental chunk shape (text payload plus completion flag).

mod invoker;
mod ollama;

pub use invoker::{Invocation, InvocationSettings, ResponseChunk, invoke};
pub use ollama::{DEFAULT_OLLAMA_HOST, OllamaClient};

use crate::error::PipelineError;

use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single role-tagged message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Sampling options forwarded verbatim to the backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodingOptions {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub extra: HashMap<String, Value>,
}

impl DecodingOptions {
    /// Build from string parameters, parsing numbers and booleans where possible
    pub fn from_params<S: std::hash::BuildHasher>(
        temperature: Option<f32>,
        top_p: Option<f32>,
        params: &HashMap<String, String, S>,
    ) -> Self {
        let extra = params
            .iter()
            .map(|(key, raw)| (key.clone(), parse_param_value(raw)))
            .collect();
        Self {
            temperature,
            top_p,
            extra,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.top_p.is_none() && self.extra.is_empty()
    }

    /// JSON object form; explicit temperature/top_p win over same-named extras
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map: Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(temperature) = self.temperature {
            map.insert("temperature".into(), Value::from(f64::from(temperature)));
        }
        if let Some(top_p) = self.top_p {
            map.insert("top_p".into(), Value::from(f64::from(top_p)));
        }
        map
    }
}

fn parse_param_value(raw: &str) -> Value {
    if let Ok(int) = raw.parse::<i64>() {
        return Value::from(int);
    }
    if let Ok(float) = raw.parse::<f64>() {
        return Value::from(float);
    }
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(raw.to_string()),
    }
}

/// One chat request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
    pub options: DecodingOptions,
}

/// A unit of backend output before sequencing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendChunk {
    pub content: String,
    pub done: bool,
}

/// Raw chunk stream as produced by a backend
pub type BackendStream = BoxStream<'static, Result<BackendChunk, PipelineError>>;

/// A chat-completion backend
#[async_trait::async_trait]
pub trait ChatBackend: Send + Sync {
    /// Human-readable endpoint, used in diagnostics
    fn endpoint(&self) -> &str;

    /// Request the whole response as one message
    async fn chat(&self, request: &ChatRequest) -> Result<BackendChunk, PipelineError>;

    /// Request the response as incremental chunks in send order
    async fn chat_stream(&self, request: &ChatRequest) -> Result<BackendStream, PipelineError>;
}
