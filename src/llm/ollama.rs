//! HTTP client for an Ollama-compatible `/api/chat` endpoint.
//!
//! Streaming responses are newline-delimited JSON objects, each carrying a
//! message fragment and a `done` flag. Errors arrive either as an HTTP error
//! status or as a `{"error": "..."}` object in the body.

use super::{BackendChunk, BackendStream, ChatBackend, ChatMessage, ChatRequest};
use crate::error::PipelineError;
use crate::log_debug;

use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub const DEFAULT_OLLAMA_HOST: &str = "http://localhost:11434";

/// Client for a local Ollama server
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: Client,
    base_url: String,
    request_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    options: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: String,
}

/// Both the single response and each streamed line share this shape
#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaClient {
    /// Create a client for `host` (scheme optional, defaults to http)
    pub fn new(
        host: &str,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, PipelineError> {
        let base_url = normalize_host(host);
        let http = Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| PipelineError::model_unavailable(&base_url, e))?;
        Ok(Self {
            http,
            base_url,
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    async fn send(&self, request: &ChatRequest) -> Result<reqwest::Response, PipelineError> {
        let body = WireRequest {
            model: &request.model,
            messages: &request.messages,
            stream: request.stream,
            options: request.options.to_json(),
        };

        let pending = self.http.post(self.chat_url()).json(&body).send();
        let response = match tokio::time::timeout(self.request_timeout, pending).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.transport_error(&e)),
            Err(_) => {
                return Err(PipelineError::model_unavailable(
                    &self.base_url,
                    format!(
                        "no response within {}s",
                        self.request_timeout.as_secs()
                    ),
                ));
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let reason = serde_json::from_str::<WireResponse>(&body)
                .ok()
                .and_then(|r| r.error)
                .unwrap_or(body);
            return Err(PipelineError::ModelUnavailable {
                endpoint: self.base_url.clone(),
                status: Some(status.as_u16()),
                reason,
            });
        }

        Ok(response)
    }

    fn transport_error(&self, error: &reqwest::Error) -> PipelineError {
        let reason = if error.is_connect() {
            format!("connection failed ({error}); is 'ollama serve' running?")
        } else if error.is_timeout() {
            format!("request timed out ({error})")
        } else {
            error.to_string()
        };
        log_debug!("Model backend transport error: {}", reason);
        PipelineError::model_unavailable(&self.base_url, reason)
    }
}

#[async_trait::async_trait]
impl ChatBackend for OllamaClient {
    fn endpoint(&self) -> &str {
        &self.base_url
    }

    async fn chat(&self, request: &ChatRequest) -> Result<BackendChunk, PipelineError> {
        let mut request = request.clone();
        request.stream = false;
        let response = self.send(&request).await?;

        let parsed: WireResponse = tokio::time::timeout(self.request_timeout, response.json())
            .await
            .map_err(|_| {
                PipelineError::model_unavailable(&self.base_url, "timed out reading response")
            })?
            .map_err(|e| {
                PipelineError::model_unavailable(&self.base_url, format!("invalid response: {e}"))
            })?;

        decode(parsed, &self.base_url)
    }

    async fn chat_stream(&self, request: &ChatRequest) -> Result<BackendStream, PipelineError> {
        let mut request = request.clone();
        request.stream = true;
        let response = self.send(&request).await?;

        let bytes = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(ndjson_chunks(bytes, self.base_url.clone(), self.request_timeout))
    }
}

fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{host}")
    }
}

fn decode(response: WireResponse, endpoint: &str) -> Result<BackendChunk, PipelineError> {
    if let Some(error) = response.error {
        return Err(PipelineError::model_unavailable(endpoint, error));
    }
    Ok(BackendChunk {
        content: response.message.map(|m| m.content).unwrap_or_default(),
        done: response.done,
    })
}

struct LineState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    endpoint: String,
    /// Longest wait allowed between two reads of the body
    stall_timeout: Duration,
    exhausted: bool,
}

impl LineState {
    /// Pop the next complete, non-blank line; at end of input the remainder counts
    fn next_line(&mut self) -> Option<Vec<u8>> {
        loop {
            let line = if let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
                self.buffer.drain(..=pos).collect::<Vec<u8>>()
            } else if self.exhausted && !self.buffer.is_empty() {
                std::mem::take(&mut self.buffer)
            } else {
                return None;
            };
            if !line.iter().all(u8::is_ascii_whitespace) {
                return Some(line);
            }
        }
    }
}

/// Split a byte stream into NDJSON records and decode each into a chunk.
///
/// A body that delivers nothing for `stall_timeout` ends the stream with
/// `ModelUnavailable`.
fn ndjson_chunks(
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    endpoint: String,
    stall_timeout: Duration,
) -> BackendStream {
    let state = LineState {
        bytes,
        buffer: Vec::new(),
        endpoint,
        stall_timeout,
        exhausted: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.next_line() {
                let item = serde_json::from_slice::<WireResponse>(&line)
                    .map_err(|e| {
                        PipelineError::model_unavailable(
                            &state.endpoint,
                            format!("malformed stream record: {e}"),
                        )
                    })
                    .and_then(|record| decode(record, &state.endpoint));
                return Some((item, state));
            }
            if state.exhausted {
                return None;
            }
            let Ok(next) = tokio::time::timeout(state.stall_timeout, state.bytes.next()).await
            else {
                state.exhausted = true;
                state.buffer.clear();
                let error = PipelineError::model_unavailable(
                    &state.endpoint,
                    format!(
                        "stream stalled: no data for {}s",
                        state.stall_timeout.as_secs()
                    ),
                );
                return Some((Err(error), state));
            };
            match next {
                Some(Ok(bytes)) => state.buffer.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    state.exhausted = true;
                    state.buffer.clear();
                    let error = PipelineError::model_unavailable(
                        &state.endpoint,
                        format!("stream interrupted: {e}"),
                    );
                    return Some((Err(error), state));
                }
                None => state.exhausted = true,
            }
        }
    })
    .boxed()
}
