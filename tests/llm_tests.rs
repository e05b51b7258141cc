use specforge::accumulator::accumulate;
use specforge::error::PipelineError;
use specforge::input::InputSet;
use specforge::llm::{ChatBackend, DecodingOptions, InvocationSettings, OllamaClient, invoke};
use specforge::prompt::{CompositePrompt, CompositionMode, compose};

use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use test_utils::{closed_port_url, ndjson_body, serve_once, serve_stalling};

fn client(host: &str) -> OllamaClient {
    OllamaClient::new(host, Duration::from_secs(2), Duration::from_secs(10))
        .expect("Failed to build client")
}

fn prompt() -> CompositePrompt {
    compose(
        &InputSet::new("GET /health", "Test this: {{SPEC}}", None),
        CompositionMode::Placeholder,
    )
}

fn settings(streaming: bool) -> InvocationSettings {
    let mut params = HashMap::new();
    params.insert("num_ctx".to_string(), "4096".to_string());
    InvocationSettings {
        model: "llama3.2:1b".to_string(),
        streaming,
        options: DecodingOptions::from_params(Some(0.0), Some(0.1), &params),
    }
}

#[tokio::test]
async fn streams_ndjson_chunks_in_order() {
    let body = ndjson_body(&["```python\n", "def test_health():\n", "    pass\n", "```", ""]);
    let (host, server) = serve_once(200, "application/x-ndjson", body).await;
    let backend = client(&host);

    let invocation = invoke(&backend, &prompt(), &settings(true), CancellationToken::new())
        .await
        .expect("invoke");
    let response = accumulate(invocation, None).await.expect("accumulate");

    assert_eq!(response.full_text, "```python\ndef test_health():\n    pass\n```");
    assert_eq!(response.chunk_count, 5);
    assert!(response.completed);

    let request = server.await.expect("server task");
    assert!(request.starts_with("POST /api/chat"));
    let payload = &request[request.find("\r\n\r\n").expect("request body") + 4..];
    let json: serde_json::Value = serde_json::from_str(payload).expect("json request");
    assert_eq!(json["model"], "llama3.2:1b");
    assert_eq!(json["stream"], true);
    assert_eq!(json["messages"][0]["role"], "user");
    assert_eq!(json["messages"][0]["content"], "Test this: GET /health");
    assert_eq!(json["options"]["num_ctx"], 4096);
}

#[tokio::test]
async fn single_message_when_not_streaming() {
    let body = serde_json::json!({
        "model": "llama3.2:1b",
        "message": { "role": "assistant", "content": "import pytest" },
        "done": true,
    })
    .to_string();
    let (host, server) = serve_once(200, "application/json", body).await;
    let backend = client(&host);

    let invocation = invoke(&backend, &prompt(), &settings(false), CancellationToken::new())
        .await
        .expect("invoke");
    let response = accumulate(invocation, None).await.expect("accumulate");

    assert_eq!(response.full_text, "import pytest");
    assert!(!response.was_streamed);

    let request = server.await.expect("server task");
    assert!(request.contains("\"stream\":false"));
}

#[tokio::test]
async fn error_status_is_model_unavailable_with_status() {
    let body = serde_json::json!({ "error": "model 'llama3.2:1b' not found" }).to_string();
    let (host, _server) = serve_once(404, "application/json", body).await;
    let backend = client(&host);

    let result = invoke(&backend, &prompt(), &settings(true), CancellationToken::new()).await;

    match result {
        Err(PipelineError::ModelUnavailable { status, reason, endpoint }) => {
            assert_eq!(status, Some(404));
            assert!(reason.contains("not found"));
            assert_eq!(endpoint, host);
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn unreachable_backend_is_model_unavailable() {
    let host = closed_port_url().await;
    let backend = client(&host);
    assert_eq!(backend.endpoint(), host);

    let result = invoke(&backend, &prompt(), &settings(true), CancellationToken::new()).await;

    match result {
        Err(err @ PipelineError::ModelUnavailable { .. }) => {
            assert!(err.is_backend_failure());
            assert!(err.to_string().contains(&host));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected an error"),
    }
}

#[tokio::test]
async fn stalled_stream_times_out_as_model_unavailable() {
    let first = ndjson_body(&["Hel", "lo"])
        .lines()
        .next()
        .map(|line| format!("{line}\n"))
        .expect("first record");
    let host = serve_stalling(first, Duration::from_secs(30)).await;
    let backend = OllamaClient::new(&host, Duration::from_secs(2), Duration::from_secs(1))
        .expect("Failed to build client");

    let run = async {
        let invocation =
            invoke(&backend, &prompt(), &settings(true), CancellationToken::new()).await?;
        accumulate(invocation, None).await
    };
    let result = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("a stalled stream must not hang the run");

    match result {
        Err(PipelineError::ModelUnavailable { reason, .. }) => {
            assert!(reason.contains("stalled"), "reason: {reason}");
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(response) => panic!("expected an error, got {response:?}"),
    }
}
