use super::{BackendChunk, BackendStream, ChatBackend, ChatMessage, ChatRequest, DecodingOptions};
use crate::error::PipelineError;
use crate::log_debug;
use crate::prompt::CompositePrompt;

use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

/// An ordered unit of response text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseChunk {
    /// Position in the run, assigned at receipt, starting at 0
    pub index: usize,
    pub text: String,
    /// Backend signalled completion with this chunk
    pub done: bool,
}

/// Model-side settings for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationSettings {
    pub model: String,
    pub streaming: bool,
    pub options: DecodingOptions,
}

/// A finite, non-restartable sequence of response chunks
pub struct Invocation {
    streamed: bool,
    chunks: BoxStream<'static, Result<ResponseChunk, PipelineError>>,
}

impl Invocation {
    /// Wrap an already-materialized chunk sequence
    pub fn from_chunks(chunks: Vec<ResponseChunk>, streamed: bool) -> Self {
        Self {
            streamed,
            chunks: stream::iter(chunks.into_iter().map(Ok)).boxed(),
        }
    }

    pub fn was_streamed(&self) -> bool {
        self.streamed
    }

    pub(crate) fn into_parts(
        self,
    ) -> (bool, BoxStream<'static, Result<ResponseChunk, PipelineError>>) {
        (self.streamed, self.chunks)
    }
}

/// Send `prompt` to `backend`.
///
/// Non-streaming requests yield exactly one chunk. Streaming requests forward
/// backend chunks in arrival order, numbering them as they arrive. Once
/// `cancel` fires the sequence ends with [`PipelineError::Cancelled`].
/// Backend failures are returned as [`PipelineError::ModelUnavailable`] and are
/// never retried here.
pub async fn invoke(
    backend: &dyn ChatBackend,
    prompt: &CompositePrompt,
    settings: &InvocationSettings,
    cancel: CancellationToken,
) -> Result<Invocation, PipelineError> {
    let request = ChatRequest {
        model: settings.model.clone(),
        messages: vec![ChatMessage::user(prompt.text())],
        stream: settings.streaming,
        options: settings.options.clone(),
    };

    log_debug!(
        "Invoking model '{}' at {} (streaming: {})",
        request.model,
        backend.endpoint(),
        request.stream
    );

    if settings.streaming {
        let inner = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = backend.chat_stream(&request) => result?,
        };
        Ok(Invocation {
            streamed: true,
            chunks: sequence(inner, cancel),
        })
    } else {
        let message = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),
            result = backend.chat(&request) => result?,
        };
        Ok(Invocation {
            streamed: false,
            chunks: stream::once(async move {
                Ok(ResponseChunk {
                    index: 0,
                    text: message.content,
                    done: true,
                })
            })
            .boxed(),
        })
    }
}

struct SequenceState {
    inner: BackendStream,
    cancel: CancellationToken,
    next_index: usize,
    finished: bool,
}

/// Number backend chunks and stop at completion, error, or cancellation
fn sequence(
    inner: BackendStream,
    cancel: CancellationToken,
) -> BoxStream<'static, Result<ResponseChunk, PipelineError>> {
    let state = SequenceState {
        inner,
        cancel,
        next_index: 0,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.finished {
            return None;
        }

        let item = tokio::select! {
            biased;
            () = state.cancel.cancelled() => Some(Err(PipelineError::Cancelled)),
            item = state.inner.next() => item,
        };

        match item? {
            Ok(BackendChunk { content, done }) => {
                let chunk = ResponseChunk {
                    index: state.next_index,
                    text: content,
                    done,
                };
                state.next_index += 1;
                state.finished = done;
                Some((Ok(chunk), state))
            }
            Err(e) => {
                state.finished = true;
                Some((Err(e), state))
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputSet;
    use crate::prompt::{CompositionMode, compose};

    struct ScriptedBackend {
        chunks: Vec<&'static str>,
        done_at_end: bool,
    }

    #[async_trait::async_trait]
    impl ChatBackend for ScriptedBackend {
        fn endpoint(&self) -> &str {
            "scripted"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<BackendChunk, PipelineError> {
            Ok(BackendChunk {
                content: self.chunks.concat(),
                done: true,
            })
        }

        async fn chat_stream(&self, _request: &ChatRequest) -> Result<BackendStream, PipelineError> {
            let last = self.chunks.len().saturating_sub(1);
            let done_at_end = self.done_at_end;
            let items: Vec<_> = self
                .chunks
                .iter()
                .enumerate()
                .map(|(i, text)| {
                    Ok(BackendChunk {
                        content: (*text).to_string(),
                        done: done_at_end && i == last,
                    })
                })
                .collect();
            Ok(stream::iter(items).boxed())
        }
    }

    fn settings(streaming: bool) -> InvocationSettings {
        InvocationSettings {
            model: "test-model".into(),
            streaming,
            options: DecodingOptions::default(),
        }
    }

    fn prompt() -> CompositePrompt {
        compose(&InputSet::new("spec", "{{SPEC}}", None), CompositionMode::Placeholder)
    }

    async fn collect(invocation: Invocation) -> Vec<Result<ResponseChunk, PipelineError>> {
        let (_, chunks) = invocation.into_parts();
        chunks.collect().await
    }

    #[tokio::test]
    async fn non_streaming_yields_one_chunk() {
        let backend = ScriptedBackend {
            chunks: vec!["a", "b", "c"],
            done_at_end: true,
        };
        let invocation = invoke(&backend, &prompt(), &settings(false), CancellationToken::new())
            .await
            .expect("invoke should succeed");
        assert!(!invocation.was_streamed());

        let chunks = collect(invocation).await;
        assert_eq!(chunks.len(), 1);
        let chunk = chunks[0].as_ref().expect("chunk");
        assert_eq!(chunk.text, "abc");
        assert_eq!(chunk.index, 0);
    }

    #[tokio::test]
    async fn streaming_preserves_order_and_numbers_chunks() {
        let backend = ScriptedBackend {
            chunks: vec!["one ", "two ", "three"],
            done_at_end: true,
        };
        let invocation = invoke(&backend, &prompt(), &settings(true), CancellationToken::new())
            .await
            .expect("invoke should succeed");
        assert!(invocation.was_streamed());

        let chunks: Vec<ResponseChunk> = collect(invocation)
            .await
            .into_iter()
            .collect::<Result<_, _>>()
            .expect("no errors");
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(texts, ["one ", "two ", "three"]);
        assert_eq!(indices, [0, 1, 2]);
        assert!(chunks[2].done);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let backend = ScriptedBackend {
            chunks: vec!["x"],
            done_at_end: true,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = invoke(&backend, &prompt(), &settings(true), cancel).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
    }

    #[tokio::test]
    async fn cancellation_mid_stream_ends_with_cancelled() {
        let backend = ScriptedBackend {
            chunks: vec!["a", "b", "c"],
            done_at_end: true,
        };
        let cancel = CancellationToken::new();
        let invocation = invoke(&backend, &prompt(), &settings(true), cancel.clone())
            .await
            .expect("invoke should succeed");
        let (_, mut chunks) = invocation.into_parts();

        let first = chunks.next().await.expect("first item").expect("first chunk");
        assert_eq!(first.text, "a");

        cancel.cancel();
        assert!(matches!(chunks.next().await, Some(Err(PipelineError::Cancelled))));
        assert!(chunks.next().await.is_none());
    }

    #[tokio::test]
    async fn truncated_stream_simply_ends() {
        let backend = ScriptedBackend {
            chunks: vec!["partial"],
            done_at_end: false,
        };
        let invocation = invoke(&backend, &prompt(), &settings(true), CancellationToken::new())
            .await
            .expect("invoke should succeed");
        let chunks = collect(invocation).await;
        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].as_ref().expect("chunk").done);
    }
}
