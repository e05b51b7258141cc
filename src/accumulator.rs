//! Folding of a chunk sequence into the full model response.
//!
//! An optional [`ChunkObserver`] sees every chunk as it arrives (live echo,
//! progress). Observer failures are logged and otherwise ignored, so the
//! accumulated text never depends on whether an observer is attached.

use crate::error::PipelineError;
use crate::llm::{Invocation, ResponseChunk};
use crate::{log_debug, log_warn};

use futures::StreamExt;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};

/// Complete model output for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelResponse {
    pub full_text: String,
    pub chunk_count: usize,
    pub was_streamed: bool,
    /// The backend signalled completion. False for a stream that ended early.
    pub completed: bool,
}

impl ModelResponse {
    /// Treat previously captured text as a complete, non-streamed response
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            full_text: text.into(),
            chunk_count: 1,
            was_streamed: false,
            completed: true,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.full_text.trim().is_empty()
    }
}

/// Receives each chunk synchronously, before accumulation continues
pub trait ChunkObserver: Send {
    fn on_chunk(&mut self, chunk: &ResponseChunk) -> anyhow::Result<()>;
}

impl<F> ChunkObserver for F
where
    F: FnMut(&ResponseChunk) -> anyhow::Result<()> + Send,
{
    fn on_chunk(&mut self, chunk: &ResponseChunk) -> anyhow::Result<()> {
        self(chunk)
    }
}

/// Writes chunk text to a sink as it arrives, flushing after each chunk
pub struct ConsoleEcho<W: Write + Send> {
    sink: W,
}

impl ConsoleEcho<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self {
            sink: std::io::stdout(),
        }
    }
}

impl<W: Write + Send> ConsoleEcho<W> {
    pub fn new(sink: W) -> Self {
        Self { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }
}

impl<W: Write + Send> ChunkObserver for ConsoleEcho<W> {
    fn on_chunk(&mut self, chunk: &ResponseChunk) -> anyhow::Result<()> {
        self.sink.write_all(chunk.text.as_bytes())?;
        if chunk.done {
            self.sink.write_all(b"\n")?;
        }
        self.sink.flush()?;
        Ok(())
    }
}

/// Consume `invocation` to exhaustion and concatenate chunk text in order.
///
/// Errors yielded by the sequence (cancellation, backend failure) end the run.
/// Errors or panics raised by `observer` do not.
pub async fn accumulate(
    invocation: Invocation,
    mut observer: Option<&mut dyn ChunkObserver>,
) -> Result<ModelResponse, PipelineError> {
    let (was_streamed, mut chunks) = invocation.into_parts();
    let mut full_text = String::new();
    let mut chunk_count = 0;
    let mut completed = false;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if let Some(observer) = observer.as_deref_mut() {
            notify(observer, &chunk);
        }
        full_text.push_str(&chunk.text);
        chunk_count += 1;
        if chunk.done {
            completed = true;
        }
    }

    if !completed {
        log_warn!(
            "Model stream ended after {} chunks without a completion signal; response may be truncated",
            chunk_count
        );
    }
    log_debug!(
        "Accumulated {} chunks into {} chars (streamed: {})",
        chunk_count,
        full_text.chars().count(),
        was_streamed
    );

    Ok(ModelResponse {
        full_text,
        chunk_count,
        was_streamed,
        completed,
    })
}

fn notify(observer: &mut dyn ChunkObserver, chunk: &ResponseChunk) {
    match catch_unwind(AssertUnwindSafe(|| observer.on_chunk(chunk))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log_warn!("Chunk observer failed on chunk {}: {}", chunk.index, e),
        Err(_) => log_warn!("Chunk observer panicked on chunk {}", chunk.index),
    }
}
