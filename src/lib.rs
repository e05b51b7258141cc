//! Specforge - generate code from an API specification with a local LLM
//!
//! The library composes a prompt from a specification, scaffolding instructions and an
//! optional dependency manifest, streams the answer from an Ollama model, extracts the
//! code block it contains, and writes the result to disk or opens a GitLab merge request.

// Allow certain clippy warnings that are stylistic
#![allow(clippy::uninlined_format_args)] // Style preference
#![allow(clippy::format_push_string)] // Performance improvement but stylistic
#![allow(clippy::return_self_not_must_use)] // Builder pattern is clear enough
#![allow(clippy::items_after_statements)] // Locally-scoped use statements are fine

pub mod accumulator;
pub mod cli;
pub mod commands;
pub mod common;
pub mod config;
pub mod error;
pub mod extract;
pub mod git;
pub mod input;
pub mod llm;
pub mod logger;
pub mod messages;
pub mod pipeline;
pub mod prompt;
pub mod publish;
pub mod ui;

// Re-export important structs and functions for easier testing
pub use accumulator::{ChunkObserver, ModelResponse, accumulate};
pub use config::Config;
pub use error::{PartialState, PipelineError, PublishError, PublishStage};
pub use extract::{ExtractedArtifact, ExtractionMethod, extract};
pub use input::{InputPaths, InputSet};
pub use pipeline::{Collaborators, RunOutcome};
pub use prompt::{CompositePrompt, CompositionMode, compose};
