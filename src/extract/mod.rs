//! Artifact extraction from free-form model output.
//!
//! Three ordered attempts, first success wins:
//!
//! 1. [`ExtractionMethod::FencedBlock`]: the first non-empty fenced block whose
//!    tag matches the expected language (any fenced block when no language is
//!    expected).
//! 2. [`ExtractionMethod::HeuristicScan`]: from the first line that looks like a
//!    top-level declaration up to the next fence marker, minus trailing prose.
//! 3. [`ExtractionMethod::RawFallback`]: the whole response, untouched.
//!
//! Only an empty response fails.

pub mod dependencies;
pub mod language;
pub mod scanner;

use crate::accumulator::ModelResponse;
use crate::error::PipelineError;
use crate::{log_debug, log_warn};

use serde::Serialize;

/// How the artifact body was obtained, in decreasing order of confidence
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, strum_macros::Display, strum_macros::EnumString,
)]
pub enum ExtractionMethod {
    FencedBlock,
    HeuristicScan,
    RawFallback,
}

/// The single code artifact taken from a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedArtifact {
    /// The fence's declared language, when the body came from a fence
    pub language_tag: Option<String>,
    pub body: String,
    pub method: ExtractionMethod,
}

impl ExtractedArtifact {
    /// Whether the body came from structure in the response rather than passthrough
    pub fn is_structured(&self) -> bool {
        self.method != ExtractionMethod::RawFallback
    }
}

/// Extract one artifact from `response`
pub fn extract(
    response: &ModelResponse,
    expected_language: Option<&str>,
) -> Result<ExtractedArtifact, PipelineError> {
    let text = response.full_text.as_str();
    if text.trim().is_empty() {
        return Err(PipelineError::NoArtifactFound);
    }

    let artifact = fenced(text, expected_language)
        .or_else(|| heuristic(text, expected_language))
        .unwrap_or_else(|| ExtractedArtifact {
            language_tag: None,
            body: text.to_string(),
            method: ExtractionMethod::RawFallback,
        });

    if artifact.method == ExtractionMethod::RawFallback {
        log_warn!("No code structure found in the model response; using the raw text");
    }
    log_debug!(
        "Extracted {} chars via {} (tag: {:?})",
        artifact.body.chars().count(),
        artifact.method,
        artifact.language_tag
    );
    Ok(artifact)
}

fn fenced(text: &str, expected_language: Option<&str>) -> Option<ExtractedArtifact> {
    let region = scanner::fenced_regions(text).into_iter().find(|region| {
        let tag_ok = match (expected_language, region.tag) {
            (Some(expected), Some(tag)) => language::tags_match(tag, expected),
            (Some(_), None) => false,
            (None, _) => true,
        };
        tag_ok && !region.body.trim().is_empty()
    })?;

    if !region.closed {
        log_warn!(
            "Fenced block opened on line {} is never closed; the response may be truncated",
            region.open_line + 1
        );
    }

    Some(ExtractedArtifact {
        language_tag: region.tag.map(str::to_string),
        body: region.body.trim().to_string(),
        method: ExtractionMethod::FencedBlock,
    })
}

fn heuristic(text: &str, expected_language: Option<&str>) -> Option<ExtractedArtifact> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines
        .iter()
        .position(|line| language::is_declaration(line, expected_language))?;

    let end = lines[start + 1..]
        .iter()
        .position(|line| scanner::is_fence_marker(line))
        .map_or(lines.len(), |offset| start + 1 + offset);

    let mut body = &lines[start..end];
    while let Some((last, rest)) = body.split_last() {
        if last.trim().is_empty() || looks_like_prose(last) {
            body = rest;
        } else {
            break;
        }
    }

    if body.is_empty() {
        return None;
    }

    Some(ExtractedArtifact {
        language_tag: None,
        body: body.join("\n"),
        method: ExtractionMethod::HeuristicScan,
    })
}

/// A flush-left sentence: several words and none of the punctuation code lines carry
fn looks_like_prose(line: &str) -> bool {
    if line.starts_with(char::is_whitespace) {
        return false;
    }
    let trimmed = line.trim_end();
    if trimmed.starts_with('#') || trimmed.starts_with("//") {
        return false;
    }
    let has_code_punctuation = trimmed.contains(['=', ';', '{', '}', '[', ']'])
        || trimmed.ends_with([':', ',', '(', ')', '\\']);
    !has_code_punctuation && trimmed.split_whitespace().count() >= 3
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(text: &str) -> ModelResponse {
        ModelResponse::from_text(text)
    }

    #[test]
    fn fenced_block_with_matching_tag() {
        let text = "Here are your tests:\n\n```python\n\nimport pytest\n\ndef test_ok():\n    assert True\n\n```\nGood luck!";
        let artifact = extract(&response(text), Some("python")).expect("extract");
        assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
        assert_eq!(artifact.language_tag.as_deref(), Some("python"));
        assert_eq!(artifact.body, "import pytest\n\ndef test_ok():\n    assert True");
    }

    #[test]
    fn first_matching_fence_wins() {
        let text = "```python\nfirst = 1\n```\n\n```python\nsecond = 2\n```";
        let artifact = extract(&response(text), Some("python")).expect("extract");
        assert_eq!(artifact.body, "first = 1");
    }

    #[test]
    fn non_matching_fences_are_skipped() {
        let text = "```bash\npip install pytest\n```\n```py\nimport requests\n```";
        let artifact = extract(&response(text), Some("python")).expect("extract");
        assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
        assert_eq!(artifact.language_tag.as_deref(), Some("py"));
        assert_eq!(artifact.body, "import requests");
    }

    #[test]
    fn empty_matching_fence_is_skipped() {
        let text = "```python\n\n```\n```python\nx = 1\n```";
        let artifact = extract(&response(text), Some("python")).expect("extract");
        assert_eq!(artifact.body, "x = 1");
    }

    #[test]
    fn any_fence_when_no_language_expected() {
        let text = "```\nSELECT 1;\n```";
        let artifact = extract(&response(text), None).expect("extract");
        assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
        assert_eq!(artifact.language_tag, None);
        assert_eq!(artifact.body, "SELECT 1;");
    }

    #[test]
    fn unclosed_fence_is_still_a_fenced_block() {
        let text = "```java\npackage com.example;\n\nclass ApiTest {";
        let artifact = extract(&response(text), Some("java")).expect("extract");
        assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
        assert_eq!(artifact.body, "package com.example;\n\nclass ApiTest {");
    }

    #[test]
    fn heuristic_starts_at_declaration_and_drops_trailing_prose() {
        let text = "Sure, here is the code\nimport os\n\ndef test_cwd():\n    assert os.getcwd()\n\nThese tests cover the happy path only.\n";
        let artifact = extract(&response(text), Some("python")).expect("extract");
        assert_eq!(artifact.method, ExtractionMethod::HeuristicScan);
        assert_eq!(artifact.language_tag, None);
        assert_eq!(artifact.body, "import os\n\ndef test_cwd():\n    assert os.getcwd()");
    }

    #[test]
    fn heuristic_stops_at_fence_marker() {
        let text = "```text\nimport os\nprint(os.sep)\n```\nRun it with python.";
        let artifact = extract(&response(text), Some("python")).expect("extract");
        assert_eq!(artifact.method, ExtractionMethod::HeuristicScan);
        assert_eq!(artifact.body, "import os\nprint(os.sep)");
    }

    #[test]
    fn prose_falls_back_to_raw_text() {
        let text = "I am sorry, but I cannot write tests without more details.\n";
        let artifact = extract(&response(text), Some("python")).expect("extract");
        assert_eq!(artifact.method, ExtractionMethod::RawFallback);
        assert_eq!(artifact.body, text);
        assert!(!artifact.is_structured());
    }

    #[test]
    fn empty_response_is_an_error() {
        assert!(matches!(
            extract(&response("  \n\t"), Some("python")),
            Err(PipelineError::NoArtifactFound)
        ));
    }

    #[test]
    fn prose_detection() {
        assert!(looks_like_prose("This covers every endpoint."));
        assert!(!looks_like_prose("    return response.json()"));
        assert!(!looks_like_prose("BASE_URL = 'http://localhost'"));
        assert!(!looks_like_prose("# end of tests"));
        assert!(!looks_like_prose("main()"));
    }
}
