use specforge::accumulator::ModelResponse;
use specforge::error::PipelineError;
use specforge::extract::{ExtractionMethod, extract};

use proptest::prelude::*;

use test_utils::PYTHON_RESPONSE;

fn response(text: &str) -> ModelResponse {
    ModelResponse::from_text(text)
}

#[test]
fn fenced_python_block_is_extracted() {
    let artifact = extract(&response(PYTHON_RESPONSE), Some("python")).expect("extract");
    assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
    assert_eq!(artifact.language_tag.as_deref(), Some("python"));
    assert!(artifact.body.starts_with("import requests"));
    assert!(artifact.body.ends_with("== 200"));
    assert!(!artifact.body.contains("```"));
}

#[test]
fn first_matching_fence_wins() {
    let text = "Setup:\n```bash\npip install requests\n```\nTests:\n```python\ndef test_a():\n    pass\n```\n```python\ndef test_b():\n    pass\n```\n";
    let artifact = extract(&response(text), Some("python")).expect("extract");
    assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
    assert_eq!(artifact.body, "def test_a():\n    pass");
}

#[test]
fn unfenced_code_falls_back_to_heuristic_scan() {
    let text = "Sure! Below is the test module.\nimport os\nimport requests\n\ndef test_env():\n    assert os.environ is not None\n";
    let artifact = extract(&response(text), Some("python")).expect("extract");
    assert_eq!(artifact.method, ExtractionMethod::HeuristicScan);
    assert!(artifact.body.starts_with("import os"));
    assert!(artifact.body.contains("def test_env():"));
    assert_eq!(artifact.language_tag, None);
}

#[test]
fn pure_prose_is_returned_verbatim() {
    let text = "I am unable to produce tests without a more detailed specification.\nPlease share the request and response schemas.";
    let artifact = extract(&response(text), Some("python")).expect("extract never fails on text");
    assert_eq!(artifact.method, ExtractionMethod::RawFallback);
    assert_eq!(artifact.body, text);
    assert!(!artifact.is_structured());
}

#[test]
fn empty_response_has_no_artifact() {
    assert!(matches!(
        extract(&response("  \n\t\n"), None),
        Err(PipelineError::NoArtifactFound)
    ));
}

#[test]
fn fence_language_aliases_match() {
    let text = "```py\nimport pytest\n```";
    let artifact = extract(&response(text), Some("python")).expect("extract");
    assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
    assert_eq!(artifact.body, "import pytest");
}

#[test]
fn any_fence_is_accepted_without_expected_language() {
    let text = "```kotlin\nclass ApiTest\n```";
    let artifact = extract(&response(text), None).expect("extract");
    assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
    assert_eq!(artifact.language_tag.as_deref(), Some("kotlin"));
    assert_eq!(artifact.body, "class ApiTest");
}

#[test]
fn unclosed_fence_still_yields_its_body() {
    let text = "```python\ndef test_cut():\n    assert True";
    let artifact = extract(&response(text), Some("python")).expect("extract");
    assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
    assert_eq!(artifact.body, "def test_cut():\n    assert True");
}

proptest! {
    #[test]
    fn single_fenced_python_block_round_trips(
        code in "[a-z_][a-z0-9_ =()+.:]{0,40}(\n[ a-z0-9_=()+.:]{1,40}){0,6}",
        before in "[A-Za-z ,.!]{0,60}",
        after in "[A-Za-z ,.!]{0,60}",
    ) {
        prop_assume!(!code.trim().is_empty());
        let text = format!("{before}\n```python\n{code}\n```\n{after}");
        let artifact = extract(&response(&text), Some("python")).expect("extract");

        prop_assert_eq!(artifact.method, ExtractionMethod::FencedBlock);
        prop_assert_eq!(artifact.body, code.trim());
    }

    #[test]
    fn extraction_never_fails_on_non_blank_text(text in "[\\PC\\n]{1,300}") {
        prop_assume!(!text.trim().is_empty());
        prop_assert!(extract(&response(&text), None).is_ok());
    }
}
