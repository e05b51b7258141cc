//! Language tags: fence aliases, output-extension inference, and the
//! per-language patterns that mark a top-level declaration line.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static PYTHON_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:import\s+\w|from\s+[\w.]+\s+import\s|(?:async\s+)?def\s+\w+\s*\(|class\s+\w+|@\w)",
    )
    .expect("Failed to compile python declaration pattern")
});

static JVM_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:package\s+[\w.]+|import\s+(?:static\s+)?[\w.*]+|(?:(?:public|private|protected|abstract|final|data|open|internal|sealed)\s+)*(?:class|interface|enum|record|object)\s+\w+|fun\s+\w+|@\w)",
    )
    .expect("Failed to compile JVM declaration pattern")
});

static SCRIPT_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:import\s|export\s|(?:const|let|var)\s+\w+\s*=|(?:async\s+)?function\s*\w*\s*\(|describe\(|test\(|'use strict'|"use strict")"#,
    )
    .expect("Failed to compile script declaration pattern")
});

static GO_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:package\s+\w+|import\s+[(\x22]|func\s+\w+)")
        .expect("Failed to compile go declaration pattern")
});

static RUST_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:use\s+[\w:]+|mod\s+\w+|(?:pub(?:\([\w:]+\))?\s+)?(?:async\s+)?(?:fn|struct|enum|impl|trait)\b|#!?\[)")
        .expect("Failed to compile rust declaration pattern")
});

static ANY_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:import\s+[\w.]|from\s+[\w.]+\s+import\s|package\s+[\w.]+|#include\s|using\s+[\w.]+\s*;|def\s+\w+\s*\(|(?:public\s+)?class\s+\w+)",
    )
    .expect("Failed to compile generic declaration pattern")
});

/// Canonical form of a fence tag: lowercase with common aliases folded
pub fn normalize_tag(tag: &str) -> String {
    let lower = tag.trim().to_lowercase();
    let canonical = match lower.as_str() {
        "py" | "python3" | "py3" => "python",
        "js" | "node" | "jsx" => "javascript",
        "ts" | "tsx" => "typescript",
        "kt" | "kts" => "kotlin",
        "rs" => "rust",
        "golang" => "go",
        "sh" | "shell" | "zsh" => "bash",
        "yml" => "yaml",
        "c#" | "cs" => "csharp",
        other => other,
    };
    canonical.to_string()
}

/// Whether a fence tag names the expected language
pub fn tags_match(fence_tag: &str, expected: &str) -> bool {
    normalize_tag(fence_tag) == normalize_tag(expected)
}

/// Expected language for an output file, from its extension
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_lowercase();
    let language = match extension.as_str() {
        "py" => "python",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "js" | "mjs" | "cjs" => "javascript",
        "ts" => "typescript",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "cs" => "csharp",
        "feature" => "gherkin",
        _ => return None,
    };
    Some(language)
}

/// Whether `line` looks like a top-level declaration in `language`.
///
/// Unknown or absent languages use a generic pattern covering the common
/// import/package/class forms.
pub fn is_declaration(line: &str, language: Option<&str>) -> bool {
    let line = line.trim_start();
    let pattern: &Regex = match language.map(normalize_tag).as_deref() {
        Some("python") => &PYTHON_DECLARATION,
        Some("java" | "kotlin" | "groovy" | "scala") => &JVM_DECLARATION,
        Some("javascript" | "typescript") => &SCRIPT_DECLARATION,
        Some("go") => &GO_DECLARATION,
        Some("rust") => &RUST_DECLARATION,
        _ => &ANY_DECLARATION,
    };
    pattern.is_match(line)
}
