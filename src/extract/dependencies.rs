//! Reduction of a dependency manifest to its declaration lines.
//!
//! Feeds the prompt composer: only the lines a model needs to know which
//! libraries it may use survive.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static GRADLE_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:implementation|compile|testImplementation|testRuntimeOnly|annotationProcessor)\s+.*$",
    )
    .expect("Failed to compile gradle declaration pattern")
});

/// Manifest syntax the transform understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display, strum_macros::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DependencyDialect {
    /// `build.gradle` / `build.gradle.kts`
    Gradle,
    /// pip `requirements.txt` style, one requirement per line
    Requirements,
}

impl DependencyDialect {
    pub fn for_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_lowercase();
        if name.ends_with(".gradle") || name.ends_with(".gradle.kts") {
            Self::Gradle
        } else {
            Self::Requirements
        }
    }
}

/// Keep only dependency declarations, one per line, with comments removed.
pub fn extract_dependency_lines(manifest: &str, dialect: DependencyDialect) -> String {
    let lines: Vec<&str> = match dialect {
        DependencyDialect::Gradle => manifest
            .lines()
            .filter(|line| GRADLE_DECLARATION.is_match(line))
            .map(str::trim)
            .filter(|line| !line.starts_with("//") && !line.contains("exclude group:"))
            .collect(),
        DependencyDialect::Requirements => manifest
            .lines()
            .map(|line| line.split_once('#').map_or(line, |(before, _)| before).trim())
            .filter(|line| !line.is_empty())
            .collect(),
    };
    lines.join("\n")
}
