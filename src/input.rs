//! Loading of the named text inputs for a run.
//!
//! The specification and the instruction template are required; if either is
//! missing the load fails before anything else happens. The dependency manifest
//! is optional and degrades to [`NO_DEPENDENCIES`].

use crate::error::PipelineError;
use crate::extract::dependencies::{DependencyDialect, extract_dependency_lines};
use crate::{log_debug, log_warn};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Sentinel used in place of the dependency text when none is available
pub const NO_DEPENDENCIES: &str = "NO DEPENDENCIES FOUND";

/// Locations of the inputs for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputPaths {
    pub specification: PathBuf,
    pub instruction: PathBuf,
    pub dependencies: Option<PathBuf>,
}

impl InputPaths {
    pub fn new(specification: impl Into<PathBuf>, instruction: impl Into<PathBuf>) -> Self {
        Self {
            specification: specification.into(),
            instruction: instruction.into(),
            dependencies: None,
        }
    }

    #[must_use]
    pub fn with_dependencies(mut self, dependencies: impl Into<PathBuf>) -> Self {
        self.dependencies = Some(dependencies.into());
        self
    }
}

/// Texts for one run. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSet {
    specification: String,
    instruction: String,
    dependencies: Option<String>,
}

impl InputSet {
    pub fn new(
        specification: impl Into<String>,
        instruction: impl Into<String>,
        dependencies: Option<String>,
    ) -> Self {
        Self {
            specification: specification.into(),
            instruction: instruction.into(),
            dependencies,
        }
    }

    pub fn specification(&self) -> &str {
        &self.specification
    }

    pub fn instruction(&self) -> &str {
        &self.instruction
    }

    /// Raw dependency text, if a manifest was found and yielded anything
    pub fn dependencies(&self) -> Option<&str> {
        self.dependencies.as_deref()
    }

    /// Dependency text, or the sentinel when none is available
    pub fn dependencies_or_sentinel(&self) -> &str {
        self.dependencies.as_deref().unwrap_or(NO_DEPENDENCIES)
    }
}

/// Read every input named in `paths`.
///
/// All required inputs are attempted before failing so the error names every
/// absent path at once. A required input that exists but cannot be read as
/// UTF-8 text fails with [`PipelineError::Io`] instead. The dependency manifest is passed through the
/// dependency-line transform; an unreadable or empty manifest becomes `None`.
pub fn load(paths: &InputPaths) -> Result<InputSet, PipelineError> {
    let specification = read_required(&paths.specification);
    let instruction = read_required(&paths.instruction);

    let (specification, instruction) = match (specification, instruction) {
        (Ok(spec), Ok(instr)) => (spec, instr),
        (spec, instr) => {
            let mut paths = Vec::new();
            for error in [spec.err(), instr.err()].into_iter().flatten() {
                match error {
                    PipelineError::MissingInput { paths: missing } => paths.extend(missing),
                    other => return Err(other),
                }
            }
            return Err(PipelineError::MissingInput { paths });
        }
    };

    let dependencies = paths
        .dependencies
        .as_deref()
        .and_then(load_dependencies);

    Ok(InputSet {
        specification,
        instruction,
        dependencies,
    })
}

fn read_required(path: &Path) -> Result<String, PipelineError> {
    match fs::read_to_string(path) {
        Ok(content) => {
            log_debug!(
                "Read input '{}' ({} chars)",
                path.display(),
                content.chars().count()
            );
            Ok(content)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log_debug!("Input '{}' not found", path.display());
            Err(PipelineError::MissingInput {
                paths: vec![path.to_path_buf()],
            })
        }
        Err(source) => {
            log_debug!("Failed to read input '{}': {}", path.display(), source);
            Err(PipelineError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

fn load_dependencies(path: &Path) -> Option<String> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log_warn!(
                "Dependency manifest '{}' not found, using '{}'",
                path.display(),
                NO_DEPENDENCIES
            );
            return None;
        }
        Err(e) => {
            log_warn!(
                "Dependency manifest '{}' unreadable ({}), using '{}'",
                path.display(),
                e,
                NO_DEPENDENCIES
            );
            return None;
        }
    };

    let dialect = DependencyDialect::for_path(path);
    let lines = extract_dependency_lines(&content, dialect);
    if lines.is_empty() {
        log_warn!(
            "No dependency declarations found in '{}', using '{}'",
            path.display(),
            NO_DEPENDENCIES
        );
        None
    } else {
        Some(lines)
    }
}
