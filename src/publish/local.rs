use crate::error::PipelineError;
use crate::log_debug;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `content` to `path` all-or-nothing.
///
/// Parent directories are created as needed. The content goes to a temporary
/// file in the destination directory which is then renamed over `path`, so a
/// failure never leaves a partial file at the destination.
pub fn write_atomic(path: &Path, content: &str) -> Result<PathBuf, PipelineError> {
    let io_error = |source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(io_error)?;

    let mut temp = NamedTempFile::new_in(parent).map_err(io_error)?;
    temp.write_all(content.as_bytes()).map_err(io_error)?;
    temp.flush().map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;

    log_debug!("Wrote {} bytes to '{}'", content.len(), path.display());
    Ok(path.to_path_buf())
}
