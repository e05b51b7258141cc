//! Lookup of the commit that triggered a run, for change-request metadata.

use crate::log_debug;

use anyhow::{Context, Result};
use git2::Repository;
use std::path::Path;

/// Id of the HEAD commit of the repository containing `path`
pub fn head_commit(path: &Path) -> Result<String> {
    let repo = Repository::discover(path)
        .with_context(|| format!("No git repository found at or above '{}'", path.display()))?;
    let head = repo.head().context("Repository has no HEAD")?;
    let commit = head
        .peel_to_commit()
        .context("HEAD does not point at a commit")?;

    let id = commit.id().to_string();
    log_debug!(
        "Source commit: {} on {}",
        id,
        head.shorthand().unwrap_or("detached HEAD")
    );
    Ok(id)
}
