pub mod detectors;
pub mod repository;
pub mod runner;

pub use detectors::{
    LineListener, OutputStream, RebaseProblemDetector, RebaseProgressListener,
    UntrackedFilesOverwrittenDetector,
};
pub use repository::{CommitSummary, GitRepository};
pub use runner::{Cancellation, CommandOutput, GitCommandRunner, RebaseCommandResult};

use crate::errors::{Result, TandemError};
use std::path::{Path, PathBuf};

/// Git directory backing a working tree. A `.git` file (submodule or
/// linked worktree) is followed to the directory it points at.
pub fn resolve_git_dir(workdir: &Path) -> Result<PathBuf> {
    let dot_git = workdir.join(".git");
    if dot_git.is_dir() {
        return Ok(dot_git);
    }
    if !dot_git.is_file() {
        return Err(TandemError::validation(format!(
            "{} is not a git working tree",
            workdir.display()
        )));
    }

    let pointer = std::fs::read_to_string(&dot_git)?;
    let target = pointer
        .lines()
        .find_map(|line| line.strip_prefix("gitdir:"))
        .map(str::trim)
        .filter(|target| !target.is_empty())
        .ok_or_else(|| {
            TandemError::validation(format!("Unexpected contents in {}", dot_git.display()))
        })?;

    Ok(workdir.join(target))
}

/// Working tree of the repository enclosing `start_path`
pub fn find_repository_root(start_path: &Path) -> Result<PathBuf> {
    let repo = git2::Repository::discover(start_path)?;
    match repo.workdir() {
        Some(workdir) => Ok(workdir.to_path_buf()),
        None => Err(TandemError::validation(format!(
            "{} is a bare repository",
            repo.path().display()
        ))),
    }
}

/// Working directories of a repository family: the root itself, then its
/// initialized submodules (recursively) when requested
pub fn discover_family_roots(root: &Path, include_submodules: bool) -> Result<Vec<PathBuf>> {
    let repo = GitRepository::open(root)?;
    let mut roots = vec![repo.path().to_path_buf()];

    if include_submodules {
        roots.extend(repo.submodule_roots()?);
    }

    tracing::debug!("Discovered {} repositories under {}", roots.len(), root.display());
    Ok(roots)
}
