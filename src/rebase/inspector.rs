use crate::errors::Result;
use crate::git::GitRepository;
use crate::rebase::collaborators::ResourceInspector;
use crate::rebase::model::{Resource, SkippedItem};
use std::path::PathBuf;
use tracing::debug;

/// Answers resource queries by opening the repository with git2
#[derive(Debug, Default, Clone)]
pub struct GitInspector;

impl GitInspector {
    pub fn new() -> Self {
        Self
    }

    fn open(resource: &Resource) -> Result<GitRepository> {
        GitRepository::open(&resource.root)
    }
}

impl ResourceInspector for GitInspector {
    fn current_branch(&self, resource: &Resource) -> Result<Option<String>> {
        Self::open(resource)?.get_current_branch()
    }

    fn head(&self, resource: &Resource) -> Result<String> {
        Self::open(resource)?.get_head_commit_hash()
    }

    fn has_local_changes(&self, resource: &Resource) -> Result<bool> {
        Self::open(resource)?.has_local_changes()
    }

    fn is_rebase_in_progress(&self, resource: &Resource) -> Result<bool> {
        Ok(Self::open(resource)?.is_rebase_in_progress())
    }

    fn current_rebase_commit(&self, resource: &Resource) -> Result<Option<SkippedItem>> {
        let commit = Self::open(resource)?.current_rebase_commit()?;
        Ok(commit.map(|commit| SkippedItem::new(commit.id, commit.summary)))
    }

    fn changed_paths(&self, resource: &Resource, from: &str, to: &str) -> Result<Vec<PathBuf>> {
        Self::open(resource)?.changed_paths_between(from, to)
    }

    fn has_published_commits(
        &self,
        resource: &Resource,
        upstream: &str,
        branch: &str,
        remote: &str,
        protected_branches: &[String],
    ) -> Result<bool> {
        let repo = Self::open(resource)?;
        let commits = repo.get_commits_between(upstream, branch)?;
        debug!(
            "Checking {} commits of {}..{} in {} for publication",
            commits.len(),
            upstream,
            branch,
            resource.id
        );

        Ok(commits
            .into_iter()
            .any(|commit| repo.is_commit_published(commit, remote, protected_branches)))
    }
}
