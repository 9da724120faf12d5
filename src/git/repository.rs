use crate::errors::{Result, TandemError};
use git2::{Oid, Repository, RepositoryState, Signature, StashFlags, StatusOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Markers left in a file by git while a conflict is unresolved
const CONFLICT_MARKERS: [&str; 2] = ["<<<<<<< ", ">>>>>>> "];
const CONFLICT_SEPARATOR: &str = "=======";

/// Summary of the commit git stopped at during a rebase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitSummary {
    pub id: String,
    pub summary: String,
}

/// Wrapper around git2::Repository with safe operations
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open a Git repository at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::open(path)
            .map_err(|e| TandemError::config(format!("Not a git repository: {e}")))?;

        let workdir = repo
            .workdir()
            .ok_or_else(|| TandemError::config("Repository has no working directory"))?
            .to_path_buf();

        Ok(Self {
            repo,
            path: workdir,
        })
    }

    /// Get repository working directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The repository's git directory (handles worktrees and submodules)
    pub fn git_dir(&self) -> &Path {
        self.repo.path()
    }

    /// Current branch name, `None` on a detached or unborn HEAD
    pub fn get_current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => return Ok(None),
            Err(e) => return Err(TandemError::Git(e)),
        };

        if head.is_branch() {
            Ok(head.shorthand().map(String::from))
        } else {
            Ok(None)
        }
    }

    /// Get the HEAD commit hash
    pub fn get_head_commit_hash(&self) -> Result<String> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Resolve any revision expression to a commit id
    pub fn resolve_reference(&self, reference: &str) -> Result<Oid> {
        let object = self.repo.revparse_single(reference).map_err(|e| {
            TandemError::rebase(format!("Could not resolve '{reference}': {e}"))
        })?;
        Ok(object.peel_to_commit()?.id())
    }

    /// Tracked changes in index or work tree; submodule pointers are ignored like `git rebase` does
    pub fn has_local_changes(&self) -> Result<bool> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(false)
            .include_ignored(false)
            .exclude_submodules(true);

        let statuses = self.repo.statuses(Some(&mut options))?;
        let dirty = statuses.iter().any(|entry| {
            entry.status().intersects(
                git2::Status::INDEX_NEW
                    | git2::Status::INDEX_MODIFIED
                    | git2::Status::INDEX_DELETED
                    | git2::Status::INDEX_RENAMED
                    | git2::Status::INDEX_TYPECHANGE
                    | git2::Status::WT_MODIFIED
                    | git2::Status::WT_DELETED
                    | git2::Status::WT_RENAMED
                    | git2::Status::WT_TYPECHANGE,
            )
        });

        Ok(dirty)
    }

    /// Whether git reports a rebase in progress
    pub fn is_rebase_in_progress(&self) -> bool {
        matches!(
            self.repo.state(),
            RepositoryState::Rebase
                | RepositoryState::RebaseInteractive
                | RepositoryState::RebaseMerge
                | RepositoryState::ApplyMailboxOrRebase
        )
    }

    /// Check if there are unmerged entries in the index
    pub fn has_conflicts(&self) -> Result<bool> {
        let index = self.repo.index()?;
        Ok(index.has_conflicts())
    }

    /// Paths with unmerged entries in the index
    pub fn get_conflicted_files(&self) -> Result<Vec<String>> {
        let index = self.repo.index()?;
        let mut files = Vec::new();

        for conflict in index.conflicts()? {
            let conflict = conflict?;
            let entry = conflict.our.or(conflict.their).or(conflict.ancestor);
            if let Some(entry) = entry {
                let path = String::from_utf8_lossy(&entry.path).to_string();
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }

        Ok(files)
    }

    /// Stage text conflicts the user finished editing: both sides are text
    /// blobs and the markers git wrote are gone. Binary, submodule and
    /// one-sided conflicts (modify/delete, renames) are never staged here;
    /// they stay until the user runs `git add` or `git rm` on them.
    /// Returns the files that still need manual resolution.
    pub fn stage_resolved_conflicts(&self) -> Result<Vec<String>> {
        let mut index = self.repo.index()?;
        let conflicts = index
            .conflicts()?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let mut remaining = Vec::new();

        for conflict in conflicts {
            let entry = conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref());
            let Some(entry) = entry else {
                continue;
            };
            let file = String::from_utf8_lossy(&entry.path).to_string();

            let (Some(ours), Some(theirs)) = (&conflict.our, &conflict.their) else {
                debug!("{} is missing on one side, leaving it to the user", file);
                remaining.push(file);
                continue;
            };
            if ours.path != theirs.path || !self.is_text_entry(ours) || !self.is_text_entry(theirs)
            {
                debug!("{} is not a text conflict, leaving it to the user", file);
                remaining.push(file);
                continue;
            }

            match std::fs::read(self.path.join(&file)) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    index.remove_path(Path::new(&file))?;
                    debug!("Removed resolved file {}", file);
                }
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(content) if !has_conflict_markers(&content) => {
                        index.add_path(Path::new(&file))?;
                        debug!("Staged resolved file {}", file);
                    }
                    _ => remaining.push(file),
                },
                Err(e) => {
                    debug!("Couldn't read {}: {}", file, e);
                    remaining.push(file);
                }
            }
        }

        index.write()?;
        Ok(remaining)
    }

    /// Regular file whose blob git merges line by line
    fn is_text_entry(&self, entry: &git2::IndexEntry) -> bool {
        const GITLINK_MODE: u32 = 0o160000;
        if entry.mode == GITLINK_MODE {
            return false;
        }
        self.repo
            .find_blob(entry.id)
            .map(|blob| !blob.is_binary())
            .unwrap_or(false)
    }

    /// The commit git is currently applying during a rebase, if any
    pub fn current_rebase_commit(&self) -> Result<Option<CommitSummary>> {
        let oid = match self.repo.revparse_single("REBASE_HEAD") {
            Ok(object) => Some(object.id()),
            Err(_) => self.read_stopped_sha()?,
        };

        let Some(oid) = oid else {
            return Ok(None);
        };

        let commit = self.repo.find_commit(oid)?;
        Ok(Some(CommitSummary {
            id: oid.to_string(),
            summary: commit.summary().unwrap_or("").to_string(),
        }))
    }

    fn read_stopped_sha(&self) -> Result<Option<Oid>> {
        let candidates = [
            self.git_dir().join("rebase-merge").join("stopped-sha"),
            self.git_dir().join("rebase-apply").join("original-commit"),
        ];

        for candidate in candidates {
            if candidate.exists() {
                let content = std::fs::read_to_string(&candidate)?;
                let short = content.trim();
                if short.is_empty() {
                    continue;
                }
                let object = self.repo.revparse_single(short)?;
                return Ok(Some(object.id()));
            }
        }

        Ok(None)
    }

    /// Paths that differ between two revisions
    pub fn changed_paths_between(&self, from: &str, to: &str) -> Result<Vec<PathBuf>> {
        let from_tree = self.repo.find_commit(self.resolve_reference(from)?)?.tree()?;
        let to_tree = self.repo.find_commit(self.resolve_reference(to)?)?.tree()?;
        let diff = self
            .repo
            .diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)?;

        let mut paths = Vec::new();
        for delta in diff.deltas() {
            for file in [delta.old_file(), delta.new_file()] {
                if let Some(path) = file.path() {
                    let path = path.to_path_buf();
                    if !paths.contains(&path) {
                        paths.push(path);
                    }
                }
            }
        }

        Ok(paths)
    }

    /// Commits reachable from `to` but not from `from`
    pub fn get_commits_between(&self, from: &str, to: &str) -> Result<Vec<Oid>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.push(self.resolve_reference(to)?)?;
        revwalk.hide(self.resolve_reference(from)?)?;

        let mut commits = Vec::new();
        for oid in revwalk {
            commits.push(oid?);
        }
        Ok(commits)
    }

    /// Whether a commit is already contained in one of the given remote branches
    pub fn is_commit_published(&self, commit: Oid, remote: &str, branches: &[String]) -> bool {
        branches.iter().any(|branch| {
            let reference = format!("refs/remotes/{remote}/{branch}");
            let Ok(tip) = self.repo.refname_to_id(&reference) else {
                return false;
            };
            tip == commit || self.repo.graph_descendant_of(tip, commit).unwrap_or(false)
        })
    }

    /// Initialized submodule working directories, recursively
    pub fn submodule_roots(&self) -> Result<Vec<PathBuf>> {
        let mut roots = Vec::new();

        for submodule in self.repo.submodules()? {
            let root = self.path.join(submodule.path());
            if !root.join(".git").exists() {
                debug!("Skipping uninitialized submodule {}", root.display());
                continue;
            }

            roots.push(root.clone());
            match GitRepository::open(&root) {
                Ok(nested) => roots.extend(nested.submodule_roots()?),
                Err(e) => debug!("Could not open submodule {}: {}", root.display(), e),
            }
        }

        Ok(roots)
    }

    /// Stash local changes under `message`. Returns false when there was nothing to stash.
    pub fn stash_save(&mut self, message: &str) -> Result<bool> {
        if !self.has_local_changes()? {
            return Ok(false);
        }

        let signature = self
            .repo
            .signature()
            .or_else(|_| Signature::now("tandem", "tandem@localhost"))?;

        let oid = self
            .repo
            .stash_save(&signature, message, Some(StashFlags::DEFAULT))?;

        info!("Stashed local changes in {} as {}", self.path.display(), oid);
        Ok(true)
    }

    /// Pop the stash entry whose message contains `message`. Returns false if none matches.
    pub fn stash_pop_by_message(&mut self, message: &str) -> Result<bool> {
        let mut found = None;
        self.repo.stash_foreach(|index, stash_message, _oid| {
            if stash_message.contains(message) {
                found = Some(index);
                false
            } else {
                true
            }
        })?;

        let Some(index) = found else {
            return Ok(false);
        };

        self.repo.stash_pop(index, None)?;
        info!("Restored stashed changes in {}", self.path.display());
        Ok(true)
    }

    /// Reload the index from disk so cached stat data matches the rewritten work tree
    pub fn reload_index(&self) -> Result<()> {
        let mut index = self.repo.index()?;
        index.read(true)?;
        Ok(())
    }
}

/// True when a file still contains unresolved conflict markers
pub fn has_conflict_markers(content: &str) -> bool {
    content.lines().any(|line| {
        line == CONFLICT_SEPARATOR || CONFLICT_MARKERS.iter().any(|marker| line.starts_with(marker))
    })
}
