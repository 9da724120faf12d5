use crate::errors::{Result, TandemError};
use crate::git::GitRepository;
use crate::rebase::collaborators::StateStore;
use crate::rebase::model::OrchestrationState;
use crate::utils::atomic_file;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "TANDEM_REBASE_STATE";

/// Persists the resumable state inside the git directory of the family root
#[derive(Debug, Clone)]
pub struct FileStateStore {
    state_path: PathBuf,
    family_root: PathBuf,
}

impl FileStateStore {
    pub fn for_family(family_root: &Path) -> Result<Self> {
        let repo = GitRepository::open(family_root)?;
        Ok(Self {
            state_path: repo.git_dir().join(STATE_FILE),
            family_root: family_root.to_path_buf(),
        })
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }
}

impl StateStore for FileStateStore {
    fn load(&self) -> Result<Option<OrchestrationState>> {
        if !self.state_path.exists() {
            return Ok(None);
        }

        let json = std::fs::read_to_string(&self.state_path)
            .map_err(|e| TandemError::state(format!("Failed to read rebase state: {e}")))?;
        let state: OrchestrationState = serde_json::from_str(&json)
            .map_err(|e| TandemError::state(format!("Failed to parse rebase state: {e}")))?;

        if !same_location(&state.family_root, &self.family_root) {
            return Err(TandemError::state(format!(
                "Rebase state at {} belongs to {}",
                self.state_path.display(),
                state.family_root.display()
            )));
        }

        tracing::debug!("Loaded rebase state from {:?}", self.state_path);
        Ok(Some(state))
    }

    fn save(&mut self, state: &OrchestrationState) -> Result<()> {
        atomic_file::write_json(&self.state_path, state)?;
        tracing::debug!("Saved rebase state to {:?}", self.state_path);
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        if self.state_path.exists() {
            std::fs::remove_file(&self.state_path)
                .map_err(|e| TandemError::state(format!("Failed to delete rebase state: {e}")))?;
            tracing::debug!("Deleted rebase state file");
        }
        Ok(())
    }

    fn exists(&self) -> bool {
        self.state_path.exists()
    }
}

fn same_location(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Keeps the state in memory
#[derive(Debug, Default, Clone)]
pub struct MemoryStateStore {
    state: Option<OrchestrationState>,
    saves: usize,
    clears: usize,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: OrchestrationState) -> Self {
        Self {
            state: Some(state),
            ..Self::default()
        }
    }

    pub fn state(&self) -> Option<&OrchestrationState> {
        self.state.as_ref()
    }

    pub fn save_count(&self) -> usize {
        self.saves
    }

    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<Option<OrchestrationState>> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &OrchestrationState) -> Result<()> {
        self.state = Some(state.clone());
        self.saves += 1;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.state = None;
        self.clears += 1;
        Ok(())
    }

    fn exists(&self) -> bool {
        self.state.is_some()
    }
}
