use crate::errors::{Result, TandemError};
use crate::git::GitRepository;
use crate::rebase::collaborators::ChangeSaver;
use crate::rebase::model::SavedChanges;
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, warn};

/// Saves local changes with `git stash`, one entry per root, all under one message
#[derive(Debug, Clone)]
pub struct StashSaver {
    message: String,
    saved_roots: Vec<PathBuf>,
}

impl StashSaver {
    pub fn new() -> Self {
        Self {
            message: format!(
                "tandem: uncommitted changes before rebase at {}",
                Utc::now().format("%Y-%m-%d %H:%M:%S")
            ),
            saved_roots: Vec::new(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Default for StashSaver {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeSaver for StashSaver {
    fn save_local_changes(&mut self, roots: &[PathBuf]) -> std::result::Result<(), String> {
        for root in roots {
            if self.saved_roots.contains(root) {
                continue;
            }

            let stashed = GitRepository::open(root)
                .and_then(|mut repo| repo.stash_save(&self.message))
                .map_err(|e| {
                    format!(
                        "Couldn't {} local uncommitted changes in {}:\n{}",
                        self.saver_name(),
                        root.display(),
                        e
                    )
                })?;

            if stashed {
                self.saved_roots.push(root.clone());
            }
        }
        Ok(())
    }

    fn restore_saved_changes(&mut self) -> Result<()> {
        let mut failures = Vec::new();

        for root in std::mem::take(&mut self.saved_roots) {
            let restored = GitRepository::open(&root)
                .and_then(|mut repo| repo.stash_pop_by_message(&self.message));
            match restored {
                Ok(true) => info!("Restored local changes in {}", root.display()),
                Ok(false) => {
                    warn!("No stash entry '{}' found in {}", self.message, root.display());
                    failures.push(format!("{}: stash entry not found", root.display()));
                }
                Err(e) => {
                    warn!("Couldn't restore local changes in {}: {}", root.display(), e);
                    failures.push(format!("{}: {}", root.display(), e));
                    self.saved_roots.push(root);
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TandemError::rebase(format!(
                "Couldn't restore local changes:\n{}",
                failures.join("\n")
            )))
        }
    }

    fn were_changes_saved(&self) -> bool {
        !self.saved_roots.is_empty()
    }

    fn saved_record(&self) -> Option<SavedChanges> {
        if self.saved_roots.is_empty() {
            return None;
        }
        Some(SavedChanges {
            message: self.message.clone(),
            roots: self.saved_roots.clone(),
        })
    }

    fn resume_from(&mut self, record: SavedChanges) {
        self.message = record.message;
        for root in record.roots {
            if !self.saved_roots.contains(&root) {
                self.saved_roots.push(root);
            }
        }
    }

    fn saver_name(&self) -> &str {
        "stash"
    }
}
