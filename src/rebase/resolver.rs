use crate::cli::output::Output;
use crate::errors::Result;
use crate::git::GitRepository;
use crate::rebase::collaborators::{ConflictResolver, ResolveResult};
use crate::rebase::model::Resource;
use dialoguer::{theme::ColorfulTheme, Confirm};
use tracing::{debug, info};

/// Resolves conflicts through the index: text files whose conflict markers
/// are gone get staged, anything else waits for the user to `git add` or
/// `git rm` it. In interactive mode the user is first asked to edit them.
#[derive(Debug, Clone)]
pub struct IndexConflictResolver {
    interactive: bool,
}

impl IndexConflictResolver {
    pub fn new(interactive: bool) -> Self {
        Self { interactive }
    }

    fn wait_for_user(&self, resource: &Resource, files: &[String]) -> Result<bool> {
        Output::warning(format!("Conflicts in {}:", resource.id));
        for file in files {
            Output::bullet(file);
        }

        let done = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Resolve the conflicts in your editor. Done?")
            .default(true)
            .interact()?;
        Ok(done)
    }
}

impl ConflictResolver for IndexConflictResolver {
    fn resolve(&mut self, resource: &Resource) -> Result<ResolveResult> {
        let repo = GitRepository::open(&resource.root)?;
        let conflicted = repo.get_conflicted_files()?;

        if conflicted.is_empty() {
            debug!("Nothing to merge in {}", resource.id);
            return Ok(ResolveResult::NothingToMerge);
        }

        if self.interactive && !self.wait_for_user(resource, &conflicted)? {
            return Ok(ResolveResult::UnresolvedRemain);
        }

        let remaining = repo.stage_resolved_conflicts()?;
        if remaining.is_empty() {
            info!("All conflicts resolved in {}", resource.id);
            Ok(ResolveResult::AllResolved)
        } else {
            info!(
                "{} conflicted files remain in {}",
                remaining.len(),
                resource.id
            );
            Ok(ResolveResult::UnresolvedRemain)
        }
    }
}
