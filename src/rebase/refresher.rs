use crate::git::{GitCommandRunner, GitRepository};
use crate::rebase::collaborators::Refresher;
use crate::rebase::model::Resource;
use std::path::PathBuf;
use tracing::{debug, warn};

/// Beyond this many changed paths the whole index is refreshed at once
const MAX_PATHS_PER_REFRESH: usize = 512;

/// Refreshes the git index stat cache after a rebase rewrote files
#[derive(Debug, Clone)]
pub struct IndexRefresher {
    runner: GitCommandRunner,
}

impl IndexRefresher {
    pub fn new<S: Into<String>>(git_executable: S) -> Self {
        Self {
            runner: GitCommandRunner::new(git_executable),
        }
    }

    fn refresh_index(&self, resource: &Resource, paths: Option<&[PathBuf]>) {
        match self.runner.refresh_index(resource, paths) {
            Ok(output) if output.success => {}
            // exit code 1 only means some entries still need an update
            Ok(output) => debug!(
                "Index refresh reported stale entries in {}: {}",
                resource.id,
                output.output_text()
            ),
            Err(e) => warn!("Couldn't refresh index of {}: {}", resource.id, e),
        }
    }

    fn reload_and_refresh(&self, resource: &Resource) {
        match GitRepository::open(&resource.root).and_then(|repo| repo.reload_index()) {
            Ok(()) => self.refresh_index(resource, None),
            Err(e) => warn!("Couldn't reload index of {}: {}", resource.id, e),
        }
    }
}

impl Refresher for IndexRefresher {
    fn refresh(&mut self, resource: &Resource, changed_paths: Option<&[PathBuf]>) {
        match changed_paths {
            Some([]) => debug!("No changed paths to refresh in {}", resource.id),
            Some(paths) if paths.len() <= MAX_PATHS_PER_REFRESH => {
                debug!("Refreshing {} changed paths in {}", paths.len(), resource.id);
                self.refresh_index(resource, Some(paths));
            }
            _ => {
                debug!("Refreshing all of {}", resource.id);
                self.refresh_index(resource, None);
            }
        }
    }

    /// The resource and every initialized repository nested in it
    fn mark_dirty_recursively(&mut self, resource: &Resource) {
        debug!("Reloading index of {} and nested repositories", resource.id);
        self.reload_and_refresh(resource);

        let nested = match GitRepository::open(&resource.root).and_then(|repo| repo.submodule_roots())
        {
            Ok(nested) => nested,
            Err(e) => {
                warn!("Couldn't list repositories nested in {}: {}", resource.id, e);
                return;
            }
        };
        for root in nested {
            self.reload_and_refresh(&Resource::in_family(&resource.root, &root));
        }
    }
}
