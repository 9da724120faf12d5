use crate::cli::commands::rebase::Family;
use crate::cli::output::Output;
use crate::errors::Result;
use crate::git::GitRepository;
use crate::rebase::notifier::{format_skipped_commits, skipped_commits_header};
use crate::rebase::{OrchestrationState, StateStore};
use tracing::debug;

/// Show the suspended rebase of the current family, if any
pub async fn run() -> Result<()> {
    let family = Family::discover()?;
    show_status(&family)?;
    Ok(())
}

/// Returns whether a suspended rebase was found
fn show_status(family: &Family) -> Result<bool> {
    Output::section("Tandem Rebase");

    let Some(state) = family.store()?.load()? else {
        Output::info("No tandem rebase in progress");
        return Ok(false);
    };

    show_state(&state);
    Ok(true)
}

fn show_state(state: &OrchestrationState) {
    Output::sub_item(format!(
        "Started: {}",
        state.started_at.format("%Y-%m-%d %H:%M:%S")
    ));
    Output::sub_item(format!("Onto: {}", state.spec.base_reference()));
    if let Some(branch) = &state.spec.branch {
        Output::sub_item(format!("Branch: {branch}"));
    }

    let ongoing = state.ongoing_resource();
    Output::section("Repositories");
    for resource in &state.resources {
        let outcome = state.outcomes.get(&resource.id).map(|outcome| outcome.kind());
        let stopped_here = Some(&resource.id) == ongoing;

        Output::repository(&resource.id, outcome, stopped_here);
        if stopped_here {
            show_conflicts(&resource.root);
        }
    }

    let skipped = state.outcomes.skipped_items();
    if !skipped.is_empty() {
        Output::sub_item(skipped_commits_header(skipped.len()));
        for line in format_skipped_commits(&skipped) {
            Output::bullet(line);
        }
    }

    if let Some(saved) = &state.saved_changes {
        Output::sub_item(format!(
            "Local changes of {} repositories saved as '{}'",
            saved.roots.len(),
            saved.message
        ));
    }

    Output::next_steps(&[
        "tandem continue - resume after resolving conflicts",
        "tandem skip - drop the current commit",
        "tandem abort - give up and roll back",
    ]);
}

fn show_conflicts(root: &std::path::Path) {
    let conflicts = match GitRepository::open(root).and_then(|repo| repo.get_conflicted_files()) {
        Ok(conflicts) => conflicts,
        Err(e) => {
            debug!("Couldn't list conflicts in {}: {}", root.display(), e);
            return;
        }
    };

    for file in conflicts {
        Output::bullet(format!("conflict: {file}"));
    }
}
