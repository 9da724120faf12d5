use crate::config::Settings;
use crate::errors::{Result, TandemError};
use crate::rebase::cancel::CancellationToken;
use crate::rebase::collaborators::{Collaborators, Report, ReportAction, ReportLevel};
use crate::rebase::machine::{RootContext, RootRun};
use crate::rebase::model::{
    OperationSpec, OrchestrationState, OutcomeKind, OutcomeMap, Resource, ResourceId,
    ResumeMode, ResumePoint, RunSummary, SuccessType,
};
use std::cmp::Reverse;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Behavior switches taken from the settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebaseOptions {
    pub save_local_changes: bool,
    pub check_published_commits: bool,
    pub remote: String,
    pub protected_branches: Vec<String>,
}

impl RebaseOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            save_local_changes: settings.rebase.save_local_changes,
            check_published_commits: settings.rebase.check_published_commits,
            remote: settings.git.remote.clone(),
            protected_branches: settings.rebase.protected_branches.clone(),
        }
    }
}

impl Default for RebaseOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

/// What `abort` undid
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbortSummary {
    pub aborted: Option<ResourceId>,
    pub rolled_back: Vec<ResourceId>,
}

/// Nested repositories first, siblings keep their order
pub fn sort_by_dependency(mut resources: Vec<&Resource>) -> Vec<&Resource> {
    resources.sort_by_key(|resource| Reverse(resource.id.depth()));
    resources
}

fn item_if_all_the_same<T: PartialEq + Clone>(items: &[T]) -> Option<T> {
    let first = items.first()?;
    if items.iter().all(|item| item == first) {
        Some(first.clone())
    } else {
        None
    }
}

/// Rebases a family of repositories, one after another, and keeps the
/// resumable state in the store between runs
pub struct RebaseOrchestrator<'a> {
    deps: Collaborators<'a>,
    options: RebaseOptions,
    cancel: CancellationToken,
}

impl<'a> RebaseOrchestrator<'a> {
    pub fn new(deps: Collaborators<'a>, options: RebaseOptions, cancel: CancellationToken) -> Self {
        Self {
            deps,
            options,
            cancel,
        }
    }

    /// Fresh state for `resources`, remembering where every branch started
    pub fn prepare(
        &self,
        family_root: PathBuf,
        resources: Vec<Resource>,
        spec: OperationSpec,
    ) -> Result<OrchestrationState> {
        let mut state = OrchestrationState::new(family_root, resources, spec);

        for resource in &state.resources {
            if let Some(branch) = self.deps.inspector.current_branch(resource)? {
                state.initial_branches.insert(resource.id.clone(), branch);
            }
            match self.deps.inspector.head(resource) {
                Ok(head) => {
                    state.initial_heads.insert(resource.id.clone(), head);
                }
                Err(e) => debug!("No head to remember for {}: {}", resource.id, e),
            }
        }

        Ok(state)
    }

    /// Start or continue the rebase described by `state`.
    ///
    /// Cancellation leaves the persisted state as it was; any other error
    /// clears it before propagating.
    pub fn run(&mut self, state: OrchestrationState) -> Result<RunSummary> {
        if !self.check_for_rebasing_published_commits(&state)? {
            info!("Rebase of published commits declined");
            return Ok(RunSummary::declined());
        }

        match self.do_rebase(&state) {
            Err(e) if e.is_cancelled() => {
                info!("Rebase cancelled, persisted state left untouched");
                if self.deps.saver.were_changes_saved() {
                    warn!(
                        "Local changes remain in the {}",
                        self.deps.saver.saver_name()
                    );
                }
                Err(e)
            }
            Err(e) => {
                if let Err(clear_error) = self.deps.store.clear() {
                    warn!("Couldn't clear rebase state: {}", clear_error);
                }
                Err(e)
            }
            Ok(summary) => Ok(summary),
        }
    }

    fn do_rebase(&mut self, state: &OrchestrationState) -> Result<RunSummary> {
        info!("Started rebase");
        debug!("Started rebase with the following spec: {:?}", state.spec);

        if let Some(record) = state.saved_changes.clone() {
            self.deps.saver.resume_from(record);
        }

        let ongoing = state.ongoing_resource().cloned();
        let resources = sort_by_dependency(state.incomplete_resources());
        let mut outcomes = state.outcomes.clone();

        if !self.save_dirty_roots_initially(&resources, ongoing.as_ref()) {
            return Ok(RunSummary::not_started(outcomes, state.should_be_saved()));
        }

        let mut latest = None;
        for resource in resources {
            self.cancel.check()?;

            let mode = if ongoing.as_ref() == Some(&resource.id) {
                Some(Self::resume_mode(state))
            } else {
                None
            };

            let changes = self.collect_future_changes(&state.spec, resource);
            let context = RootContext {
                save_local_changes: self.options.save_local_changes,
                continuing: ongoing.is_some(),
                multiple_resources: state.resources.len() > 1,
                has_prior_success: outcomes.successful().next().is_some(),
                prior_skipped: outcomes
                    .skipped_items()
                    .into_iter()
                    .filter(|(id, _)| id != &resource.id)
                    .collect(),
                already_skipped: outcomes
                    .get(&resource.id)
                    .map(|outcome| outcome.skipped().to_vec())
                    .unwrap_or_default(),
            };

            let outcome =
                RootRun::new(&mut self.deps, &self.cancel, resource, &state.spec, mode, context)
                    .run()?;

            if mode == Some(ResumeMode::Continue) {
                self.deps.refresher.mark_dirty_recursively(resource);
            }

            let kind = outcome.kind();
            let refresh = outcome.should_be_refreshed();
            outcomes.insert(resource.id.clone(), outcome);
            latest = Some(kind);

            if refresh {
                self.deps.refresher.refresh(resource, changes.as_deref());
            }
            if kind != OutcomeKind::Success {
                break;
            }
        }

        // the loop stops at the first non-success, so the last outcome is the aggregate
        let aggregate = latest.unwrap_or(OutcomeKind::NotStarted);
        if matches!(aggregate, OutcomeKind::Success | OutcomeKind::NotStarted) {
            debug!("Rebase completed successfully.");
            self.restore_saved_changes();
        }
        if aggregate == OutcomeKind::Success {
            self.notify_success(state, &outcomes);
        }

        let mut next = state.clone_with_new_outcomes(outcomes);
        next.saved_changes = self.deps.saver.saved_record();
        let resumable = next.should_be_saved();
        if resumable {
            self.deps.store.save(&next)?;
            if let ResumePoint::At { resource, .. } = &next.resume_point {
                info!("Rebase suspended in {}", resource);
            }
        } else {
            self.deps.store.clear()?;
        }

        Ok(RunSummary {
            aggregate,
            skipped: next.outcomes.skipped_items(),
            outcomes: next.outcomes,
            resumable,
            declined: false,
        })
    }

    fn resume_mode(state: &OrchestrationState) -> ResumeMode {
        match (&state.spec.resume_mode, &state.resume_point) {
            (Some(mode), _) => *mode,
            (None, ResumePoint::At { mode, .. }) => *mode,
            (None, ResumePoint::None) => ResumeMode::Continue,
        }
    }

    /// Save local changes of every dirty resource up front, except the one
    /// git already stopped in. Returns false when the rebase must not start.
    fn save_dirty_roots_initially(
        &mut self,
        resources: &[&Resource],
        ongoing: Option<&ResourceId>,
    ) -> bool {
        if !self.options.save_local_changes {
            return true;
        }

        let inspector = self.deps.inspector;
        let dirty_roots: Vec<PathBuf> = resources
            .iter()
            .filter(|resource| Some(&resource.id) != ongoing)
            .filter(|resource| {
                inspector.has_local_changes(resource).unwrap_or_else(|e| {
                    debug!("Couldn't check local changes in {}: {}", resource.id, e);
                    true
                })
            })
            .map(|resource| resource.root.clone())
            .collect();

        if dirty_roots.is_empty() {
            return true;
        }

        match self.deps.saver.save_local_changes(&dirty_roots) {
            Ok(()) => true,
            Err(reason) => {
                warn!("Couldn't save local changes: {}", reason);
                self.deps
                    .notifier
                    .notify(Report::new(ReportLevel::Error, "Rebase Not Started", reason));
                false
            }
        }
    }

    /// Paths the rebase is going to touch; `None` when they cannot be computed
    fn collect_future_changes(
        &self,
        spec: &OperationSpec,
        resource: &Resource,
    ) -> Option<Vec<PathBuf>> {
        let diff = |from: &str, to: &str| {
            self.deps
                .inspector
                .changed_paths(resource, from, to)
                .map_err(|e| {
                    debug!(
                        "Couldn't compute changes {}..{} in {}: {}",
                        from, to, resource.id, e
                    )
                })
                .ok()
        };

        let mut changes = Vec::new();
        if let Some(branch) = &spec.branch {
            changes.extend(diff("HEAD", branch)?);
        }

        let from = spec
            .new_base
            .as_deref()
            .or(spec.branch.as_deref())
            .unwrap_or("HEAD");
        changes.extend(diff(from, &spec.upstream)?);
        Some(changes)
    }

    fn restore_saved_changes(&mut self) {
        if let Err(e) = self.deps.saver.restore_saved_changes() {
            warn!("Couldn't restore local changes: {}", e);
            self.deps.notifier.notify(
                Report::new(
                    ReportLevel::Warning,
                    "Local Changes Not Restored",
                    e.to_string(),
                )
                .with_action(ReportAction::ViewSaved),
            );
        }
    }

    fn notify_success(&mut self, state: &OrchestrationState, outcomes: &OutcomeMap) {
        let branches: Vec<Option<String>> = state
            .resources
            .iter()
            .map(|resource| {
                self.deps
                    .inspector
                    .current_branch(resource)
                    .ok()
                    .flatten()
            })
            .collect();
        let rebased_branch = item_if_all_the_same(&branches).flatten();

        let success_types: Vec<SuccessType> = outcomes.successful().map(|(_, t)| t).collect();
        let common_type = item_if_all_the_same(&success_types).unwrap_or(SuccessType::Rebased);

        let mut base = state.spec.base_reference().to_string();
        if base == "HEAD" {
            let initial: Vec<&String> = state.initial_branches.values().collect();
            if let Some(branch) = item_if_all_the_same(&initial) {
                base = branch.clone();
            }
        }

        let message = common_type.format_message(rebased_branch.as_deref(), &base);
        self.deps.notifier.notify(
            Report::new(ReportLevel::Info, "Rebase Successful", message)
                .with_skipped(outcomes.skipped_items()),
        );
    }

    fn check_for_rebasing_published_commits(&mut self, state: &OrchestrationState) -> Result<bool> {
        if state.spec.resume_mode.is_some()
            || state.ongoing_resource().is_some()
            || !self.options.check_published_commits
        {
            return Ok(true);
        }

        for resource in &state.resources {
            let branch = match &state.spec.branch {
                Some(branch) => branch.clone(),
                None => match self.deps.inspector.current_branch(resource) {
                    Ok(Some(branch)) => branch,
                    Ok(None) => {
                        warn!("No current branch in {}", resource.id);
                        return Ok(true);
                    }
                    Err(e) => {
                        warn!("Couldn't read current branch of {}: {}", resource.id, e);
                        return Ok(true);
                    }
                },
            };

            let published = self
                .deps
                .inspector
                .has_published_commits(
                    resource,
                    &state.spec.upstream,
                    &branch,
                    &self.options.remote,
                    &self.options.protected_branches,
                )
                .unwrap_or_else(|e| {
                    warn!("Couldn't collect commits of {}: {}", resource.id, e);
                    true
                });

            if published {
                return self.deps.prompter.confirm(
                    "You're trying to rebase some commits already pushed to a protected branch. \
                     Rebasing them would duplicate commits. Rebase anyway?",
                    false,
                );
            }
        }

        Ok(true)
    }

    /// Abort the rebase git stopped in, offer to roll back resources that
    /// were already rebased, restore saved changes and forget the state
    pub fn abort(&mut self, state: OrchestrationState) -> Result<AbortSummary> {
        info!("Aborting rebase {}", state.run_id);
        let mut summary = AbortSummary::default();

        if let Some(id) = state.ongoing_resource() {
            let resource = state.resource(id).ok_or_else(|| {
                TandemError::state(format!("Unknown repository '{id}' in rebase state"))
            })?;

            if self.deps.inspector.is_rebase_in_progress(resource)? {
                let output = self.deps.runner.abort(resource)?;
                if !output.success {
                    let message = output.error_text();
                    self.deps.notifier.notify(
                        Report::new(
                            ReportLevel::Error,
                            "Abort Rebase Failed",
                            format!("{id}: {message}"),
                        )
                        .for_resource(id),
                    );
                    return Err(TandemError::rebase(format!(
                        "git rebase --abort failed in {id}: {message}"
                    )));
                }
                summary.aborted = Some(id.clone());
            } else {
                debug!("No rebase in progress in {}", id);
            }
        }

        for (id, outcome) in state.outcomes.iter() {
            if !outcome.is_success() {
                continue;
            }
            let (Some(resource), Some(initial_head)) =
                (state.resource(id), state.initial_heads.get(id))
            else {
                continue;
            };

            let head = match self.deps.inspector.head(resource) {
                Ok(head) => head,
                Err(e) => {
                    warn!("Couldn't read head of {}: {}", id, e);
                    continue;
                }
            };
            if &head == initial_head {
                continue;
            }

            let short_head: String = initial_head.chars().take(8).collect();
            let question = format!("{id} was already rebased. Roll it back to {short_head}?");
            if !self.deps.prompter.confirm(&question, false)? {
                continue;
            }

            let output = self.deps.runner.reset_keep(resource, initial_head)?;
            if output.success {
                info!("Rolled back {} to {}", id, short_head);
                summary.rolled_back.push(id.clone());
            } else {
                warn!("Couldn't roll back {}: {}", id, output.error_text());
                self.deps.notifier.notify(
                    Report::new(ReportLevel::Warning, "Rollback Failed", output.error_text())
                        .for_resource(id),
                );
            }
        }

        if let Some(record) = state.saved_changes.clone() {
            self.deps.saver.resume_from(record);
            self.restore_saved_changes();
        }

        self.deps.store.clear()?;
        self.deps.notifier.notify(Report::new(
            ReportLevel::Info,
            "Rebase Aborted",
            format!("Rolled back {} repositories", summary.rolled_back.len()),
        ));
        Ok(summary)
    }
}
