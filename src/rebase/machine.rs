//! Per-resource rebase state machine.
//!
//! Every `git rebase` call is classified by the first rule in [`RULES`] whose
//! predicate matches. A rule either finishes the resource with an outcome or
//! asks for another attempt, possibly in a different mode.

use crate::errors::Result;
use crate::git::{
    LineListener, RebaseCommandResult, RebaseProblemDetector, RebaseProgressListener,
    UntrackedFilesOverwrittenDetector,
};
use crate::rebase::cancel::CancellationToken;
use crate::rebase::collaborators::{Collaborators, Report, ReportAction, ReportLevel, ResolveResult};
use crate::rebase::model::{
    DetectionResult, OperationSpec, Resource, ResourceId, ResourceOutcome, ResumeMode,
    SkippedItem, SuccessType,
};
use crate::rebase::notifier::local_changes_remaining_note;
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProblemClass {
    /// The user stopped the operation
    Cancelled,
    /// Handled by retrying in place
    Recoverable,
    /// Surfaced as a suspended resource the user can continue or skip
    Resumable,
    /// Surfaced as an error unless something in the family was already rebased
    Fatal,
    None,
}

/// Everything known about one `git rebase` call
#[derive(Debug, Clone, Default)]
pub struct Attempt {
    pub detection: DetectionResult,
    pub mode: Option<ResumeMode>,
    pub retried_when_dirty: bool,
    pub current_commit: usize,
    pub output: String,
    pub error_output: String,
}

impl Attempt {
    pub fn from_command(
        result: &RebaseCommandResult,
        problems: &RebaseProblemDetector,
        untracked: &UntrackedFilesOverwrittenDetector,
        progress: &RebaseProgressListener,
        mode: Option<ResumeMode>,
        retried_when_dirty: bool,
    ) -> Self {
        let detection = DetectionResult {
            cancelled_in_commit_list: result.was_cancelled_in_commit_list(),
            cancelled_in_commit_message: result.was_cancelled_in_commit_message(),
            success: result.success(),
            stopped_for_editing: problems.has_stopped_for_editing(),
            dirty_tree: problems.is_dirty_tree(),
            untracked_overwritten: untracked.was_message_detected(),
            untracked_paths: untracked.relative_file_paths().to_vec(),
            no_change: problems.is_no_change_error(),
            merge_conflict: problems.is_merge_conflict(),
        };

        let error_output = if result.output.stderr.is_empty() {
            result.output.output_text()
        } else {
            result.output.error_text()
        };

        Self {
            detection,
            mode,
            retried_when_dirty,
            current_commit: progress.current_commit(),
            output: result.output.all_lines().collect::<Vec<_>>().join("\n"),
            error_output,
        }
    }

    /// Resuming, or git got past the first commit: the branch is already partly rewritten
    pub fn something_rebased(&self) -> bool {
        self.mode.is_some() || self.current_commit > 1
    }
}

/// What to do after a rule handled an attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Retry,
    Finished(ResourceOutcome),
}

type Handler = fn(&mut RootRun<'_, '_>, &Attempt) -> Result<Flow>;

pub struct Rule {
    pub name: &'static str,
    pub class: ProblemClass,
    pub applies: fn(&Attempt) -> bool,
    handle: Handler,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("class", &self.class)
            .finish()
    }
}

/// Classification policy, highest priority first. The last rule always applies.
pub static RULES: [Rule; 9] = [
    Rule {
        name: "cancelled-in-commit-list",
        class: ProblemClass::Cancelled,
        applies: |a| a.detection.cancelled_in_commit_list,
        handle: |run, attempt| run.on_cancelled_in_commit_list(attempt),
    },
    Rule {
        name: "cancelled-in-commit-message",
        class: ProblemClass::Cancelled,
        applies: |a| a.detection.cancelled_in_commit_message,
        handle: |run, attempt| run.on_stopped_for_editing(attempt),
    },
    Rule {
        name: "success",
        class: ProblemClass::None,
        applies: |a| a.detection.success && !a.detection.stopped_for_editing,
        handle: |run, attempt| run.on_success(attempt),
    },
    Rule {
        name: "stopped-for-editing",
        class: ProblemClass::Resumable,
        applies: |a| a.detection.success && a.detection.stopped_for_editing,
        handle: |run, attempt| run.on_stopped_for_editing(attempt),
    },
    Rule {
        name: "dirty-tree",
        class: ProblemClass::Recoverable,
        applies: |a| a.detection.dirty_tree && a.mode.is_none() && !a.retried_when_dirty,
        handle: |run, attempt| run.on_dirty_tree(attempt),
    },
    Rule {
        name: "untracked-files-overwritten",
        class: ProblemClass::Resumable,
        applies: |a| a.detection.untracked_overwritten,
        handle: |run, attempt| run.on_untracked_files(attempt),
    },
    Rule {
        name: "no-change",
        class: ProblemClass::Recoverable,
        applies: |a| a.detection.no_change,
        handle: |run, attempt| run.on_no_change(attempt),
    },
    Rule {
        name: "merge-conflict",
        class: ProblemClass::Recoverable,
        applies: |a| a.detection.merge_conflict,
        handle: |run, attempt| run.on_merge_conflict(attempt),
    },
    Rule {
        name: "generic-failure",
        class: ProblemClass::Fatal,
        applies: |_| true,
        handle: |run, attempt| run.on_generic_failure(attempt),
    },
];

/// First rule that applies to `attempt`
pub fn select_rule(attempt: &Attempt) -> &'static Rule {
    RULES
        .iter()
        .find(|rule| (rule.applies)(attempt))
        .unwrap_or(&RULES[RULES.len() - 1])
}

/// Facts about the surrounding run that shape reports
#[derive(Debug, Clone, Default)]
pub(crate) struct RootContext {
    pub save_local_changes: bool,
    /// The run resumes a rebase git already stopped in
    pub continuing: bool,
    pub multiple_resources: bool,
    pub has_prior_success: bool,
    pub prior_skipped: Vec<(ResourceId, SkippedItem)>,
    /// Skipped by earlier runs of this same resource
    pub already_skipped: Vec<SkippedItem>,
}

/// Drives one resource until it reaches a terminal outcome
pub(crate) struct RootRun<'o, 'a> {
    deps: &'o mut Collaborators<'a>,
    cancel: &'o CancellationToken,
    resource: &'o Resource,
    spec: &'o OperationSpec,
    context: RootContext,
    skipped: Vec<SkippedItem>,
    mode: Option<ResumeMode>,
    retried_when_dirty: bool,
}

impl<'o, 'a> RootRun<'o, 'a> {
    pub(crate) fn new(
        deps: &'o mut Collaborators<'a>,
        cancel: &'o CancellationToken,
        resource: &'o Resource,
        spec: &'o OperationSpec,
        mode: Option<ResumeMode>,
        mut context: RootContext,
    ) -> Self {
        let skipped = std::mem::take(&mut context.already_skipped);
        Self {
            deps,
            cancel,
            resource,
            spec,
            context,
            skipped,
            mode,
            retried_when_dirty: false,
        }
    }

    pub(crate) fn run(mut self) -> Result<ResourceOutcome> {
        info!(
            "Rebasing {}, mode: {}",
            self.resource.id,
            self.mode
                .map_or_else(|| "standard".to_string(), |mode| mode.to_string())
        );

        if self.mode == Some(ResumeMode::Skip) {
            self.record_current_commit();
        }

        loop {
            self.cancel.check()?;

            let mut problems = RebaseProblemDetector::new();
            let mut untracked = UntrackedFilesOverwrittenDetector::new();
            let mut progress = RebaseProgressListener::new();

            let result = {
                let mut listeners: [&mut dyn LineListener; 3] =
                    [&mut problems, &mut untracked, &mut progress];
                self.deps
                    .runner
                    .rebase(self.resource, self.spec, self.mode, &mut listeners)?
            };

            let attempt = Attempt::from_command(
                &result,
                &problems,
                &untracked,
                &progress,
                self.mode,
                self.retried_when_dirty,
            );
            let rule = select_rule(&attempt);
            debug!(
                "[{}] attempt classified as {} ({:?})",
                self.resource.id, rule.name, rule.class
            );

            match (rule.handle)(&mut self, &attempt)? {
                Flow::Retry => continue,
                Flow::Finished(outcome) => return Ok(outcome),
            }
        }
    }

    fn on_cancelled_in_commit_list(&mut self, _attempt: &Attempt) -> Result<Flow> {
        info!("Rebase of {} was cancelled in the commit list", self.resource.id);
        Ok(Flow::Finished(ResourceOutcome::NotStarted))
    }

    fn on_success(&mut self, attempt: &Attempt) -> Result<Flow> {
        debug!("Successfully rebased {}", self.resource.id);
        Ok(Flow::Finished(ResourceOutcome::Success {
            success_type: SuccessType::parse_from_output(&attempt.output),
            skipped: std::mem::take(&mut self.skipped),
        }))
    }

    fn on_stopped_for_editing(&mut self, _attempt: &Attempt) -> Result<Flow> {
        let report = Report::new(
            ReportLevel::Info,
            "Rebase Stopped for Editing",
            "Once you are done editing, run `tandem continue`.",
        )
        .for_resource(&self.resource.id)
        .with_action(ReportAction::Continue)
        .with_action(ReportAction::Abort);
        self.deps.notifier.notify(report);

        Ok(Flow::Finished(ResourceOutcome::Suspended {
            skipped: std::mem::take(&mut self.skipped),
        }))
    }

    fn on_dirty_tree(&mut self, attempt: &Attempt) -> Result<Flow> {
        debug!("Dirty tree detected in {}", self.resource.id);

        if !self.context.save_local_changes {
            return Ok(self.fatal(
                attempt,
                "Local changes would be overwritten by rebase. Commit them or enable rebase.save_local_changes.",
            ));
        }

        match self
            .deps
            .saver
            .save_local_changes(std::slice::from_ref(&self.resource.root))
        {
            Ok(()) => {
                self.retried_when_dirty = true;
                Ok(Flow::Retry)
            }
            Err(reason) => {
                warn!(
                    "Couldn't {} {}: {}",
                    self.deps.saver.saver_name(),
                    self.resource.root.display(),
                    reason
                );
                Ok(self.fatal(attempt, &reason))
            }
        }
    }

    fn on_untracked_files(&mut self, attempt: &Attempt) -> Result<Flow> {
        info!("Untracked files detected in {}", self.resource.id);
        let something_rebased = attempt.something_rebased();

        let mut message = format!(
            "{}The following untracked working tree files would be overwritten by rebase. Move or remove them, then retry.",
            self.resource_prefix()
        );
        self.append_saved_changes_note(&mut message);

        let report = Report::new(ReportLevel::Error, self.failure_title(), message)
            .for_resource(&self.resource.id)
            .with_skipped(self.all_skipped())
            .with_untracked_paths(attempt.detection.untracked_paths.clone())
            .with_action(ReportAction::Retry);
        let report = self.with_recovery_actions(report, something_rebased);
        self.deps.notifier.notify(report);

        Ok(Flow::Finished(self.fatal_outcome(something_rebased)))
    }

    fn on_no_change(&mut self, _attempt: &Attempt) -> Result<Flow> {
        info!("'No changes' situation detected in {}", self.resource.id);
        self.record_current_commit();
        self.mode = Some(ResumeMode::Skip);
        Ok(Flow::Retry)
    }

    fn on_merge_conflict(&mut self, attempt: &Attempt) -> Result<Flow> {
        info!("Merge conflict in {}", self.resource.id);

        match self.deps.resolver.resolve(self.resource)? {
            ResolveResult::AllResolved => {
                self.mode = Some(ResumeMode::Continue);
                Ok(Flow::Retry)
            }
            ResolveResult::NothingToMerge => {
                // same output as for an edited file that was never staged
                info!(
                    "Unmerged changes while rebasing {}: {}",
                    self.resource.id, attempt.error_output
                );
                Ok(self.fatal(attempt, &attempt.error_output))
            }
            ResolveResult::UnresolvedRemain => {
                self.notify_not_all_conflicts_resolved();
                Ok(Flow::Finished(ResourceOutcome::Suspended {
                    skipped: std::mem::take(&mut self.skipped),
                }))
            }
        }
    }

    fn on_generic_failure(&mut self, attempt: &Attempt) -> Result<Flow> {
        info!(
            "Error rebasing {}: {}",
            self.resource.id, attempt.error_output
        );
        Ok(self.fatal(attempt, &attempt.error_output))
    }

    fn notify_not_all_conflicts_resolved(&mut self) {
        let mut message = format!(
            "{}Resolve the remaining conflicts and run `tandem continue`.",
            self.resource_prefix()
        );
        self.append_saved_changes_note(&mut message);

        let mut report = Report::new(
            ReportLevel::Warning,
            "Rebase Stopped Due to Conflicts",
            message,
        )
        .for_resource(&self.resource.id)
        .with_skipped(self.all_skipped())
        .with_action(ReportAction::Resolve)
        .with_action(ReportAction::Continue)
        .with_action(ReportAction::Abort);
        if self.deps.saver.were_changes_saved() {
            report = report.with_action(ReportAction::ViewSaved);
        }
        self.deps.notifier.notify(report);
    }

    /// Report a fatal problem and pick the outcome by the tie-break rule
    fn fatal(&mut self, attempt: &Attempt, reason: &str) -> Flow {
        let something_rebased = attempt.something_rebased();

        let mut message = format!("{}{}", self.resource_prefix(), reason.trim());
        self.append_saved_changes_note(&mut message);

        let report = Report::new(ReportLevel::Error, self.failure_title(), message)
            .for_resource(&self.resource.id)
            .with_skipped(self.all_skipped())
            .with_action(ReportAction::Retry);
        let report = self.with_recovery_actions(report, something_rebased);
        self.deps.notifier.notify(report);

        Flow::Finished(self.fatal_outcome(something_rebased))
    }

    /// `Error` only when nothing in the family was rewritten yet
    fn fatal_outcome(&mut self, something_rebased: bool) -> ResourceOutcome {
        let skipped = std::mem::take(&mut self.skipped);
        if something_rebased || self.context.has_prior_success {
            ResourceOutcome::Suspended { skipped }
        } else {
            ResourceOutcome::Error { skipped }
        }
    }

    fn with_recovery_actions(&self, mut report: Report, something_rebased: bool) -> Report {
        if something_rebased || self.context.has_prior_success {
            report = report.with_action(ReportAction::Abort);
        }
        if self.deps.saver.were_changes_saved() {
            report = report.with_action(ReportAction::ViewSaved);
        }
        report
    }

    fn failure_title(&self) -> &'static str {
        if self.context.continuing {
            "Continue Rebase Failed"
        } else {
            "Rebase Failed"
        }
    }

    fn resource_prefix(&self) -> String {
        if self.context.multiple_resources {
            format!("{}: ", self.resource.id)
        } else {
            String::new()
        }
    }

    fn append_saved_changes_note(&self, message: &mut String) {
        if self.deps.saver.were_changes_saved() {
            message.push('\n');
            message.push_str(&local_changes_remaining_note(self.deps.saver.saver_name()));
        }
    }

    /// Skipped commits of earlier resources followed by this one's
    fn all_skipped(&self) -> Vec<(ResourceId, SkippedItem)> {
        self.context
            .prior_skipped
            .iter()
            .cloned()
            .chain(
                self.skipped
                    .iter()
                    .map(|item| (self.resource.id.clone(), item.clone())),
            )
            .collect()
    }

    fn record_current_commit(&mut self) {
        match self.deps.inspector.current_rebase_commit(self.resource) {
            Ok(Some(item)) => {
                debug!("Skipping {} in {}", item.short_id, self.resource.id);
                self.skipped.push(item);
            }
            Ok(None) => debug!("No commit in progress in {}", self.resource.id),
            Err(e) => warn!(
                "Could not read the commit being rebased in {}: {}",
                self.resource.id, e
            ),
        }
    }
}
