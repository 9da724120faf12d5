//! Scripted collaborators for exercising the orchestrator without git

use crate::errors::{Result, TandemError};
use crate::git::{
    Cancellation, CommandOutput, LineListener, OutputStream, RebaseCommandResult,
};
use crate::rebase::cancel::CancellationToken;
use crate::rebase::collaborators::{
    ChangeSaver, Collaborators, CommandRunner, ConflictResolver, Refresher, ResolveResult,
    ResourceInspector,
};
use crate::rebase::model::{
    OperationSpec, OrchestrationState, Resource, ResourceId, ResourceOutcome, ResumeMode,
    ResumePoint, RunSummary, SavedChanges, SkippedItem, SuccessType,
};
use crate::rebase::notifier::MemoryNotifier;
use crate::rebase::orchestrator::{AbortSummary, RebaseOptions, RebaseOrchestrator};
use crate::rebase::prompt::FixedAnswer;
use crate::rebase::store::MemoryStateStore;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;

/// What one scripted `git rebase` call prints and returns
#[derive(Debug, Clone, Default)]
pub struct ScriptedAttempt {
    success: bool,
    stdout: Vec<String>,
    stderr: Vec<String>,
    cancellation: Cancellation,
    command_error: bool,
}

fn lines(lines: &[&str]) -> Vec<String> {
    lines.iter().map(|line| line.to_string()).collect()
}

impl ScriptedAttempt {
    pub fn success() -> Self {
        Self {
            success: true,
            stdout: lines(&["Successfully rebased and updated refs/heads/feature."]),
            ..Self::default()
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            stderr: lines(&[message]),
            ..Self::default()
        }
    }

    pub fn conflict() -> Self {
        Self {
            stdout: lines(&[
                "Auto-merging file.txt",
                "CONFLICT (content): Merge conflict in file.txt",
            ]),
            stderr: lines(&["error: could not apply 1a2b3c4... Feature commit"]),
            ..Self::default()
        }
    }

    pub fn dirty() -> Self {
        Self {
            stderr: lines(&[
                "error: cannot rebase: You have unstaged changes.",
                "error: Please commit or stash them.",
            ]),
            ..Self::default()
        }
    }

    pub fn untracked(paths: &[&str]) -> Self {
        let mut stderr =
            lines(&["error: The following untracked working tree files would be overwritten by checkout:"]);
        stderr.extend(paths.iter().map(|path| format!("\t{path}")));
        stderr.push("Please move or remove them before you switch branches.".to_string());
        stderr.push("Aborting".to_string());
        Self {
            stderr,
            ..Self::default()
        }
    }

    pub fn no_change() -> Self {
        Self {
            stdout: lines(&["No changes - did you forget to use 'git add'?"]),
            ..Self::default()
        }
    }

    pub fn cancelled_in_commit_list() -> Self {
        Self {
            stdout: lines(&["Nothing to do"]),
            cancellation: Cancellation::InCommitList,
            ..Self::default()
        }
    }

    /// The command itself could not be executed
    pub fn command_error() -> Self {
        Self {
            command_error: true,
            ..Self::default()
        }
    }

    /// Extra stdout lines printed before the rest
    pub fn with_lines(mut self, extra: &[&str]) -> Self {
        let mut stdout = lines(extra);
        stdout.append(&mut self.stdout);
        self.stdout = stdout;
        self
    }
}

/// Plays back scripted attempts per resource; unscripted calls succeed
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    scripts: HashMap<String, VecDeque<ScriptedAttempt>>,
    calls: Vec<(ResourceId, Option<ResumeMode>)>,
    aborted: Vec<ResourceId>,
    resets: Vec<(ResourceId, String)>,
}

impl ScriptedRunner {
    pub fn script(&mut self, resource: &str, attempt: ScriptedAttempt) {
        self.scripts
            .entry(resource.to_string())
            .or_default()
            .push_back(attempt);
    }

    pub fn calls(&self) -> &[(ResourceId, Option<ResumeMode>)] {
        &self.calls
    }

    pub fn aborted(&self) -> Vec<ResourceId> {
        self.aborted.clone()
    }

    pub fn resets(&self) -> Vec<(ResourceId, String)> {
        self.resets.clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn rebase(
        &mut self,
        resource: &Resource,
        _spec: &OperationSpec,
        mode: Option<ResumeMode>,
        listeners: &mut [&mut dyn LineListener],
    ) -> Result<RebaseCommandResult> {
        self.calls.push((resource.id.clone(), mode));
        let attempt = self
            .scripts
            .get_mut(resource.id.as_str())
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(ScriptedAttempt::success);

        if attempt.command_error {
            return Err(TandemError::command("Failed to execute git: not found"));
        }

        for listener in listeners.iter_mut() {
            for line in &attempt.stdout {
                listener.on_line(line, OutputStream::Stdout);
            }
            for line in &attempt.stderr {
                listener.on_line(line, OutputStream::Stderr);
            }
        }

        Ok(RebaseCommandResult {
            output: CommandOutput {
                success: attempt.success,
                stdout: attempt.stdout,
                stderr: attempt.stderr,
            },
            cancellation: attempt.cancellation,
        })
    }

    fn abort(&mut self, resource: &Resource) -> Result<CommandOutput> {
        self.aborted.push(resource.id.clone());
        Ok(CommandOutput {
            success: true,
            ..CommandOutput::default()
        })
    }

    fn reset_keep(&mut self, resource: &Resource, revision: &str) -> Result<CommandOutput> {
        self.resets
            .push((resource.id.clone(), revision.to_string()));
        Ok(CommandOutput {
            success: true,
            ..CommandOutput::default()
        })
    }
}

/// Every resource is on `feature`; other answers are configurable
#[derive(Debug, Default)]
pub struct FakeInspector {
    dirty: HashSet<String>,
    heads: HashMap<String, String>,
    current_commit: Option<SkippedItem>,
    published: bool,
    rebase_in_progress: bool,
}

impl FakeInspector {
    pub fn mark_dirty(&mut self, resource: &str) {
        self.dirty.insert(resource.to_string());
    }

    pub fn set_head(&mut self, resource: &str, head: &str) {
        self.heads.insert(resource.to_string(), head.to_string());
    }

    pub fn set_current_commit(&mut self, item: SkippedItem) {
        self.current_commit = Some(item);
    }

    pub fn set_published(&mut self, published: bool) {
        self.published = published;
    }

    pub fn set_rebase_in_progress(&mut self, in_progress: bool) {
        self.rebase_in_progress = in_progress;
    }
}

impl ResourceInspector for FakeInspector {
    fn current_branch(&self, _resource: &Resource) -> Result<Option<String>> {
        Ok(Some("feature".to_string()))
    }

    fn head(&self, resource: &Resource) -> Result<String> {
        Ok(self
            .heads
            .get(resource.id.as_str())
            .cloned()
            .unwrap_or_else(|| "0000000000".to_string()))
    }

    fn has_local_changes(&self, resource: &Resource) -> Result<bool> {
        Ok(self.dirty.contains(resource.id.as_str()))
    }

    fn is_rebase_in_progress(&self, _resource: &Resource) -> Result<bool> {
        Ok(self.rebase_in_progress)
    }

    fn current_rebase_commit(&self, _resource: &Resource) -> Result<Option<SkippedItem>> {
        Ok(self.current_commit.clone())
    }

    fn changed_paths(&self, _resource: &Resource, _from: &str, _to: &str) -> Result<Vec<PathBuf>> {
        Ok(Vec::new())
    }

    fn has_published_commits(
        &self,
        _resource: &Resource,
        _upstream: &str,
        _branch: &str,
        _remote: &str,
        _protected_branches: &[String],
    ) -> Result<bool> {
        Ok(self.published)
    }
}

#[derive(Debug, Default)]
pub struct FakeSaver {
    saved: Option<SavedChanges>,
    save_calls: Vec<Vec<PathBuf>>,
    restores: usize,
    fail_next: Option<String>,
}

impl FakeSaver {
    pub fn fail_next_save(&mut self, reason: &str) {
        self.fail_next = Some(reason.to_string());
    }

    pub fn save_calls(&self) -> Vec<Vec<PathBuf>> {
        self.save_calls.clone()
    }

    pub fn restore_count(&self) -> usize {
        self.restores
    }
}

impl ChangeSaver for FakeSaver {
    fn save_local_changes(&mut self, roots: &[PathBuf]) -> std::result::Result<(), String> {
        self.save_calls.push(roots.to_vec());
        if let Some(reason) = self.fail_next.take() {
            return Err(reason);
        }

        let saved = self.saved.get_or_insert_with(|| SavedChanges {
            message: "tandem: test".to_string(),
            roots: Vec::new(),
        });
        saved.roots.extend(roots.iter().cloned());
        Ok(())
    }

    fn restore_saved_changes(&mut self) -> Result<()> {
        self.restores += 1;
        self.saved = None;
        Ok(())
    }

    fn were_changes_saved(&self) -> bool {
        self.saved.is_some()
    }

    fn saved_record(&self) -> Option<SavedChanges> {
        self.saved.clone()
    }

    fn resume_from(&mut self, record: SavedChanges) {
        self.saved = Some(record);
    }

    fn saver_name(&self) -> &str {
        "stash"
    }
}

/// Answers conflicts in order; resolves everything once the script runs out
#[derive(Debug, Default)]
pub struct ScriptedResolver {
    results: VecDeque<ResolveResult>,
    cancel: Option<CancellationToken>,
}

impl ScriptedResolver {
    pub fn push(&mut self, result: ResolveResult) {
        self.results.push_back(result);
    }

    /// Cancel `token` while answering, as a Ctrl-C during the prompt would
    pub fn cancel_when_resolving(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }
}

impl ConflictResolver for ScriptedResolver {
    fn resolve(&mut self, _resource: &Resource) -> Result<ResolveResult> {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        Ok(self.results.pop_front().unwrap_or(ResolveResult::AllResolved))
    }
}

#[derive(Debug, Default)]
pub struct FakeRefresher {
    refreshed: Vec<ResourceId>,
    marked: Vec<ResourceId>,
}

impl FakeRefresher {
    pub fn refreshed(&self) -> Vec<ResourceId> {
        self.refreshed.clone()
    }

    pub fn marked_dirty(&self) -> Vec<ResourceId> {
        self.marked.clone()
    }
}

impl Refresher for FakeRefresher {
    fn refresh(&mut self, resource: &Resource, _changed_paths: Option<&[PathBuf]>) {
        self.refreshed.push(resource.id.clone());
    }

    fn mark_dirty_recursively(&mut self, resource: &Resource) {
        self.marked.push(resource.id.clone());
    }
}

/// Owns one of every fake; each `run` borrows them for a fresh orchestrator
pub struct Harness {
    pub runner: ScriptedRunner,
    pub inspector: FakeInspector,
    pub saver: FakeSaver,
    pub resolver: ScriptedResolver,
    pub prompter: FixedAnswer,
    pub notifier: MemoryNotifier,
    pub refresher: FakeRefresher,
    pub store: MemoryStateStore,
    pub cancel: CancellationToken,
    pub options: RebaseOptions,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            runner: ScriptedRunner::default(),
            inspector: FakeInspector::default(),
            saver: FakeSaver::default(),
            resolver: ScriptedResolver::default(),
            prompter: FixedAnswer::new(true),
            notifier: MemoryNotifier::new(),
            refresher: FakeRefresher::default(),
            store: MemoryStateStore::new(),
            cancel: CancellationToken::new(),
            options: RebaseOptions::default(),
        }
    }

    fn resources(ids: &[&str]) -> Vec<Resource> {
        ids.iter()
            .map(|id| Resource::new(ResourceId::new(*id), PathBuf::from("/family").join(id)))
            .collect()
    }

    /// Nothing attempted yet, rebasing onto `main`
    pub fn fresh_state(&self, ids: &[&str]) -> OrchestrationState {
        OrchestrationState::new(
            PathBuf::from("/family"),
            Self::resources(ids),
            OperationSpec::new("main"),
        )
    }

    /// Resources before `ongoing` succeeded, `ongoing` is suspended
    pub fn suspended_state(
        &self,
        ids: &[&str],
        ongoing: &str,
        mode: Option<ResumeMode>,
    ) -> OrchestrationState {
        let mut state = self.fresh_state(ids);
        for id in ids {
            if *id == ongoing {
                break;
            }
            state.outcomes.insert(
                ResourceId::new(*id),
                ResourceOutcome::Success {
                    success_type: SuccessType::Rebased,
                    skipped: Vec::new(),
                },
            );
        }
        state.outcomes.insert(
            ResourceId::new(ongoing),
            ResourceOutcome::Suspended {
                skipped: Vec::new(),
            },
        );
        state.resume_point = ResumePoint::At {
            resource: ResourceId::new(ongoing),
            mode: ResumeMode::Continue,
        };
        state.spec.resume_mode = mode;
        state
    }

    fn orchestrator(&mut self) -> RebaseOrchestrator<'_> {
        let deps = Collaborators {
            runner: &mut self.runner,
            inspector: &self.inspector,
            saver: &mut self.saver,
            resolver: &mut self.resolver,
            prompter: &mut self.prompter,
            notifier: &mut self.notifier,
            refresher: &mut self.refresher,
            store: &mut self.store,
        };
        RebaseOrchestrator::new(deps, self.options.clone(), self.cancel.clone())
    }

    pub fn run(&mut self, state: OrchestrationState) -> Result<RunSummary> {
        self.orchestrator().run(state)
    }

    pub fn abort(&mut self, state: OrchestrationState) -> Result<AbortSummary> {
        self.orchestrator().abort(state)
    }
}
