//! Seams between the orchestrator and the outside world.
//!
//! The orchestrator only talks to git, the terminal and the disk through these
//! traits. The git-backed implementations live next to this module; tests
//! substitute scripted fakes.

use crate::errors::Result;
use crate::git::{CommandOutput, LineListener, RebaseCommandResult};
use crate::rebase::model::{
    OperationSpec, OrchestrationState, Resource, ResourceId, ResumeMode, SavedChanges, SkippedItem,
};
use std::fmt;
use std::path::PathBuf;

/// Executes git operations against one resource
pub trait CommandRunner {
    /// Start (`mode == None`) or resume a rebase, feeding every output line to `listeners`
    fn rebase(
        &mut self,
        resource: &Resource,
        spec: &OperationSpec,
        mode: Option<ResumeMode>,
        listeners: &mut [&mut dyn LineListener],
    ) -> Result<RebaseCommandResult>;

    fn abort(&mut self, resource: &Resource) -> Result<CommandOutput>;

    /// Move the current branch back to `revision`, keeping local changes
    fn reset_keep(&mut self, resource: &Resource, revision: &str) -> Result<CommandOutput>;
}

/// Read-only queries about a resource
pub trait ResourceInspector {
    fn current_branch(&self, resource: &Resource) -> Result<Option<String>>;

    fn head(&self, resource: &Resource) -> Result<String>;

    fn has_local_changes(&self, resource: &Resource) -> Result<bool>;

    fn is_rebase_in_progress(&self, resource: &Resource) -> Result<bool>;

    /// The commit git stopped at, if a rebase is in progress
    fn current_rebase_commit(&self, resource: &Resource) -> Result<Option<SkippedItem>>;

    fn changed_paths(&self, resource: &Resource, from: &str, to: &str) -> Result<Vec<PathBuf>>;

    /// Whether `upstream..branch` contains commits already on a protected remote branch
    fn has_published_commits(
        &self,
        resource: &Resource,
        upstream: &str,
        branch: &str,
        remote: &str,
        protected_branches: &[String],
    ) -> Result<bool>;
}

/// Saves uncommitted changes before the rebase and brings them back afterwards
pub trait ChangeSaver {
    /// Save changes of `roots`. The error is a human readable reason.
    fn save_local_changes(&mut self, roots: &[PathBuf]) -> std::result::Result<(), String>;

    fn restore_saved_changes(&mut self) -> Result<()>;

    fn were_changes_saved(&self) -> bool;

    /// What is currently saved, for persisting across runs
    fn saved_record(&self) -> Option<SavedChanges>;

    /// Take over changes saved by an earlier run
    fn resume_from(&mut self, record: SavedChanges);

    fn saver_name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveResult {
    AllResolved,
    NothingToMerge,
    UnresolvedRemain,
}

pub trait ConflictResolver {
    fn resolve(&mut self, resource: &Resource) -> Result<ResolveResult>;
}

/// Yes/no questions to the user
pub trait Prompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportLevel {
    Info,
    Warning,
    Error,
}

/// Follow-up the user can take after a report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportAction {
    Abort,
    Continue,
    Retry,
    ViewSaved,
    Resolve,
}

impl fmt::Display for ReportAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReportAction::Abort => "abort",
            ReportAction::Continue => "continue",
            ReportAction::Retry => "retry",
            ReportAction::ViewSaved => "view saved changes",
            ReportAction::Resolve => "resolve",
        };
        write!(f, "{label}")
    }
}

/// Structured description of something the user should know about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub level: ReportLevel,
    pub title: String,
    pub resource: Option<ResourceId>,
    pub message: String,
    pub skipped: Vec<(ResourceId, SkippedItem)>,
    pub untracked_paths: Vec<PathBuf>,
    pub actions: Vec<ReportAction>,
}

impl Report {
    pub fn new(level: ReportLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            resource: None,
            message: message.into(),
            skipped: Vec::new(),
            untracked_paths: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn for_resource(mut self, resource: &ResourceId) -> Self {
        self.resource = Some(resource.clone());
        self
    }

    pub fn with_skipped(mut self, skipped: Vec<(ResourceId, SkippedItem)>) -> Self {
        self.skipped = skipped;
        self
    }

    pub fn with_untracked_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.untracked_paths = paths;
        self
    }

    pub fn with_action(mut self, action: ReportAction) -> Self {
        if !self.actions.contains(&action) {
            self.actions.push(action);
        }
        self
    }
}

pub trait Notifier {
    fn notify(&mut self, report: Report);
}

/// Keeps cached working-tree information in sync after git rewrote files
pub trait Refresher {
    /// `changed_paths` is `None` when the prospective diff could not be computed
    fn refresh(&mut self, resource: &Resource, changed_paths: Option<&[PathBuf]>);

    fn mark_dirty_recursively(&mut self, resource: &Resource);
}

/// The single persisted slot holding resumable state of a repository family
pub trait StateStore {
    fn load(&self) -> Result<Option<OrchestrationState>>;

    fn save(&mut self, state: &OrchestrationState) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    fn exists(&self) -> bool;
}

/// Everything the orchestrator needs, borrowed for one run
pub struct Collaborators<'a> {
    pub runner: &'a mut dyn CommandRunner,
    pub inspector: &'a dyn ResourceInspector,
    pub saver: &'a mut dyn ChangeSaver,
    pub resolver: &'a mut dyn ConflictResolver,
    pub prompter: &'a mut dyn Prompter,
    pub notifier: &'a mut dyn Notifier,
    pub refresher: &'a mut dyn Refresher,
    pub store: &'a mut dyn StateStore,
}
