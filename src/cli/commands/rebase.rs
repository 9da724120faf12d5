use crate::cli::output::Output;
use crate::config::{load_settings, Settings};
use crate::errors::{Result, TandemError};
use crate::git::{discover_family_roots, find_repository_root, resolve_git_dir, GitCommandRunner};
use crate::rebase::{
    AbortSummary, CancellationToken, Collaborators, ConsoleNotifier, DialoguerPrompter,
    FileStateStore, FixedAnswer, GitInspector, IndexConflictResolver, IndexRefresher,
    OperationSpec, OrchestrationState, OutcomeKind, Prompter, RebaseOptions, RebaseOrchestrator,
    Resource, ResumeMode, RunSummary, StashSaver, StateStore,
};
use crate::utils::async_ops::run_git_operation;
use crate::utils::file_locking::FileLock;
use clap::Args;
use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const RUN_LOCK_FILE: &str = "TANDEM_REBASE.run";

#[derive(Debug, Clone, Args)]
pub struct RebaseArgs {
    /// Upstream to rebase onto
    pub upstream: String,

    /// New base for the rebased commits (`git rebase --onto`)
    #[arg(long)]
    pub onto: Option<String>,

    /// Branch to rebase instead of the current one
    #[arg(long)]
    pub branch: Option<String>,

    /// Repository to rebase; repeat for several. Defaults to the
    /// repository and its submodules
    #[arg(long = "repo", value_name = "PATH")]
    pub repos: Vec<PathBuf>,

    /// Answer yes to every confirmation
    #[arg(long, short)]
    pub yes: bool,

    /// Never ask; leave unresolved conflicts for `tandem continue`
    #[arg(long)]
    pub no_prompt: bool,
}

/// The repository family a command works on
#[derive(Debug, Clone)]
pub(crate) struct Family {
    pub root: PathBuf,
    pub git_dir: PathBuf,
    pub settings: Settings,
}

impl Family {
    pub fn discover() -> Result<Self> {
        let current_dir = env::current_dir()
            .map_err(|e| TandemError::config(format!("Could not get current directory: {e}")))?;
        Self::at(&current_dir)
    }

    pub fn at(path: &Path) -> Result<Self> {
        let root = find_repository_root(path)?.canonicalize()?;
        let settings = load_settings(&root)?;
        let git_dir = resolve_git_dir(&root)?;
        debug!("Family root: {}", root.display());
        Ok(Self {
            root,
            git_dir,
            settings,
        })
    }

    /// Explicit repositories in the given order, or the root followed by its submodules
    pub fn resources(&self, repos: &[PathBuf]) -> Result<Vec<Resource>> {
        let roots = if repos.is_empty() {
            discover_family_roots(&self.root, self.settings.rebase.include_submodules)?
        } else {
            repos
                .iter()
                .map(|path| find_repository_root(path))
                .collect::<Result<Vec<_>>>()?
        };

        let mut resources: Vec<Resource> = Vec::new();
        for root in roots {
            let root = root.canonicalize()?;
            let resource = Resource::in_family(&self.root, &root);
            if resources.iter().any(|known| known.id == resource.id) {
                debug!("Ignoring duplicate repository {}", resource.id);
                continue;
            }
            resources.push(resource);
        }
        Ok(resources)
    }

    /// Exclusive lock for one tandem command per family
    pub fn lock(&self) -> Result<FileLock> {
        FileLock::try_acquire(&self.git_dir.join(RUN_LOCK_FILE)).map_err(|e| {
            debug!("{}", e);
            TandemError::validation("Another tandem command is running in this repository")
        })
    }

    pub fn store(&self) -> Result<FileStateStore> {
        FileStateStore::for_family(&self.root)
    }

    fn load_state(&self) -> Result<OrchestrationState> {
        self.store()?
            .load()?
            .ok_or_else(|| TandemError::not_in_progress("No tandem rebase in progress"))
    }
}

#[derive(Debug, Clone, Copy)]
struct Interaction {
    assume_yes: bool,
    no_prompt: bool,
}

impl Interaction {
    fn can_ask(&self) -> bool {
        !self.no_prompt && console::user_attended()
    }
}

/// Confirmations either answered up front or asked on the terminal
enum CliPrompter {
    Fixed(FixedAnswer),
    Terminal(DialoguerPrompter),
}

impl CliPrompter {
    fn for_interaction(interaction: Interaction) -> Self {
        if interaction.assume_yes {
            CliPrompter::Fixed(FixedAnswer::new(true))
        } else if interaction.can_ask() {
            CliPrompter::Terminal(DialoguerPrompter)
        } else {
            CliPrompter::Fixed(FixedAnswer::new(false))
        }
    }
}

impl Prompter for CliPrompter {
    fn confirm(&mut self, question: &str, default: bool) -> Result<bool> {
        match self {
            CliPrompter::Fixed(answer) => answer.confirm(question, default),
            CliPrompter::Terminal(prompter) => prompter.confirm(question, default),
        }
    }
}

enum Job {
    Start {
        resources: Vec<Resource>,
        spec: OperationSpec,
    },
    Resume(OrchestrationState),
    Abort(OrchestrationState),
}

enum Finished {
    Run(RunSummary),
    Aborted(AbortSummary),
}

/// Wire the git-backed collaborators and drive the orchestrator. Blocking.
fn execute(
    family: &Family,
    job: Job,
    interaction: Interaction,
    cancel: CancellationToken,
) -> Result<Finished> {
    let executable = family.settings.git.executable.clone();
    let mut runner = GitCommandRunner::new(executable.clone());
    let inspector = GitInspector::new();
    let mut saver = StashSaver::new();
    let mut resolver = IndexConflictResolver::new(
        interaction.can_ask() && family.settings.rebase.prompt_on_conflicts,
    );
    let mut prompter = CliPrompter::for_interaction(interaction);
    let mut notifier = ConsoleNotifier::new();
    let mut refresher = IndexRefresher::new(executable);
    let mut store = family.store()?;

    let deps = Collaborators {
        runner: &mut runner,
        inspector: &inspector,
        saver: &mut saver,
        resolver: &mut resolver,
        prompter: &mut prompter,
        notifier: &mut notifier,
        refresher: &mut refresher,
        store: &mut store,
    };
    let mut orchestrator =
        RebaseOrchestrator::new(deps, RebaseOptions::from_settings(&family.settings), cancel);

    match job {
        Job::Start { resources, spec } => {
            let state = orchestrator.prepare(family.root.clone(), resources, spec)?;
            orchestrator.run(state).map(Finished::Run)
        }
        Job::Resume(state) => orchestrator.run(state).map(Finished::Run),
        Job::Abort(state) => orchestrator.abort(state).map(Finished::Aborted),
    }
}

/// Run `job` off the async runtime; Ctrl-C stops it between git commands
async fn run_job(family: Family, job: Job, interaction: Interaction) -> Result<Finished> {
    let cancel = CancellationToken::new();

    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current git command");
                cancel.cancel();
            }
        })
    };

    let result = run_git_operation(move || execute(&family, job, interaction, cancel)).await;
    watcher.abort();

    if let Err(e) = &result {
        if e.is_cancelled() {
            Output::warning("Rebase cancelled");
            Output::sub_item("Any previously saved rebase state is unchanged");
        }
    }
    result
}

/// Start rebasing the family
pub async fn start(args: RebaseArgs) -> Result<()> {
    let family = Family::discover()?;
    let _lock = family.lock()?;

    if family.store()?.exists() {
        return Err(TandemError::validation(
            "A tandem rebase is already in progress. Use 'tandem continue', 'tandem skip' or 'tandem abort'",
        ));
    }

    let resources = family.resources(&args.repos)?;
    if resources.is_empty() {
        return Err(TandemError::validation("No repositories to rebase"));
    }

    let spec = OperationSpec::new(args.upstream)
        .with_new_base(args.onto)
        .with_branch(args.branch);

    Output::progress(format!(
        "Rebasing {} repositories onto {}",
        resources.len(),
        spec.base_reference()
    ));
    for resource in &resources {
        Output::sub_item(&resource.id);
    }
    info!("Rebase of {} repositories requested", resources.len());

    let interaction = Interaction {
        assume_yes: args.yes,
        no_prompt: args.no_prompt,
    };
    let finished = run_job(family, Job::Start { resources, spec }, interaction).await?;
    report(finished)
}

/// Continue or skip the suspended rebase
pub async fn resume(mode: ResumeMode, yes: bool, no_prompt: bool) -> Result<()> {
    let family = Family::discover()?;
    let _lock = family.lock()?;

    let mut state = family.load_state()?;
    state.spec = state.spec.with_resume_mode(Some(mode));

    match mode {
        ResumeMode::Continue => Output::progress("Continuing rebase..."),
        ResumeMode::Skip => Output::progress("Skipping the current commit..."),
    }

    let interaction = Interaction {
        assume_yes: yes,
        no_prompt,
    };
    let finished = run_job(family, Job::Resume(state), interaction).await?;
    report(finished)
}

/// Abort the suspended rebase
pub async fn abort(yes: bool) -> Result<()> {
    let family = Family::discover()?;
    let _lock = family.lock()?;

    let state = family.load_state()?;
    Output::progress("Aborting rebase...");

    let interaction = Interaction {
        assume_yes: yes,
        no_prompt: false,
    };
    let finished = run_job(family, Job::Abort(state), interaction).await?;
    report(finished)
}

fn report(finished: Finished) -> Result<()> {
    match finished {
        Finished::Run(summary) => report_run(&summary),
        Finished::Aborted(summary) => {
            if let Some(id) = &summary.aborted {
                Output::sub_item(format!("git rebase aborted in {id}"));
            }
            for id in &summary.rolled_back {
                Output::sub_item(format!("{id} rolled back"));
            }
            Ok(())
        }
    }
}

fn report_run(summary: &RunSummary) -> Result<()> {
    if summary.declined {
        Output::info("Rebase not started");
        Output::tip("Use --yes to rebase commits that are already published");
        return Ok(());
    }

    match summary.aggregate {
        OutcomeKind::Success => {
            debug!("{} repositories rebased", summary.outcomes.len());
            Ok(())
        }
        OutcomeKind::NotStarted => {
            Output::info("Rebase not started");
            Ok(())
        }
        OutcomeKind::Suspended => {
            Output::next_steps(&[
                "Resolve the problem, then run 'tandem continue'",
                "Drop the current commit with 'tandem skip'",
                "Give up with 'tandem abort'",
            ]);
            Ok(())
        }
        OutcomeKind::Error => {
            let failed = summary
                .outcomes
                .iter()
                .find(|(_, outcome)| outcome.kind() == OutcomeKind::Error)
                .map(|(id, _)| id.to_string())
                .unwrap_or_default();
            Err(TandemError::rebase(format!("Rebase failed in {failed}")))
        }
    }
}
