//! Real git repositories in temp directories and a fully wired orchestrator

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use tandem::errors::Result;
use tandem::git::GitCommandRunner;
use tandem::rebase::{
    CancellationToken, Collaborators, FileStateStore, FixedAnswer, GitInspector,
    IndexConflictResolver, IndexRefresher, MemoryNotifier, OperationSpec, OrchestrationState,
    RebaseOptions, RebaseOrchestrator, Resource, StashSaver, StateStore,
};
use tempfile::TempDir;

/// Run git in `repo_path`, panicking on failure; returns trimmed stdout
pub fn git(repo_path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_path)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run git {args:?}: {e}"));
    assert!(
        output.status.success(),
        "git {:?} failed in {}: {}",
        args,
        repo_path.display(),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Whether `ancestor` is reachable from `descendant`
pub fn is_ancestor(repo_path: &Path, ancestor: &str, descendant: &str) -> bool {
    Command::new("git")
        .args(["merge-base", "--is-ancestor", ancestor, descendant])
        .current_dir(repo_path)
        .status()
        .unwrap()
        .success()
}

pub fn commit_file(repo_path: &Path, file: &str, content: &str, message: &str) {
    std::fs::write(repo_path.join(file), content).unwrap();
    git(repo_path, &["add", file]);
    git(repo_path, &["commit", "-m", message]);
}

/// A repository on `feature`, one commit ahead of its fork point, while
/// `main` moved on by one commit. With `conflicting` both commits edit
/// `shared.txt`.
pub fn init_diverged_repo(path: &Path, name: &str, conflicting: bool) {
    std::fs::create_dir_all(path).unwrap();
    git(path, &["init"]);
    git(path, &["config", "user.name", "Test User"]);
    git(path, &["config", "user.email", "test@example.com"]);
    git(path, &["config", "commit.gpgsign", "false"]);
    std::fs::write(path.join("README.md"), format!("# {name}\n")).unwrap();
    commit_file(path, "shared.txt", "base\n", "Initial commit");
    git(path, &["branch", "-M", "main"]);

    git(path, &["checkout", "-b", "feature"]);
    if conflicting {
        commit_file(path, "shared.txt", "feature\n", &format!("Feature change in {name}"));
    } else {
        commit_file(path, "feature.txt", "feature\n", &format!("Feature change in {name}"));
    }

    git(path, &["checkout", "main"]);
    if conflicting {
        commit_file(path, "shared.txt", "main\n", &format!("Main change in {name}"));
    } else {
        commit_file(path, "main.txt", "main\n", &format!("Main change in {name}"));
    }
    git(path, &["checkout", "feature"]);
}

/// A superproject with one nested repository `lib`
pub struct FamilyFixture {
    _tmp: TempDir,
    pub root: PathBuf,
    pub lib: PathBuf,
}

impl FamilyFixture {
    pub fn new(root_conflicts: bool, lib_conflicts: bool) -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().canonicalize().unwrap().join("app");
        let lib = root.join("lib");

        init_diverged_repo(&root, "app", root_conflicts);
        std::fs::write(root.join(".gitignore"), "lib/\n").unwrap();
        init_diverged_repo(&lib, "lib", lib_conflicts);

        Self {
            _tmp: tmp,
            root,
            lib,
        }
    }

    pub fn resources(&self) -> Vec<Resource> {
        vec![
            Resource::in_family(&self.root, &self.root),
            Resource::in_family(&self.root, &self.lib),
        ]
    }

    pub fn store(&self) -> FileStateStore {
        FileStateStore::for_family(&self.root).unwrap()
    }

    pub fn saved_state(&self) -> Option<OrchestrationState> {
        self.store().load().unwrap()
    }
}

/// Drive an orchestrator wired to real git, answering every prompt with
/// `answer`. Returns the result and the titles of all reports.
pub fn orchestrate<T>(
    family_root: &Path,
    answer: bool,
    drive: impl FnOnce(&mut RebaseOrchestrator<'_>) -> Result<T>,
) -> (Result<T>, Vec<String>) {
    let mut runner = GitCommandRunner::default();
    let inspector = GitInspector::new();
    let mut saver = StashSaver::new();
    let mut resolver = IndexConflictResolver::new(false);
    let mut prompter = FixedAnswer::new(answer);
    let notifier = MemoryNotifier::new();
    let mut reports = notifier.clone();
    let mut refresher = IndexRefresher::new("git");
    let mut store = FileStateStore::for_family(family_root).unwrap();

    let deps = Collaborators {
        runner: &mut runner,
        inspector: &inspector,
        saver: &mut saver,
        resolver: &mut resolver,
        prompter: &mut prompter,
        notifier: &mut reports,
        refresher: &mut refresher,
        store: &mut store,
    };
    let mut orchestrator =
        RebaseOrchestrator::new(deps, RebaseOptions::default(), CancellationToken::new());

    let result = drive(&mut orchestrator);
    (result, notifier.titles())
}

/// Start a fresh rebase of `resources` onto `main`
pub fn start_rebase(
    family_root: &Path,
    resources: Vec<Resource>,
    answer: bool,
) -> (Result<tandem::rebase::RunSummary>, Vec<String>) {
    orchestrate(family_root, answer, |orchestrator| {
        let state =
            orchestrator.prepare(family_root.to_path_buf(), resources, OperationSpec::new("main"))?;
        orchestrator.run(state)
    })
}
