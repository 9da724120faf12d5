//! Listeners that classify `git rebase` output line by line.
//!
//! Every listener sees the same lines and keeps its own verdict; none of them
//! alter or consume the output, so any number can watch one command.

use std::path::PathBuf;

/// Which stream a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives each line of a running git command
pub trait LineListener {
    fn on_line(&mut self, line: &str, stream: OutputStream);
}

const DIRTY_TREE_INDICATORS: &[&str] = &[
    "cannot rebase: You have unstaged changes",
    "cannot rebase: Your index contains uncommitted changes",
    "Please commit or stash them",
    "Your local changes to the following files would be overwritten",
    "You have unstaged changes",
];

const MERGE_CONFLICT_INDICATORS: &[&str] = &[
    "CONFLICT (",
    "Failed to merge in the changes",
    "could not apply",
    "Resolve all conflicts manually",
    "you need to resolve your current index first",
    "You must edit all merge conflicts",
    "needs merge",
];

const NO_CHANGE_INDICATORS: &[&str] = &[
    "No changes - did you forget to use 'git add'?",
    "nothing to commit",
    "The previous cherry-pick is now empty",
    "No changes -- Patch already applied",
];

const STOPPED_FOR_EDITING_INDICATORS: &[&str] = &[
    "You can amend the commit now",
    "Stopped at ",
];

/// Detects the well-known failure categories of a rebase attempt
#[derive(Debug, Default, Clone)]
pub struct RebaseProblemDetector {
    dirty_tree: bool,
    merge_conflict: bool,
    no_change: bool,
    stopped_for_editing: bool,
}

impl RebaseProblemDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty_tree(&self) -> bool {
        self.dirty_tree
    }

    pub fn is_merge_conflict(&self) -> bool {
        self.merge_conflict
    }

    pub fn is_no_change_error(&self) -> bool {
        self.no_change
    }

    pub fn has_stopped_for_editing(&self) -> bool {
        self.stopped_for_editing
    }
}

impl LineListener for RebaseProblemDetector {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        let contains_any = |patterns: &[&str]| patterns.iter().any(|p| line.contains(p));

        if contains_any(DIRTY_TREE_INDICATORS) {
            self.dirty_tree = true;
        }
        if contains_any(MERGE_CONFLICT_INDICATORS) {
            self.merge_conflict = true;
        }
        if contains_any(NO_CHANGE_INDICATORS) {
            self.no_change = true;
        }
        if contains_any(STOPPED_FOR_EDITING_INDICATORS) {
            self.stopped_for_editing = true;
        }
    }
}

/// Collects the files git refuses to overwrite when checking out or merging
#[derive(Debug, Default, Clone)]
pub struct UntrackedFilesOverwrittenDetector {
    detected: bool,
    collecting: bool,
    paths: Vec<PathBuf>,
}

impl UntrackedFilesOverwrittenDetector {
    const HEADER: &'static str = "untracked working tree files would be overwritten by";
    const FOOTER: &'static str = "Please move or remove them before you";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn was_message_detected(&self) -> bool {
        self.detected
    }

    /// Paths relative to the repository root, in the order git listed them
    pub fn relative_file_paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl LineListener for UntrackedFilesOverwrittenDetector {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        if line.contains(Self::HEADER) {
            self.detected = true;
            self.collecting = true;
            return;
        }

        if !self.collecting {
            return;
        }

        if line.contains(Self::FOOTER) || !line.starts_with(['\t', ' ']) {
            self.collecting = false;
            return;
        }

        let path = line.trim();
        if !path.is_empty() {
            self.paths.push(PathBuf::from(path));
        }
    }
}

/// Tracks which commit of the todo list git is applying
#[derive(Debug, Default, Clone)]
pub struct RebaseProgressListener {
    current_commit: usize,
    total_commits: Option<usize>,
}

impl RebaseProgressListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// 1-based number of the commit being applied, 0 if none was reported
    pub fn current_commit(&self) -> usize {
        self.current_commit
    }

    pub fn total_commits(&self) -> Option<usize> {
        self.total_commits
    }
}

impl LineListener for RebaseProgressListener {
    fn on_line(&mut self, line: &str, _stream: OutputStream) {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Rebasing (") {
            let Some((progress, _)) = rest.split_once(')') else {
                return;
            };
            if let Some((current, total)) = progress.split_once('/') {
                if let Ok(current) = current.trim().parse::<usize>() {
                    self.current_commit = self.current_commit.max(current);
                }
                self.total_commits = total.trim().parse().ok();
            }
        } else if line.starts_with("Applying: ") {
            self.current_commit += 1;
        }
    }
}

/// Split raw command output into lines the way git emits progress: both
/// `\n` and `\r` terminate a line
pub fn split_output_lines(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(['\n', '\r']).filter(|line| !line.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed<L: LineListener>(listener: &mut L, output: &str) {
        for line in split_output_lines(output) {
            listener.on_line(line, OutputStream::Stderr);
        }
    }

    #[test]
    fn test_dirty_tree_detection() {
        let mut detector = RebaseProblemDetector::new();
        feed(
            &mut detector,
            "error: cannot rebase: You have unstaged changes.\nerror: Please commit or stash them.\n",
        );
        assert!(detector.is_dirty_tree());
        assert!(!detector.is_merge_conflict());
    }

    #[test]
    fn test_merge_conflict_detection() {
        let mut detector = RebaseProblemDetector::new();
        feed(
            &mut detector,
            "Auto-merging file.txt\nCONFLICT (content): Merge conflict in file.txt\n\
             error: could not apply 1a2b3c4... Feature commit\n",
        );
        assert!(detector.is_merge_conflict());
        assert!(!detector.is_no_change_error());
    }

    #[test]
    fn test_no_change_and_stopped_for_editing() {
        let mut detector = RebaseProblemDetector::new();
        feed(&mut detector, "No changes - did you forget to use 'git add'?\n");
        assert!(detector.is_no_change_error());

        let mut editing = RebaseProblemDetector::new();
        feed(
            &mut editing,
            "Stopped at 1a2b3c4...  Feature commit\nYou can amend the commit now, with\n",
        );
        assert!(editing.has_stopped_for_editing());
    }

    #[test]
    fn test_untracked_files_paths_are_collected() {
        let mut detector = UntrackedFilesOverwrittenDetector::new();
        feed(
            &mut detector,
            "error: The following untracked working tree files would be overwritten by checkout:\n\
             \tsrc/new.rs\n\
             \tdocs/readme.md\n\
             Please move or remove them before you switch branches.\n\
             Aborting\n",
        );

        assert!(detector.was_message_detected());
        assert_eq!(
            detector.relative_file_paths(),
            &[PathBuf::from("src/new.rs"), PathBuf::from("docs/readme.md")]
        );
    }

    #[test]
    fn test_untracked_detector_ignores_unrelated_output() {
        let mut detector = UntrackedFilesOverwrittenDetector::new();
        feed(&mut detector, "\tsome indented line\nSuccessfully rebased\n");
        assert!(!detector.was_message_detected());
        assert!(detector.relative_file_paths().is_empty());
    }

    #[test]
    fn test_progress_from_carriage_return_output() {
        let mut progress = RebaseProgressListener::new();
        feed(&mut progress, "Rebasing (1/3)\rRebasing (2/3)\rRebasing (3/3)\r");
        assert_eq!(progress.current_commit(), 3);
        assert_eq!(progress.total_commits(), Some(3));
    }

    #[test]
    fn test_progress_for_apply_backend() {
        let mut progress = RebaseProgressListener::new();
        feed(&mut progress, "Applying: first\nApplying: second\n");
        assert_eq!(progress.current_commit(), 2);
        assert_eq!(progress.total_commits(), None);
    }
}
