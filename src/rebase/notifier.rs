use crate::cli::output::Output;
use crate::rebase::collaborators::{Notifier, Report, ReportAction, ReportLevel};
use crate::rebase::model::{ResourceId, SkippedItem};
use console::style;
use std::sync::{Arc, Mutex};

/// Sentence introducing the list of skipped commits
pub fn skipped_commits_header(count: usize) -> &'static str {
    if count == 1 {
        "The following commit was skipped during rebase:"
    } else {
        "The following commits were skipped during rebase:"
    }
}

/// One line per skipped commit: short id and shortened subject
pub fn format_skipped_commits(skipped: &[(ResourceId, SkippedItem)]) -> Vec<String> {
    let multiple_resources = skipped
        .first()
        .is_some_and(|(first, _)| skipped.iter().any(|(id, _)| id != first));

    skipped
        .iter()
        .map(|(resource, item)| {
            if multiple_resources {
                format!("{} {} ({})", item.short_id, item.display_summary(), resource)
            } else {
                format!("{} {}", item.short_id, item.display_summary())
            }
        })
        .collect()
}

pub fn local_changes_remaining_note(saver_name: &str) -> String {
    format!(
        "Local changes were saved to the {saver_name} before rebase and are kept there until the rebase completes."
    )
}

fn action_hint(action: ReportAction) -> &'static str {
    match action {
        ReportAction::Abort => "tandem abort",
        ReportAction::Continue => "tandem continue",
        ReportAction::Retry => "tandem rebase <upstream> (retry)",
        ReportAction::ViewSaved => "git stash list",
        ReportAction::Resolve => "resolve conflicts, then `git add` the files",
    }
}

/// Renders reports on the terminal
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self
    }
}

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, report: Report) {
        let title = style(&report.title).bold();
        match report.level {
            ReportLevel::Info => Output::success(title),
            ReportLevel::Warning => Output::warning(title),
            ReportLevel::Error => Output::error(title),
        }

        for line in report.message.lines().filter(|line| !line.trim().is_empty()) {
            Output::sub_item(line);
        }

        for path in &report.untracked_paths {
            Output::bullet(path.display());
        }

        if !report.skipped.is_empty() {
            Output::sub_item(skipped_commits_header(report.skipped.len()));
            for line in format_skipped_commits(&report.skipped) {
                Output::bullet(style(line).dim());
            }
        }

        if !report.actions.is_empty() {
            println!();
            for action in &report.actions {
                Output::action(action, action_hint(*action));
            }
        }
    }
}

/// Collects reports in memory; clones share the same list
#[derive(Debug, Default, Clone)]
pub struct MemoryNotifier {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        match self.reports.lock() {
            Ok(reports) => reports.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn titles(&self) -> Vec<String> {
        self.reports().into_iter().map(|report| report.title).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn notify(&mut self, report: Report) {
        match self.reports.lock() {
            Ok(mut reports) => reports.push(report),
            Err(poisoned) => poisoned.into_inner().push(report),
        }
    }
}
