use crate::errors::{Result, TandemError};
use crate::git::detectors::{split_output_lines, LineListener, OutputStream};
use crate::rebase::collaborators::CommandRunner;
use crate::rebase::model::{OperationSpec, Resource, ResumeMode};
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// How an interactive step of the command was cancelled, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cancellation {
    #[default]
    None,
    /// The user emptied or aborted the todo list
    InCommitList,
    /// The user aborted editing a commit message
    InCommitMessage,
}

/// Captured output of one external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl CommandOutput {
    pub fn output_text(&self) -> String {
        self.stdout.join("\n")
    }

    pub fn error_text(&self) -> String {
        self.stderr.join("\n")
    }

    /// All lines, stdout first
    pub fn all_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout
            .iter()
            .chain(self.stderr.iter())
            .map(String::as_str)
    }
}

/// Result of one `git rebase` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebaseCommandResult {
    pub output: CommandOutput,
    pub cancellation: Cancellation,
}

impl RebaseCommandResult {
    pub fn success(&self) -> bool {
        self.output.success
    }

    pub fn was_cancelled_in_commit_list(&self) -> bool {
        self.cancellation == Cancellation::InCommitList
    }

    pub fn was_cancelled_in_commit_message(&self) -> bool {
        self.cancellation == Cancellation::InCommitMessage
    }
}

/// Runs rebase commands through the git executable
#[derive(Debug, Clone)]
pub struct GitCommandRunner {
    executable: String,
}

impl GitCommandRunner {
    pub fn new<S: Into<String>>(executable: S) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Arguments for one rebase invocation
    pub fn rebase_args(spec: &OperationSpec, mode: Option<ResumeMode>) -> Vec<String> {
        let mut args = vec!["rebase".to_string()];
        match mode {
            Some(ResumeMode::Continue) => args.push("--continue".to_string()),
            Some(ResumeMode::Skip) => args.push("--skip".to_string()),
            None => {
                if let Some(new_base) = &spec.new_base {
                    args.push("--onto".to_string());
                    args.push(new_base.clone());
                }
                args.push(spec.upstream.clone());
                if let Some(branch) = &spec.branch {
                    args.push(branch.clone());
                }
            }
        }
        args
    }

    fn run(
        &self,
        resource: &Resource,
        args: &[String],
        listeners: &mut [&mut dyn LineListener],
    ) -> Result<CommandOutput> {
        debug!("[{}] {} {}", resource.id, self.executable, args.join(" "));

        let output = Command::new(&self.executable)
            .args(args)
            .current_dir(&resource.root)
            .env("LC_ALL", "C")
            .env("GIT_EDITOR", "true")
            .env("GIT_TERMINAL_PROMPT", "0")
            .output()
            .map_err(|e| {
                TandemError::command(format!("Failed to execute {}: {e}", self.executable))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut captured = CommandOutput {
            success: output.status.success(),
            ..CommandOutput::default()
        };

        for (raw, stream) in [(&stdout, OutputStream::Stdout), (&stderr, OutputStream::Stderr)] {
            for line in split_output_lines(raw) {
                for listener in listeners.iter_mut() {
                    listener.on_line(line, stream);
                }
                match stream {
                    OutputStream::Stdout => captured.stdout.push(line.to_string()),
                    OutputStream::Stderr => captured.stderr.push(line.to_string()),
                }
            }
        }

        debug!(
            "[{}] git exited with success={}",
            resource.id, captured.success
        );
        Ok(captured)
    }

    /// Refresh cached stat data so files rewritten by a rebase are not reported
    /// as modified. With `paths` only those entries are looked at; `status`
    /// writes back the stat data it refreshed and never stages content.
    pub fn refresh_index(
        &self,
        resource: &Resource,
        paths: Option<&[PathBuf]>,
    ) -> Result<CommandOutput> {
        let args = refresh_args(paths);
        self.run(resource, &args, &mut [])
    }
}

fn refresh_args(paths: Option<&[PathBuf]>) -> Vec<String> {
    match paths {
        Some(paths) => ["status", "--porcelain", "--untracked-files=no", "--"]
            .iter()
            .map(|arg| arg.to_string())
            .chain(paths.iter().map(|path| path.to_string_lossy().into_owned()))
            .collect(),
        None => ["update-index", "-q", "--refresh"]
            .iter()
            .map(|arg| arg.to_string())
            .collect(),
    }
}

/// Recognize the cancellation flavors git reports for interactive steps
pub fn classify_cancellation(output: &CommandOutput) -> Cancellation {
    if output.success {
        return Cancellation::None;
    }

    let mut cancellation = Cancellation::None;
    for line in output.all_lines() {
        if line.contains("Aborting commit due to empty commit message") {
            cancellation = Cancellation::InCommitMessage;
        } else if line.trim() == "Nothing to do" || line.contains("error: nothing to do") {
            return Cancellation::InCommitList;
        }
    }
    cancellation
}

impl Default for GitCommandRunner {
    fn default() -> Self {
        Self::new("git")
    }
}

impl CommandRunner for GitCommandRunner {
    fn rebase(
        &mut self,
        resource: &Resource,
        spec: &OperationSpec,
        mode: Option<ResumeMode>,
        listeners: &mut [&mut dyn LineListener],
    ) -> Result<RebaseCommandResult> {
        let args = Self::rebase_args(spec, mode);
        let output = self.run(resource, &args, listeners)?;
        let cancellation = classify_cancellation(&output);
        Ok(RebaseCommandResult {
            output,
            cancellation,
        })
    }

    fn abort(&mut self, resource: &Resource) -> Result<CommandOutput> {
        self.run(resource, &["rebase".to_string(), "--abort".to_string()], &mut [])
    }

    fn reset_keep(&mut self, resource: &Resource, revision: &str) -> Result<CommandOutput> {
        let args = [
            "reset".to_string(),
            "--keep".to_string(),
            revision.to_string(),
        ];
        self.run(resource, &args, &mut [])
    }
}
