use crate::errors::{Result, TandemError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub git: GitSettings,
    #[serde(default)]
    pub rebase: RebaseSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    /// Git executable used for rebase commands
    pub executable: String,
    /// Remote whose protected branches mark commits as published
    pub remote: String,
}

/// Settings specific to rebase operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebaseSettings {
    /// Stash uncommitted changes before rebasing and restore them afterwards
    pub save_local_changes: bool,
    /// Ask before rebasing commits already pushed to a protected branch
    pub check_published_commits: bool,
    /// Branches considered published on the configured remote
    pub protected_branches: Vec<String>,
    /// Prompt for conflict resolution instead of stopping immediately
    pub prompt_on_conflicts: bool,
    /// Rebase initialized submodules together with the superproject
    pub include_submodules: bool,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            executable: "git".to_string(),
            remote: "origin".to_string(),
        }
    }
}

impl Default for RebaseSettings {
    fn default() -> Self {
        Self {
            save_local_changes: true,
            check_published_commits: true,
            protected_branches: vec!["main".to_string(), "master".to_string()],
            prompt_on_conflicts: true,
            include_submodules: true,
        }
    }
}

impl Settings {
    /// Load settings from a file, falling back to defaults when it is missing
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| TandemError::config(format!("Failed to read config file: {e}")))?;

        let settings: Settings = serde_json::from_str(&content)
            .map_err(|e| TandemError::config(format!("Failed to parse config file: {e}")))?;

        Ok(settings)
    }

    /// Save settings to a file
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        crate::utils::atomic_file::write_json(path, self)
    }

    /// Update a configuration value by key
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<()> {
        let (section, name) = split_key(key)?;

        match (section, name) {
            ("git", "executable") => self.git.executable = value.to_string(),
            ("git", "remote") => self.git.remote = value.to_string(),
            ("rebase", "save_local_changes") => {
                self.rebase.save_local_changes = parse_bool(value)?;
            }
            ("rebase", "check_published_commits") => {
                self.rebase.check_published_commits = parse_bool(value)?;
            }
            ("rebase", "protected_branches") => {
                self.rebase.protected_branches = value
                    .split(',')
                    .map(str::trim)
                    .filter(|b| !b.is_empty())
                    .map(String::from)
                    .collect();
            }
            ("rebase", "prompt_on_conflicts") => {
                self.rebase.prompt_on_conflicts = parse_bool(value)?;
            }
            ("rebase", "include_submodules") => {
                self.rebase.include_submodules = parse_bool(value)?;
            }
            _ => return Err(TandemError::config(format!("Unknown config key: {key}"))),
        }

        Ok(())
    }

    /// Get a configuration value by key
    pub fn get_value(&self, key: &str) -> Result<String> {
        let (section, name) = split_key(key)?;

        let value = match (section, name) {
            ("git", "executable") => self.git.executable.clone(),
            ("git", "remote") => self.git.remote.clone(),
            ("rebase", "save_local_changes") => self.rebase.save_local_changes.to_string(),
            ("rebase", "check_published_commits") => {
                self.rebase.check_published_commits.to_string()
            }
            ("rebase", "protected_branches") => self.rebase.protected_branches.join(","),
            ("rebase", "prompt_on_conflicts") => self.rebase.prompt_on_conflicts.to_string(),
            ("rebase", "include_submodules") => self.rebase.include_submodules.to_string(),
            _ => return Err(TandemError::config(format!("Unknown config key: {key}"))),
        };

        Ok(value)
    }

    /// All known keys, in display order
    pub fn keys() -> &'static [&'static str] {
        &[
            "git.executable",
            "git.remote",
            "rebase.save_local_changes",
            "rebase.check_published_commits",
            "rebase.protected_branches",
            "rebase.prompt_on_conflicts",
            "rebase.include_submodules",
        ]
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.git.executable.trim().is_empty() {
            return Err(TandemError::config("git.executable must not be empty"));
        }
        if self.git.remote.trim().is_empty() {
            return Err(TandemError::config("git.remote must not be empty"));
        }
        Ok(())
    }
}

fn split_key(key: &str) -> Result<(&str, &str)> {
    key.split_once('.')
        .filter(|(section, name)| !section.is_empty() && !name.contains('.'))
        .ok_or_else(|| TandemError::config(format!("Invalid config key format: {key}")))
}

fn parse_bool(value: &str) -> Result<bool> {
    value
        .parse()
        .map_err(|_| TandemError::config(format!("Invalid boolean value: {value}")))
}
