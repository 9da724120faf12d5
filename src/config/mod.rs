pub mod settings;

pub use settings::{GitSettings, RebaseSettings, Settings};

use crate::errors::{Result, TandemError};
use std::path::{Path, PathBuf};

/// Get the global Tandem configuration directory (~/.tandem/)
pub fn get_config_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| TandemError::config("Could not find home directory"))?;
    Ok(home_dir.join(".tandem"))
}

/// Get the Tandem configuration directory for a specific repository family
pub fn get_repo_config_dir(repo_path: &Path) -> PathBuf {
    repo_path.join(".tandem")
}

/// Path of the repository-level config file
pub fn repo_config_path(repo_path: &Path) -> PathBuf {
    get_repo_config_dir(repo_path).join("config.json")
}

/// Load settings for a repository family: repo file, then global file, then defaults
pub fn load_settings(repo_path: &Path) -> Result<Settings> {
    let repo_config = repo_config_path(repo_path);
    if repo_config.exists() {
        tracing::debug!("Loading settings from {}", repo_config.display());
        return Settings::load_from_file(&repo_config);
    }

    if let Ok(global_dir) = get_config_dir() {
        let global_config = global_dir.join("config.json");
        if global_config.exists() {
            tracing::debug!("Loading settings from {}", global_config.display());
            return Settings::load_from_file(&global_config);
        }
    }

    Ok(Settings::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_repo_config_wins_over_global() {
        let home = TempDir::new().unwrap();
        let repo = TempDir::new().unwrap();
        let old_home = std::env::var_os("HOME");
        std::env::set_var("HOME", home.path());

        let mut global = Settings::default();
        global.git.remote = "global-remote".to_string();
        global
            .save_to_file(&home.path().join(".tandem").join("config.json"))
            .unwrap();

        assert_eq!(load_settings(repo.path()).unwrap().git.remote, "global-remote");

        let mut local = Settings::default();
        local.git.remote = "local-remote".to_string();
        local.save_to_file(&repo_config_path(repo.path())).unwrap();

        assert_eq!(load_settings(repo.path()).unwrap().git.remote, "local-remote");

        match old_home {
            Some(value) => std::env::set_var("HOME", value),
            None => std::env::remove_var("HOME"),
        }
    }
}
