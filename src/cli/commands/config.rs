use crate::cli::output::Output;
use crate::cli::ConfigAction;
use crate::config::{get_config_dir, repo_config_path, Settings};
use crate::errors::{Result, TandemError};
use crate::git::find_repository_root;
use std::env;
use std::path::{Path, PathBuf};

/// Handle configuration commands
pub async fn run(action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Set { key, value, global } => {
            let config_file = if global {
                get_config_dir()?.join("config.json")
            } else {
                current_repo_config()?
            };
            set_config_value(&config_file, &key, &value)
        }
        ConfigAction::Get { key } => get_config_value(&current_repo_config()?, &key),
        ConfigAction::List => list_config_values(&current_repo_config()?),
    }
}

fn current_repo_config() -> Result<PathBuf> {
    let current_dir = env::current_dir()
        .map_err(|e| TandemError::config(format!("Could not get current directory: {e}")))?;
    let repo_root = find_repository_root(&current_dir)?;
    Ok(repo_config_path(&repo_root))
}

fn set_config_value(config_file: &Path, key: &str, value: &str) -> Result<()> {
    let mut settings = Settings::load_from_file(config_file)?;
    settings.set_value(key, value)?;
    settings.validate()?;
    settings.save_to_file(config_file)?;

    Output::success(format!("Configuration updated: {key} = {value}"));

    if key == "rebase.save_local_changes" && value == "false" {
        Output::tip("Rebases of repositories with local changes will now fail instead of stashing");
    }

    Ok(())
}

fn get_config_value(config_file: &Path, key: &str) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;
    let value = settings.get_value(key)?;
    println!("{key} = {}", display_value(&value));
    Ok(())
}

fn list_config_values(config_file: &Path) -> Result<()> {
    let settings = Settings::load_from_file(config_file)?;

    Output::section("Tandem Configuration");
    for key in Settings::keys() {
        let value = settings.get_value(key)?;
        Output::sub_item(format!("{key} = {}", display_value(&value)));
    }

    Ok(())
}

fn display_value(value: &str) -> &str {
    if value.is_empty() {
        "(not set)"
    } else {
        value
    }
}
