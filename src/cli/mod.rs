pub mod commands;
pub mod output;

use crate::errors::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::rebase::RebaseArgs;

#[derive(Parser)]
#[command(name = "tandem")]
#[command(about = "Tandem - rebase a superproject and its submodules together")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Rebase every repository of the family onto an upstream
    Rebase(RebaseArgs),

    /// Continue a rebase that stopped on conflicts or for editing
    Continue {
        /// Answer yes to every confirmation
        #[arg(long, short)]
        yes: bool,

        /// Never ask; leave unresolved conflicts for the next continue
        #[arg(long)]
        no_prompt: bool,
    },

    /// Skip the commit the rebase stopped at and continue
    Skip {
        /// Answer yes to every confirmation
        #[arg(long, short)]
        yes: bool,

        /// Never ask; leave unresolved conflicts for the next continue
        #[arg(long)]
        no_prompt: bool,
    },

    /// Abort the rebase and optionally roll back repositories already rebased
    Abort {
        /// Roll back without asking
        #[arg(long, short)]
        yes: bool,
    },

    /// Show the state of a suspended rebase
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., rebase.save_local_changes)
        key: String,
        /// Configuration value
        value: String,
        /// Write to ~/.tandem/config.json instead of the repository
        #[arg(long)]
        global: bool,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// List all configuration values
    List,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        self.setup_logging();

        match self.command {
            Commands::Rebase(args) => commands::rebase::start(args).await,
            Commands::Continue { yes, no_prompt } => {
                commands::rebase::resume(crate::rebase::ResumeMode::Continue, yes, no_prompt).await
            }
            Commands::Skip { yes, no_prompt } => {
                commands::rebase::resume(crate::rebase::ResumeMode::Skip, yes, no_prompt).await
            }
            Commands::Abort { yes } => commands::rebase::abort(yes).await,
            Commands::Status => commands::status::run().await,
            Commands::Config { action } => commands::config::run(action).await,
            Commands::Completions { shell } => commands::completions::generate_completions(shell),
        }
    }

    fn setup_logging(&self) {
        let level = if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        };

        let subscriber = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_target(false)
            .without_time();

        if self.no_color {
            console::set_colors_enabled(false);
            subscriber.with_ansi(false).init();
        } else {
            subscriber.init();
        }
    }
}
