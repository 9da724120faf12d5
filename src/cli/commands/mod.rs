pub mod completions;
pub mod config;
pub mod rebase;
pub mod status;
