pub mod cli;
pub mod config;
pub mod errors;
pub mod git;
pub mod rebase;
pub mod utils;

pub use errors::TandemError;
