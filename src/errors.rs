/// Tandem Error Types
#[derive(Debug, thiserror::Error)]
pub enum TandemError {
    /// Git-related errors
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// External command could not be executed
    #[error("Command error: {0}")]
    Command(String),

    /// Rebase operation errors
    #[error("Rebase error: {0}")]
    Rebase(String),

    /// Persisted rebase state errors
    #[error("State error: {0}")]
    State(String),

    /// Interactive prompt errors
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// The user cancelled the running operation
    #[error("Operation cancelled")]
    Cancelled,
}

impl TandemError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        TandemError::Config(msg.into())
    }

    pub fn command<S: Into<String>>(msg: S) -> Self {
        TandemError::Command(msg.into())
    }

    pub fn rebase<S: Into<String>>(msg: S) -> Self {
        TandemError::Rebase(msg.into())
    }

    pub fn state<S: Into<String>>(msg: S) -> Self {
        TandemError::State(msg.into())
    }

    pub fn prompt<S: Into<String>>(msg: S) -> Self {
        TandemError::Prompt(msg.into())
    }

    pub fn validation<S: Into<String>>(msg: S) -> Self {
        TandemError::Validation(msg.into())
    }

    pub fn not_in_progress<S: Into<String>>(msg: S) -> Self {
        TandemError::state(msg.into())
    }

    /// True for user-initiated cancellation, which is not a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TandemError::Cancelled)
    }
}

impl From<dialoguer::Error> for TandemError {
    fn from(e: dialoguer::Error) -> Self {
        TandemError::Prompt(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TandemError>;
