use thiserror::Error;

/// Failure categories surfaced by commands.
///
/// Every variant terminates the process with exit code 1. Handled
/// user-facing conditions that should exit 0 are reported through
/// [`Outcome::Aborted`] instead.
#[derive(Debug, Error)]
pub enum JiazError {
    /// Bad user input or an interactive flow the user could not complete.
    #[error("{0}")]
    Validation(String),
    #[error("Configuration '{0}' not found.")]
    ConfigNotFound(String),
    /// Tracker connectivity or authentication failure.
    #[error("{0}")]
    Fatal(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JiazError {
    pub fn validation(message: impl Into<String>) -> Self {
        JiazError::Validation(message.into())
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        JiazError::Fatal(message.into())
    }
}

/// How a command finished when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Early, expected termination; the message is shown and the exit code is 0.
    Aborted(String),
}

pub type CommandResult = std::result::Result<Outcome, JiazError>;
