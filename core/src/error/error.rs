use thiserror::Error;

use crate::state::InvalidTransitionError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("config error: {0}")]
    Config(String),
    #[error("command failed: {0}")]
    Command(String),
    #[error("{0}")]
    Transition(#[from] InvalidTransitionError),
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

impl CliError {
    /// Process exit code for this error.
    ///
    /// 11: config, 20: command / IO / HTTP, 30: transition rejected locally,
    /// 50: uncategorized.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 11,
            CliError::Command(_) | CliError::Http(_) | CliError::Io(_) => 20,
            CliError::Transition(_) => 30,
            CliError::Anyhow(_) => 50,
        }
    }
}
