use shared::error::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("No such index account: {index} ({count} account(s) available)")]
    NotFound { index: usize, count: usize },
    #[error("No account currently selected")]
    NoActiveAccount,
    /// A call, contact or conversation vanished while it was being looked up.
    #[error("engine lookup failed: {0}")]
    EngineLookup(EngineError),
    #[error("engine request failed: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Command '{0}' requires an active account (switch to an account with 'log')")]
    RequiresAccount(String),
    #[error("Syntax error: {0}")]
    Syntax(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type SessionResult<T> = Result<T, SessionError>;
