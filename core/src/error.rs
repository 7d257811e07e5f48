use thiserror::Error;

/// Errors surfaced by the session layer of the pipeline.
///
/// The analysis stages themselves are total; the only failures callers can
/// observe are bookkeeping ones.
#[derive(Debug, Error)]
pub enum FaultlineError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already exists: {0}")]
    SessionExists(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FaultlineError>;
