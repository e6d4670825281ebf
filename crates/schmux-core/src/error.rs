use thiserror::Error;

/// Errors produced by the core domain layer: the state store and config
/// loading. Component crates (`schmux-vcs`, `schmux-workspace`, ...) define
/// their own narrower `Error` enums and convert into this one only at the
/// daemon's outermost boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
