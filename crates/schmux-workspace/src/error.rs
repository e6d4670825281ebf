use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("workspace has active sessions: {0}")]
    ActiveSessions(String),

    #[error("workspace unsafe to dispose: {reasons:?}")]
    UnsafeDispose { reasons: Vec<String> },

    #[error("repo not found: {0}")]
    RepoNotFound(String),

    #[error("workspace not found: {0}")]
    WorkspaceNotFound(String),

    #[error(transparent)]
    Vcs(#[from] schmux_vcs::Error),

    #[error(transparent)]
    Core(#[from] schmux_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
