use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Workspace(#[from] schmux_workspace::Error),

    #[error(transparent)]
    Mux(#[from] schmux_mux::Error),

    #[error(transparent)]
    Signal(#[from] schmux_signal::Error),

    #[error(transparent)]
    Core(#[from] schmux_core::Error),

    #[error(transparent)]
    Vcs(#[from] schmux_vcs::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
