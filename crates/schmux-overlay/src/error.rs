use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("merge failed: {0}")]
    MergeFailed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Core(#[from] schmux_core::Error),

    #[error(transparent)]
    Vcs(#[from] schmux_vcs::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
