use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("multiplexer command failed: {0}")]
    CommandFailed(String),

    #[error("multiplexer command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("window not found: {0}")]
    WindowNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
