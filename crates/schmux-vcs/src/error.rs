use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("git command failed (exit {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    #[error("git command timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("git command cancelled")]
    Cancelled,

    #[error("failed to parse git output: {0}")]
    ParseError(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
