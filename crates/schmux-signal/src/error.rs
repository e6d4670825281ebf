use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("watcher setup failed: {0}")]
    WatcherSetup(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
