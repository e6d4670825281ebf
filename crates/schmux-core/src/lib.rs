pub mod config;
pub mod error;
pub mod state;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use state::StateStore;
pub use types::*;
