pub mod driver;
pub mod error;

pub use driver::{MuxDriver, MuxOptions};
pub use error::{Error, Result};
