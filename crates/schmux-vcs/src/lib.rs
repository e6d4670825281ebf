pub mod driver;
pub mod error;
pub mod graph;

pub use driver::{CommandContext, DiffStat, RawCommit, VcsDriver};
pub use error::{Error, Result};
pub use graph::{compute_commit_graph, GraphOptions};
