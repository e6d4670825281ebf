pub mod compounder;
pub mod error;
pub mod manifest;
pub mod merger;

pub use compounder::{Compounder, SyncOutcome};
pub use error::{Error, Result};
pub use manifest::{hash_bytes, hash_file, looks_binary};
pub use merger::{MergeOutcome, Merger, UnionMerger};
