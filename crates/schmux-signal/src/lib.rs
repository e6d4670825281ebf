pub mod error;
pub mod local;
pub mod remote;
pub mod signal;

pub use error::{Error, Result};
pub use local::watch_local;
pub use remote::{scan_for_signals, watcher_pane_script};
pub use signal::{parse_status_line, AgentSignal, SignalState};
