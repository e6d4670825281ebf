pub mod command;
pub mod error;
pub mod orchestrator;

pub use command::{build_agent_command, AgentInvocation};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, SpawnRequest};
