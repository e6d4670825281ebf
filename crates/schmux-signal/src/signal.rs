//! The status-file wire format and the typed event it's parsed into.

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalState {
    Completed,
    NeedsInput,
    NeedsTesting,
    Error,
    Working,
}

impl fmt::Display for SignalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::NeedsInput => "needs_input",
            Self::NeedsTesting => "needs_testing",
            Self::Error => "error",
            Self::Working => "working",
        };
        f.write_str(s)
    }
}

impl FromStr for SignalState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "needs_input" => Ok(Self::NeedsInput),
            "needs_testing" => Ok(Self::NeedsTesting),
            "error" => Ok(Self::Error),
            "working" => Ok(Self::Working),
            other => Err(format!("unknown signal state: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSignal {
    pub session_id: String,
    pub state: SignalState,
    pub message: Option<String>,
}

/// Parse a single-line status file body: `STATE[ message]`.
///
/// Returns `None` for empty content (a write caught mid-truncation) or an
/// unrecognized state, logging a warning for the latter — callers should
/// simply ignore a `None` rather than propagate an error, since a torn read
/// is expected and harmless.
pub fn parse_status_line(session_id: &str, raw: &str) -> Option<AgentSignal> {
    let trimmed = raw.trim_end_matches(['\n', '\r']);
    if trimmed.is_empty() {
        return None;
    }
    let (state_str, message) = match trimmed.split_once(' ') {
        Some((s, m)) => (s, Some(m.to_string())),
        None => (trimmed, None),
    };
    match SignalState::from_str(state_str) {
        Ok(state) => Some(AgentSignal {
            session_id: session_id.to_string(),
            state,
            message,
        }),
        Err(_) => {
            tracing::warn!(state = state_str, "unrecognized signal state, ignoring");
            None
        }
    }
}
