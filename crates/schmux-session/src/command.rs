//! Agent command construction: the three invocation modes from
//! SPEC_FULL.md §4.4, wrapped in the repo's optional `wrapper_command`
//! template (`{{.WorkspacePath}}` / `{{.Cmd}}` placeholders, matching the
//! `Repo::wrapper_command` doc example).

use std::path::Path;

use schmux_core::AgentTarget;

/// How the agent process should be invoked for a spawn request.
#[derive(Debug, Clone)]
pub enum AgentInvocation {
    /// `<agent> "<prompt>"` — the common case.
    Prompt(String),
    /// A fully custom command line, bypassing the agent binary entirely.
    RawCommand(String),
    /// `<agent> --resume`, reattaching to the agent's own session state.
    Resume,
}

/// Build the full shell command line to run inside the multiplexer window,
/// applying the repo's wrapper template if one is configured.
pub fn build_agent_command(
    target: AgentTarget,
    invocation: &AgentInvocation,
    wrapper_command: Option<&str>,
    workspace_path: &Path,
) -> String {
    let base = match invocation {
        AgentInvocation::Prompt(prompt) => format!("{target} {}", shell_quote(prompt)),
        AgentInvocation::RawCommand(cmd) => cmd.clone(),
        AgentInvocation::Resume => format!("{target} --resume"),
    };

    match wrapper_command {
        Some(template) => template
            .replace("{{.WorkspacePath}}", &workspace_path.to_string_lossy())
            .replace("{{.Cmd}}", &base),
        None => base,
    }
}

fn shell_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}
