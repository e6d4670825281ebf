//! Domain types shared across every schmux component.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type WorkspaceId = String;
pub type SessionId = String;
pub type RepoUrl = String;

/// A configured repository collaborators can spawn sessions against.
///
/// Immutable once loaded; reloading config does not mutate live workspaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Repo {
    pub name: String,
    pub url: RepoUrl,
    /// Template wrapping the agent command, e.g. `"docker exec {{.WorkspacePath}} {{.Cmd}}"`.
    pub wrapper_command: Option<String>,
    /// Shared bare-clone directory used as the worktree base. Falls back to
    /// a full clone per workspace when unset.
    pub bare_path: Option<std::path::PathBuf>,
    /// Additional overlay paths to sync for this repo, beyond the defaults.
    #[serde(default)]
    pub overlay_paths: Vec<String>,
}

/// The agent kind a session was spawned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentTarget {
    Claude,
    Codex,
    Gemini,
    Custom,
}

impl fmt::Display for AgentTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
            Self::Gemini => "gemini",
            Self::Custom => "custom",
        };
        f.write_str(s)
    }
}

impl FromStr for AgentTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "claude" => Ok(Self::Claude),
            "codex" => Ok(Self::Codex),
            "gemini" => Ok(Self::Gemini),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown agent target: {other}")),
        }
    }
}

/// An isolated on-disk (or remote) checkout plus its live git status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub repo_url: RepoUrl,
    /// The branch actually checked out, which may differ from what the
    /// caller requested if uniquification kicked in.
    pub branch: String,
    pub path: std::path::PathBuf,
    /// Present when the workspace lives on a remote host rather than the
    /// local filesystem; `path` is still meaningful as the remote-side path.
    pub remote_host_id: Option<String>,

    pub git_dirty: bool,
    pub git_ahead: u32,
    pub git_behind: u32,
    pub git_files_changed: u32,
    pub lines_added: u64,
    pub lines_removed: u64,
    pub commits_synced_with_remote: bool,

    pub overlay_manifest: OverlayManifest,

    /// Forward-compatibility: fields this binary doesn't recognize are
    /// preserved verbatim across a load/save round-trip.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Workspace {
    pub fn is_materialized(&self) -> bool {
        self.remote_host_id.is_none() && self.path.exists()
    }
}

/// A single agent process multiplexed inside a workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub workspace_id: WorkspaceId,
    pub target: AgentTarget,
    pub multiplexer_window: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_output_at: chrono::DateTime<chrono::Utc>,
    pub last_signal_at: Option<chrono::DateTime<chrono::Utc>>,
    /// The single latest structured status message from the agent (file
    /// signal or LLM-inferred nudge — both land here; see SPEC_FULL.md §9).
    pub current_nudge: Option<String>,
    pub nudge_seq: u64,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Per-workspace map from relative path to the SHA-256 hex digest recorded
/// at the last known sync point with the overlay store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverlayManifest {
    pub entries: HashMap<String, String>,
}

impl OverlayManifest {
    pub fn get(&self, relpath: &str) -> Option<&str> {
        self.entries.get(relpath).map(String::as_str)
    }

    pub fn set(&mut self, relpath: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(relpath.into(), hash.into());
    }

    /// True when `hash` matches the last recorded sync point for `relpath`.
    pub fn matches(&self, relpath: &str, hash: &str) -> bool {
        self.entries.get(relpath).map(String::as_str) == Some(hash)
    }
}

/// A single commit in a rendered commit graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitNode {
    pub hash: String,
    pub short_hash: String,
    pub subject: String,
    pub author: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub parents: Vec<String>,
    pub branches: Vec<String>,
    pub is_head: Vec<String>,
    pub workspace_ids: Vec<WorkspaceId>,
}

/// The full response to a commit-graph query: nodes in render order (heads
/// first) plus a summary of which branches are present.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CommitGraph {
    pub nodes: Vec<CommitNode>,
    pub branches: HashMap<String, BranchInfo>,
    pub main_ahead_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub is_main: bool,
    pub tip: String,
}
