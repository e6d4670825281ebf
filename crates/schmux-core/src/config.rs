//! Daemon configuration: TOML file plus environment variable overrides.
//!
//! Mirrors the shape of `dk-server`'s `clap(env = ...)` fields, but since the
//! daemon binary carries no CLI surface (parsing command-line arguments is
//! an explicit non-goal collaborator), the same "env var wins" precedence is
//! expressed as a plain struct loaded from TOML with overrides applied after.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::Repo;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root directory for persisted state, overlay store, and worktree bases.
    pub data_dir: PathBuf,

    /// Repos collaborators can spawn sessions against, e.g.
    /// `[[repos]]\nname = "demo"\nurl = "https://example.com/demo.git"`.
    pub repos: Vec<Repo>,

    /// Interval between background git-status polls of live workspaces.
    pub git_status_poll_interval_secs: u64,

    /// Per-workspace overlay change debounce window.
    pub overlay_debounce_secs: u64,

    /// Anti-echo suppression window after a propagated write.
    pub overlay_suppress_secs: u64,

    /// Timeout applied to every VCS shell-out.
    pub vcs_command_timeout_secs: u64,

    /// Timeout applied to every multiplexer control command.
    pub mux_command_timeout_millis: u64,

    /// Timeout applied to a merger invocation.
    pub merger_timeout_secs: u64,

    /// Files larger than this are never passed through the three-way
    /// merger; last-write-wins instead.
    pub merge_max_bytes: u64,

    /// Local-watcher event coalescing window.
    pub signal_coalesce_millis: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            repos: Vec::new(),
            git_status_poll_interval_secs: 5,
            overlay_debounce_secs: 2,
            overlay_suppress_secs: 5,
            vcs_command_timeout_secs: 30,
            mux_command_timeout_millis: 500,
            merger_timeout_secs: 10,
            merge_max_bytes: 100 * 1024,
            signal_coalesce_millis: 100,
        }
    }
}

impl Config {
    /// Load from a TOML file if present, then apply `SCHMUX_*` environment
    /// overrides. A missing file is not an error — defaults apply.
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let mut cfg = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw).map_err(|e| Error::Config(e.to_string()))?
        } else {
            Self::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SCHMUX_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("SCHMUX_GIT_STATUS_POLL_INTERVAL_SECS") {
            if let Ok(n) = v.parse() {
                self.git_status_poll_interval_secs = n;
            }
        }
        if let Ok(v) = std::env::var("SCHMUX_OVERLAY_DEBOUNCE_SECS") {
            if let Ok(n) = v.parse() {
                self.overlay_debounce_secs = n;
            }
        }
    }

    pub fn git_status_poll_interval(&self) -> Duration {
        Duration::from_secs(self.git_status_poll_interval_secs)
    }

    pub fn overlay_debounce(&self) -> Duration {
        Duration::from_secs(self.overlay_debounce_secs)
    }

    pub fn overlay_suppress_window(&self) -> Duration {
        Duration::from_secs(self.overlay_suppress_secs)
    }

    pub fn vcs_command_timeout(&self) -> Duration {
        Duration::from_secs(self.vcs_command_timeout_secs)
    }

    pub fn mux_command_timeout(&self) -> Duration {
        Duration::from_millis(self.mux_command_timeout_millis)
    }

    pub fn merger_timeout(&self) -> Duration {
        Duration::from_secs(self.merger_timeout_secs)
    }

    pub fn signal_coalesce_window(&self) -> Duration {
        Duration::from_millis(self.signal_coalesce_millis)
    }

    pub fn overlays_dir(&self) -> PathBuf {
        self.data_dir.join("overlays")
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.data_dir.join("worktrees")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }
}
