//! Multiplexer Driver: creates/kills detached `tmux` windows, routes input
//! via send-keys, and reads pane output.
//!
//! Grounded on `dk-runner::executor::process::ProcessExecutor`: the same
//! `tokio::process::Command` + cleared/allowlisted environment + timeout-
//! wrapped `output()` idiom, adapted from one-shot command execution to
//! long-lived detached-session management.

use std::collections::HashMap;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{Error, Result};

/// Environment variables inherited from the daemon's own process into every
/// spawned agent window, matching `ProcessExecutor::SAFE_ENV_VARS`.
const SAFE_ENV_VARS: &[&str] = &["PATH", "HOME", "LANG", "TERM", "USER", "SHELL"];

#[derive(Debug, Clone, Copy)]
pub struct MuxOptions {
    pub command_timeout: Duration,
}

impl Default for MuxOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_millis(500),
        }
    }
}

/// Stateless driver over the `tmux` binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct MuxDriver;

impl MuxDriver {
    pub fn new() -> Self {
        Self
    }

    async fn run(&self, opts: &MuxOptions, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("tmux");
        cmd.args(args).kill_on_drop(true);

        let output = tokio::time::timeout(opts.command_timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout(opts.command_timeout))?
            .map_err(Error::Io)?;

        if !output.status.success() {
            return Err(Error::CommandFailed(
                String::from_utf8_lossy(&output.stderr).into_owned(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Create a new detached window running `command`, rooted at `cwd`,
    /// with `env` merged on top of the safe-allowlisted inherited variables.
    pub async fn create_window(
        &self,
        opts: &MuxOptions,
        window_name: &str,
        cwd: &std::path::Path,
        command: &str,
        env: &HashMap<String, String>,
    ) -> Result<()> {
        let env_prefix = build_env_prefix(env);
        let full_command = format!("{env_prefix}{command}");

        self.run(
            opts,
            &[
                "new-session",
                "-d",
                "-s",
                window_name,
                "-c",
                cwd.to_string_lossy().as_ref(),
                &full_command,
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn kill_window(&self, opts: &MuxOptions, window_name: &str) -> Result<()> {
        match self.run(opts, &["kill-session", "-t", window_name]).await {
            Ok(_) => Ok(()),
            // Already gone is not an error for disposal's unwind path.
            Err(Error::CommandFailed(_)) => Ok(()),
            Err(other) => Err(other),
        }
    }

    pub async fn window_exists(&self, opts: &MuxOptions, window_name: &str) -> bool {
        self.run(opts, &["has-session", "-t", window_name]).await.is_ok()
    }

    /// Send literal keystrokes to the window (not a write to the attached
    /// PTY directly — this preserves local scrollback/interception on the
    /// viewer side, per SPEC_FULL.md §4.4's input/output model).
    pub async fn send_keys(&self, opts: &MuxOptions, window_name: &str, keys: &str) -> Result<()> {
        self.run(opts, &["send-keys", "-t", window_name, "-l", keys]).await?;
        self.run(opts, &["send-keys", "-t", window_name, "Enter"]).await?;
        Ok(())
    }

    /// Send raw bytes without an appended Enter (for control sequences).
    pub async fn send_raw(&self, opts: &MuxOptions, window_name: &str, bytes: &str) -> Result<()> {
        self.run(opts, &["send-keys", "-t", window_name, "-l", bytes]).await?;
        Ok(())
    }

    pub async fn resize_window(&self, opts: &MuxOptions, window_name: &str, cols: u16, rows: u16) -> Result<()> {
        self.run(
            opts,
            &[
                "resize-window",
                "-t",
                window_name,
                "-x",
                &cols.to_string(),
                "-y",
                &rows.to_string(),
            ],
        )
        .await?;
        Ok(())
    }

    /// Capture the current pane contents, including scrollback history up
    /// to `history_lines` (0 = visible screen only).
    pub async fn capture_output(&self, opts: &MuxOptions, window_name: &str, history_lines: u32) -> Result<String> {
        let start = format!("-{history_lines}");
        self.run(
            opts,
            &["capture-pane", "-p", "-t", window_name, "-S", &start],
        )
        .await
    }
}

fn build_env_prefix(extra: &HashMap<String, String>) -> String {
    let mut prefix = String::new();
    for key in SAFE_ENV_VARS {
        if let Ok(val) = std::env::var(key) {
            prefix.push_str(&format!("{key}={} ", shell_escape(&val)));
        }
    }
    for (key, val) in extra {
        prefix.push_str(&format!("{key}={} ", shell_escape(val)));
    }
    prefix
}

fn shell_escape(value: &str) -> String {
    format!("'{}'", value.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_escape_handles_embedded_quotes() {
        assert_eq!(shell_escape("it's"), "'it'\\''s'");
    }

    #[test]
    fn build_env_prefix_includes_extra_vars() {
        let mut extra = HashMap::new();
        extra.insert("SCHMUX_SESSION_ID".to_string(), "abc-123".to_string());
        let prefix = build_env_prefix(&extra);
        assert!(prefix.contains("SCHMUX_SESSION_ID='abc-123'"));
    }

    #[tokio::test]
    #[ignore = "requires a real tmux binary on PATH"]
    async fn window_lifecycle_roundtrip() {
        let driver = MuxDriver::new();
        let opts = MuxOptions::default();
        let dir = tempfile::tempdir().unwrap();
        let env = HashMap::new();

        driver
            .create_window(&opts, "schmux-test-window", dir.path(), "sleep 30", &env)
            .await
            .unwrap();
        assert!(driver.window_exists(&opts, "schmux-test-window").await);
        driver.kill_window(&opts, "schmux-test-window").await.unwrap();
        assert!(!driver.window_exists(&opts, "schmux-test-window").await);
    }
}
