//! The Session Orchestrator: spawn/dispose lifecycle, nudge handling, and
//! input/output routing through the multiplexer.
//!
//! Spawn/dispose follow the "partial failure must unwind fully" rule from
//! SPEC_FULL.md §5 via an explicit guard stack built up as each step
//! succeeds and run in reverse on failure, the same shape the teacher's
//! process executor uses for its `StepOutput` timeout/error handling,
//! generalized from a single resource to a stack of them.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use schmux_core::{AgentTarget, CommitGraph, Config, Session, SessionId, StateStore, WorkspaceId};
use schmux_mux::{MuxDriver, MuxOptions};
use schmux_overlay::Compounder;
use schmux_signal::{local::watch_local, remote, AgentSignal};
use schmux_vcs::{CommandContext, GraphOptions, VcsDriver};
use schmux_workspace::WorkspaceManager;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::command::{build_agent_command, AgentInvocation};
use crate::error::{Error, Result};

pub struct SpawnRequest {
    pub repo_url: String,
    pub branch: String,
    pub target: AgentTarget,
    /// Reuse an existing workspace instead of resolving by `(repo_url, branch)`.
    pub workspace_id: Option<WorkspaceId>,
    pub invocation: AgentInvocation,
}

struct SessionHandle {
    cancellation: CancellationToken,
    watcher_join: tokio::task::JoinHandle<()>,
    relay_join: tokio::task::JoinHandle<()>,
    output_tx: broadcast::Sender<Vec<u8>>,
    output_poll_join: tokio::task::JoinHandle<()>,
}

/// Undo steps recorded while spawning, run in reverse on failure.
enum UnwindStep {
    KillWindow(String),
    RemoveSignalDir(PathBuf),
    ForgetState(SessionId),
    ReleaseWatch(WorkspaceId),
}

pub struct Orchestrator {
    state: Arc<StateStore>,
    workspaces: Arc<WorkspaceManager>,
    compounder: Arc<Compounder>,
    vcs: VcsDriver,
    mux: MuxDriver,
    mux_opts: MuxOptions,
    config: Arc<Config>,
    handles: DashMap<SessionId, SessionHandle>,
}

impl Orchestrator {
    pub fn new(
        state: Arc<StateStore>,
        workspaces: Arc<WorkspaceManager>,
        compounder: Arc<Compounder>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            state,
            workspaces,
            compounder,
            vcs: VcsDriver::new(),
            mux: MuxDriver::new(),
            mux_opts: MuxOptions {
                command_timeout: config.mux_command_timeout(),
            },
            config,
            handles: DashMap::new(),
        }
    }

    pub async fn spawn(&self, req: SpawnRequest) -> Result<Session> {
        let mut unwind: Vec<UnwindStep> = Vec::new();
        match self.spawn_inner(req, &mut unwind).await {
            Ok(session) => Ok(session),
            Err(err) => {
                self.run_unwind(unwind).await;
                Err(err)
            }
        }
    }

    async fn spawn_inner(&self, req: SpawnRequest, unwind: &mut Vec<UnwindStep>) -> Result<Session> {
        let workspace = match &req.workspace_id {
            Some(id) => self
                .state
                .get_workspace(id)
                .ok_or_else(|| Error::Core(schmux_core::Error::WorkspaceNotFound(id.clone())))?,
            None => self.workspaces.get_or_create(&req.repo_url, &req.branch).await?,
        };

        let session_id = uuid::Uuid::new_v4().to_string();
        let window_name = format!("schmux-{session_id}");
        let signal_dir = workspace.path.join(".schmux").join("signal");
        let status_file = signal_dir.join(&session_id);

        tokio::fs::create_dir_all(&signal_dir).await?;
        unwind.push(UnwindStep::RemoveSignalDir(signal_dir.clone()));

        let repo = self.workspaces.repo(&workspace.repo_url)?;
        let command = build_agent_command(req.target, &req.invocation, repo.wrapper_command.as_deref(), &workspace.path);

        let mut env = HashMap::new();
        env.insert("SCHMUX_ENABLED".to_string(), "1".to_string());
        env.insert("SCHMUX_SESSION_ID".to_string(), session_id.clone());
        env.insert("SCHMUX_STATUS_FILE".to_string(), status_file.to_string_lossy().into_owned());

        self.mux
            .create_window(&self.mux_opts, &window_name, &workspace.path, &command, &env)
            .await?;
        unwind.push(UnwindStep::KillWindow(window_name.clone()));

        let declared_paths = self.workspaces.declared_overlay_paths(&workspace.repo_url)?;
        self.compounder.acquire_watch(
            workspace.id.clone(),
            repo.name.clone(),
            workspace.path.clone(),
            declared_paths,
        );
        unwind.push(UnwindStep::ReleaseWatch(workspace.id.clone()));

        let cancellation = CancellationToken::new();
        let (signal_tx, signal_rx) = mpsc::channel(32);
        let watcher_join = if workspace.remote_host_id.is_some() {
            self.spawn_remote_watcher(
                session_id.clone(),
                window_name.clone(),
                status_file.clone(),
                signal_tx,
                cancellation.clone(),
            )
        } else {
            let inner = watch_local(
                session_id.clone(),
                status_file.clone(),
                self.config.signal_coalesce_window(),
                signal_tx,
                cancellation.clone(),
            );
            tokio::spawn(async move {
                match inner.await {
                    Ok(Err(err)) => tracing::warn!(error = %err, "local signal watcher exited with error"),
                    Err(join_err) => tracing::warn!(error = %join_err, "local signal watcher task panicked"),
                    Ok(Ok(())) => {}
                }
            })
        };
        let relay_join = self.spawn_signal_relay(session_id.clone(), signal_rx);

        let (output_tx, _) = broadcast::channel(1024);
        let output_poll_join = self.spawn_output_poll(window_name.clone(), output_tx.clone(), cancellation.clone());

        let now = chrono::Utc::now();
        let session = Session {
            id: session_id.clone(),
            workspace_id: workspace.id.clone(),
            target: req.target,
            multiplexer_window: window_name,
            created_at: now,
            last_output_at: now,
            last_signal_at: None,
            current_nudge: None,
            nudge_seq: 0,
            extra: serde_json::Map::new(),
        };
        self.state.add_session(session.clone());
        unwind.push(UnwindStep::ForgetState(session_id.clone()));

        self.handles.insert(
            session_id,
            SessionHandle {
                cancellation,
                watcher_join,
                relay_join,
                output_tx,
                output_poll_join,
            },
        );

        Ok(session)
    }

    async fn run_unwind(&self, unwind: Vec<UnwindStep>) {
        for step in unwind.into_iter().rev() {
            match step {
                UnwindStep::KillWindow(name) => {
                    if let Err(err) = self.mux.kill_window(&self.mux_opts, &name).await {
                        tracing::warn!(window = %name, error = %err, "failed to unwind window creation");
                    }
                }
                UnwindStep::RemoveSignalDir(dir) => {
                    if let Err(err) = tokio::fs::remove_dir_all(&dir).await {
                        tracing::warn!(dir = %dir.display(), error = %err, "failed to unwind signal dir");
                    }
                }
                UnwindStep::ForgetState(id) => {
                    self.state.remove_session(&id);
                }
                UnwindStep::ReleaseWatch(workspace_id) => {
                    self.compounder.release_watch(&workspace_id);
                }
            }
        }
    }

    /// Remote-mode signal watcher: runs a hidden window executing the
    /// sentinel-emitting watcher script, polling its captured pane output
    /// and feeding chunks through the sentinel scanner instead of watching
    /// the status file on the local filesystem (there isn't one reachable
    /// from here for a remote host).
    fn spawn_remote_watcher(
        &self,
        session_id: SessionId,
        target_window: String,
        status_file: PathBuf,
        tx: mpsc::Sender<AgentSignal>,
        cancellation: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mux = self.mux;
        let opts = self.mux_opts;
        let watcher_window = format!("{target_window}-watch");
        let status_file_str = status_file.to_string_lossy().into_owned();

        tokio::spawn(async move {
            let script = remote::watcher_pane_script(&status_file_str);
            if let Err(err) = mux
                .create_window(&opts, &watcher_window, std::path::Path::new("/"), &script, &HashMap::new())
                .await
            {
                tracing::warn!(window = %watcher_window, error = %err, "failed to start remote signal watcher pane");
                return;
            }

            let mut buffer = String::new();
            let mut last_len = 0usize;
            let mut ticker = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let Ok(captured) = mux.capture_output(&opts, &watcher_window, 0).await else {
                    continue;
                };
                if captured.len() > last_len {
                    let chunk = &captured[last_len..];
                    last_len = captured.len();
                    for signal in remote::scan_for_signals(&session_id, &mut buffer, chunk) {
                        if tx.send(signal).await.is_err() {
                            break;
                        }
                    }
                } else if captured.len() < last_len {
                    last_len = captured.len();
                }
            }

            let _ = mux.kill_window(&opts, &watcher_window).await;
        })
    }

    fn spawn_signal_relay(&self, session_id: SessionId, mut rx: mpsc::Receiver<AgentSignal>) -> tokio::task::JoinHandle<()> {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            while let Some(signal) = rx.recv().await {
                let text = match &signal.message {
                    Some(msg) => format!("{} {msg}", signal.state),
                    None => signal.state.to_string(),
                };
                if let Err(err) = state.update_session_nudge(&session_id, text) {
                    tracing::warn!(session = %session_id, error = %err, "failed to record signal nudge");
                }
            }
        })
    }

    /// Poll the window's pane output and broadcast newly-appeared bytes.
    /// Slow viewers fall behind and get `Lagged`, never blocking the agent
    /// side, matching the bounded-broadcast backpressure policy.
    fn spawn_output_poll(
        &self,
        window_name: String,
        tx: broadcast::Sender<Vec<u8>>,
        cancellation: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let mux = self.mux;
        let opts = self.mux_opts;
        tokio::spawn(async move {
            let mut last_len = 0usize;
            let mut ticker = tokio::time::interval(Duration::from_millis(250));
            loop {
                tokio::select! {
                    _ = cancellation.cancelled() => return,
                    _ = ticker.tick() => {}
                }
                let Ok(captured) = mux.capture_output(&opts, &window_name, 0).await else {
                    continue;
                };
                if captured.len() > last_len {
                    let new_bytes = captured[last_len..].as_bytes().to_vec();
                    last_len = captured.len();
                    let _ = tx.send(new_bytes);
                } else if captured.len() < last_len {
                    // Pane was cleared or scrolled past our watermark.
                    last_len = captured.len();
                }
            }
        })
    }

    pub fn subscribe_output(&self, session_id: &str) -> Result<broadcast::Receiver<Vec<u8>>> {
        self.handles
            .get(session_id)
            .map(|h| h.output_tx.subscribe())
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
    }

    /// Route viewer input as a multiplexer send-keys command, clearing any
    /// pending nudge since the human has now responded.
    pub async fn send_input(&self, session_id: &str, text: &str) -> Result<()> {
        let session = self
            .state
            .get_session(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        self.state.clear_session_nudge(session_id)?;
        self.mux.send_keys(&self.mux_opts, &session.multiplexer_window, text).await?;
        Ok(())
    }

    /// Resize the multiplexer window so the agent process sees the new
    /// size; viewer-side PTY resize is the caller's own concern.
    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> Result<()> {
        let session = self
            .state
            .get_session(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        self.mux.resize_window(&self.mux_opts, &session.multiplexer_window, cols, rows).await?;
        Ok(())
    }

    pub async fn capture(&self, session_id: &str, history_lines: u32) -> Result<String> {
        let session = self
            .state
            .get_session(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;
        Ok(self.mux.capture_output(&self.mux_opts, &session.multiplexer_window, history_lines).await?)
    }

    /// Kill the window, stop the watcher, and forget the session. Returns
    /// whether the owning workspace now has zero active sessions, so the
    /// caller can notify the compounder to stop watching it.
    pub async fn dispose(&self, session_id: &str) -> Result<bool> {
        let session = self
            .state
            .get_session(session_id)
            .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

        if let Some((_, handle)) = self.handles.remove(session_id) {
            handle.cancellation.cancel();
            let _ = handle.watcher_join.await;
            handle.relay_join.abort();
            handle.output_poll_join.abort();
        }

        self.mux.kill_window(&self.mux_opts, &session.multiplexer_window).await?;

        if let Some(workspace) = self.state.get_workspace(&session.workspace_id) {
            let dir = workspace.path.join(".schmux").join("signal");
            tokio::fs::remove_file(dir.join(session_id)).await.ok();
        }

        self.state.remove_session(session_id);
        self.compounder.release_watch(&session.workspace_id);
        Ok(!self.state.has_active_sessions(&session.workspace_id))
    }

    /// Set (or replace) a session's pending nudge, returning its new
    /// sequence number.
    pub fn nudge(&self, session_id: &str, text: impl Into<String>) -> Result<u64> {
        Ok(self.state.update_session_nudge(session_id, text)?)
    }

    /// Clear a session's pending nudge. Returns whether one was pending.
    pub fn clear_nudge(&self, session_id: &str) -> Result<bool> {
        Ok(self.state.clear_session_nudge(session_id)?)
    }

    /// Compute the divergence-focused commit graph for `workspace_id`
    /// relative to its repo's default branch.
    pub async fn get_commit_graph(&self, workspace_id: &str, opts: GraphOptions) -> Result<CommitGraph> {
        let workspace = self
            .state
            .get_workspace(workspace_id)
            .ok_or_else(|| Error::Core(schmux_core::Error::WorkspaceNotFound(workspace_id.to_string())))?;
        let ctx = CommandContext::new(&workspace.path, self.config.vcs_command_timeout());
        let default_branch = self.workspaces.default_branch(&workspace.path).await?;
        Ok(schmux_vcs::compute_commit_graph(
            &self.vcs,
            &ctx,
            &workspace.id,
            &workspace.branch,
            &default_branch,
            &opts,
        )
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schmux_core::Repo;
    use schmux_overlay::UnionMerger;

    #[test]
    fn agent_invocation_variants_are_constructible() {
        let _ = AgentInvocation::Prompt("hi".to_string());
        let _ = AgentInvocation::RawCommand("./run.sh".to_string());
        let _ = AgentInvocation::Resume;
    }

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed in {}", dir.display());
    }

    fn init_origin(dir: &std::path::Path) {
        std::fs::create_dir_all(dir).unwrap();
        git(dir, &["init", "-q", "-b", "main"]);
        git(dir, &["config", "user.email", "a@b.c"]);
        git(dir, &["config", "user.name", "Test"]);
        std::fs::write(dir.join("README.md"), b"hello\n").unwrap();
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", "init"]);
    }

    fn make_orchestrator(root: &std::path::Path, repo_url: &str) -> (Orchestrator, Config) {
        let config = Config {
            data_dir: root.join("data"),
            ..Config::default()
        };
        let config = Arc::new(config);
        let state = Arc::new(StateStore::new(root.join("state.json")));
        let repo = Repo {
            name: "demo".into(),
            url: repo_url.to_string(),
            wrapper_command: None,
            bare_path: None,
            overlay_paths: vec![],
        };
        let workspaces = Arc::new(WorkspaceManager::new(state.clone(), config.clone(), vec![repo]));
        let compounder = Arc::new(Compounder::new(config.clone(), state.clone(), Arc::new(UnionMerger)));
        let orchestrator = Orchestrator::new(state, workspaces, compounder, config.clone());
        (orchestrator, (*config).clone())
    }

    #[tokio::test]
    async fn get_commit_graph_reflects_unpushed_local_commit() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        init_origin(&origin_dir);

        let (orchestrator, _config) = make_orchestrator(root.path(), &origin_dir.to_string_lossy());
        let workspace = orchestrator
            .workspaces
            .get_or_create(&origin_dir.to_string_lossy(), "feature")
            .await
            .unwrap();

        std::fs::write(workspace.path.join("notes.txt"), b"wip\n").unwrap();
        git(&workspace.path, &["add", "-A"]);
        git(&workspace.path, &["commit", "-q", "-m", "wip commit"]);

        let graph = orchestrator
            .get_commit_graph(&workspace.id, GraphOptions::default())
            .await
            .unwrap();

        assert!(graph.nodes.iter().any(|n| n.subject.contains("wip commit")));
        assert!(graph.branches.contains_key("feature"));
    }

    #[tokio::test]
    async fn nudge_then_clear_round_trips_through_state() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        init_origin(&origin_dir);
        let (orchestrator, _config) = make_orchestrator(root.path(), &origin_dir.to_string_lossy());

        orchestrator.state.add_session(schmux_core::Session {
            id: "sess-1".into(),
            workspace_id: "ws-1".into(),
            target: AgentTarget::Claude,
            multiplexer_window: "schmux-sess-1".into(),
            created_at: chrono::Utc::now(),
            last_output_at: chrono::Utc::now(),
            last_signal_at: None,
            current_nudge: None,
            nudge_seq: 0,
            extra: serde_json::Map::new(),
        });

        let seq = orchestrator.nudge("sess-1", "needs_input waiting").unwrap();
        assert_eq!(seq, 1);
        let cleared = orchestrator.clear_nudge("sess-1").unwrap();
        assert!(cleared);
        assert!(orchestrator.state.get_session("sess-1").unwrap().current_nudge.is_none());
    }

    /// Full spawn/dispose lifecycle, including the per-workspace overlay
    /// watch refcounting. Requires a real `tmux` binary on `PATH`.
    #[tokio::test]
    #[ignore = "requires a real tmux binary on PATH"]
    async fn spawn_then_dispose_releases_the_overlay_watch() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        init_origin(&origin_dir);
        let (orchestrator, _config) = make_orchestrator(root.path(), &origin_dir.to_string_lossy());

        let session = orchestrator
            .spawn(SpawnRequest {
                repo_url: origin_dir.to_string_lossy().into_owned(),
                branch: "feature".to_string(),
                target: AgentTarget::Claude,
                workspace_id: None,
                invocation: AgentInvocation::RawCommand("sleep 30".to_string()),
            })
            .await
            .unwrap();

        assert!(orchestrator.compounder.locked_workspace_ids().contains(&session.workspace_id));

        let idle = orchestrator.dispose(&session.id).await.unwrap();
        assert!(idle);
        assert!(!orchestrator.compounder.locked_workspace_ids().contains(&session.workspace_id));
    }
}
