//! The composition root. Mirrors `dk_engine::repo::Engine`'s role: one
//! struct owning every long-lived collaborator, with background loops
//! spawned alongside it rather than hidden inside a transport layer.
//!
//! Exposes the Command Surface from SPEC_FULL.md §6 as a plain async API —
//! no CLI argument parsing and no HTTP/WebSocket transport front it, both
//! being explicit non-goal collaborators here.

use std::collections::HashMap;
use std::sync::Arc;

use schmux_core::{CommitGraph, Config, Repo, Session, StateStore, Workspace};
use schmux_overlay::{Compounder, UnionMerger};
use schmux_session::{AgentInvocation, Orchestrator, SpawnRequest};
use schmux_vcs::GraphOptions;
use schmux_workspace::WorkspaceManager;

pub struct Daemon {
    pub config: Arc<Config>,
    pub state: Arc<StateStore>,
    pub workspaces: Arc<WorkspaceManager>,
    pub orchestrator: Arc<Orchestrator>,
    pub compounder: Arc<Compounder>,
}

impl Daemon {
    pub async fn bootstrap(config: Config) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        tokio::fs::create_dir_all(&config.data_dir).await?;
        tokio::fs::create_dir_all(config.overlays_dir()).await?;
        tokio::fs::create_dir_all(config.worktrees_dir()).await?;

        let state = Arc::new(StateStore::load(config.state_file()).await?);
        let workspaces = Arc::new(WorkspaceManager::new(
            Arc::clone(&state),
            Arc::clone(&config),
            config.repos.clone(),
        ));
        let compounder = Arc::new(Compounder::new(
            Arc::clone(&config),
            Arc::clone(&state),
            Arc::new(UnionMerger),
        ));
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&state),
            Arc::clone(&workspaces),
            Arc::clone(&compounder),
            Arc::clone(&config),
        ));

        Ok(Self {
            config,
            state,
            workspaces,
            orchestrator,
            compounder,
        })
    }

    /// Spawn the background tasks that keep the daemon self-consistent:
    /// periodic state persistence, periodic git-status polling, and the
    /// overlay reconciliation sweep. Returns immediately; tasks run until
    /// the process exits.
    pub fn spawn_background_tasks(&self) {
        tokio::spawn(Arc::clone(&self.state).run_save_loop());

        let workspaces = Arc::clone(&self.workspaces);
        let poll_interval = self.config.git_status_poll_interval();
        let compounder_for_poll = Arc::clone(&self.compounder);
        tokio::spawn(workspaces.run_poll_loop(poll_interval, move || compounder_for_poll.locked_workspace_ids()));

        let compounder = Arc::clone(&self.compounder);
        let declared_paths = self.declared_paths_by_repo();
        let reconcile_interval = self.config.overlay_debounce();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(reconcile_interval.max(std::time::Duration::from_secs(1)));
            loop {
                ticker.tick().await;
                if let Err(err) = compounder.reconcile_all(&declared_paths).await {
                    tracing::warn!(error = %err, "overlay reconciliation sweep failed");
                }
            }
        });
    }

    fn declared_paths_by_repo(&self) -> HashMap<String, Vec<String>> {
        let mut map = HashMap::new();
        for repo in &self.config.repos {
            let mut paths = vec![".claude/settings.json".to_string(), ".claude/settings.local.json".to_string()];
            paths.extend(repo.overlay_paths.iter().cloned());
            paths.sort();
            paths.dedup();
            map.insert(repo.name.clone(), paths);
        }
        map
    }

    pub async fn spawn_session(
        &self,
        repo_url: String,
        branch: String,
        target: schmux_core::AgentTarget,
        invocation: AgentInvocation,
    ) -> schmux_session::Result<Session> {
        self.orchestrator
            .spawn(SpawnRequest {
                repo_url,
                branch,
                target,
                workspace_id: None,
                invocation,
            })
            .await
    }

    pub async fn dispose_session(&self, session_id: &str) -> schmux_session::Result<()> {
        let session = self
            .state
            .get_session(session_id)
            .ok_or_else(|| schmux_session::Error::SessionNotFound(session_id.to_string()))?;
        let workspace_now_idle = self.orchestrator.dispose(session_id).await?;
        if workspace_now_idle {
            tracing::info!(session = session_id, "last session on workspace disposed");
            self.reconcile_idle_workspace(&session.workspace_id).await;
        }
        Ok(())
    }

    /// Final reconciliation pass for a workspace that just went idle, per
    /// SPEC_FULL.md §4.3's disposal sequence.
    async fn reconcile_idle_workspace(&self, workspace_id: &str) {
        let Some(workspace) = self.state.get_workspace(workspace_id) else {
            return;
        };
        let Some(repo_name) = self
            .config
            .repos
            .iter()
            .find(|r| r.url == workspace.repo_url)
            .map(|r| r.name.clone())
        else {
            return;
        };
        if let Some(paths) = self.declared_paths_by_repo().get(&repo_name) {
            self.compounder.reconcile_workspace(workspace_id, &repo_name, paths).await;
        }
    }

    pub fn list_workspaces(&self) -> Vec<Workspace> {
        self.state.list_workspaces()
    }

    pub fn repos(&self) -> Vec<Repo> {
        self.config.repos.clone()
    }

    pub async fn send_input(&self, session_id: &str, text: &str) -> schmux_session::Result<()> {
        self.orchestrator.send_input(session_id, text).await
    }

    pub async fn resize(&self, session_id: &str, cols: u16, rows: u16) -> schmux_session::Result<()> {
        self.orchestrator.resize(session_id, cols, rows).await
    }

    pub async fn capture_output(&self, session_id: &str, history_lines: u32) -> schmux_session::Result<String> {
        self.orchestrator.capture(session_id, history_lines).await
    }

    pub fn nudge(&self, session_id: &str, text: impl Into<String>) -> schmux_session::Result<u64> {
        self.orchestrator.nudge(session_id, text)
    }

    pub fn clear_nudge(&self, session_id: &str) -> schmux_session::Result<bool> {
        self.orchestrator.clear_nudge(session_id)
    }

    pub async fn get_commit_graph(&self, workspace_id: &str, opts: GraphOptions) -> schmux_session::Result<CommitGraph> {
        self.orchestrator.get_commit_graph(workspace_id, opts).await
    }
}
