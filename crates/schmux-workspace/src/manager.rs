//! The Workspace Manager: `GetOrCreate`/`prepare`/`Dispose`, branch
//! uniquification, and per-repo serialization.
//!
//! Per-repo locking is grounded directly on `dk-engine::repo::Engine`'s
//! `repo_locks: DashMap<RepoId, Arc<RwLock<()>>>` field — the same lazily
//! created, per-key lock idiom, keyed here by repo URL instead of a
//! database-assigned `RepoId`. The workspace catalog itself delegates
//! entirely to `schmux_core::StateStore`, following
//! `dk-engine::workspace::session_manager::WorkspaceManager`'s style of
//! returning owned clones from every getter.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use schmux_core::{Config, OverlayManifest, Repo, StateStore, Workspace};
use schmux_vcs::{CommandContext, VcsDriver};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

pub struct WorkspaceManager {
    state: Arc<StateStore>,
    vcs: VcsDriver,
    config: Arc<Config>,
    repos: DashMap<String, Repo>,
    repo_locks: DashMap<String, Arc<RwLock<()>>>,
}

impl WorkspaceManager {
    pub fn new(state: Arc<StateStore>, config: Arc<Config>, repos: Vec<Repo>) -> Self {
        let map = DashMap::new();
        for repo in repos {
            map.insert(repo.url.clone(), repo);
        }
        Self {
            state,
            vcs: VcsDriver::new(),
            config,
            repos: map,
            repo_locks: DashMap::new(),
        }
    }

    fn lock_for(&self, repo_url: &str) -> Arc<RwLock<()>> {
        self.repo_locks
            .entry(repo_url.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .value()
            .clone()
    }

    pub fn repo(&self, repo_url: &str) -> Result<Repo> {
        self.repos
            .get(repo_url)
            .map(|r| r.value().clone())
            .ok_or_else(|| Error::RepoNotFound(repo_url.to_string()))
    }

    /// Resolve the repo's default branch from `cwd`'s `origin/HEAD`,
    /// the same ref `get_or_create`'s ancestor check already relies on.
    pub async fn default_branch(&self, cwd: &std::path::Path) -> Result<String> {
        let ctx = self.ctx(cwd);
        Ok(self.vcs.default_branch(&ctx).await?)
    }

    fn ctx(&self, cwd: &std::path::Path) -> CommandContext {
        CommandContext::new(cwd, self.config.vcs_command_timeout())
    }

    /// Resolve or create a workspace for `(repo_url, branch)`, serialized
    /// per repo URL so concurrent requests cannot race on branch creation.
    pub async fn get_or_create(&self, repo_url: &str, branch: &str) -> Result<Workspace> {
        let lock = self.lock_for(repo_url);
        let _guard = lock.write().await;

        if repo_url.starts_with("local:") {
            return self.create_new(repo_url, branch).await;
        }

        if let Some(existing) = self
            .state
            .workspaces_for_repo(repo_url)
            .into_iter()
            .find(|w| w.branch == branch && !self.state.has_active_sessions(&w.id) && w.is_materialized())
        {
            self.prepare_locked(&existing.id, branch).await?;
            return self
                .state
                .get_workspace(&existing.id)
                .ok_or_else(|| Error::WorkspaceNotFound(existing.id.clone()));
        }

        // Reuse a workspace of the same repo that's caught up with the
        // default branch, to avoid allocating new worktrees unnecessarily.
        let reusable = self
            .state
            .workspaces_for_repo(repo_url)
            .into_iter()
            .filter(|w| !self.state.has_active_sessions(&w.id) && w.is_materialized())
            .find(|w| w.commits_synced_with_remote);

        if let Some(ws) = reusable {
            let ctx = self.ctx(&ws.path);
            if self.vcs.is_ancestor(&ctx, "HEAD", "origin/HEAD").await.unwrap_or(true) {
                self.prepare_locked(&ws.id, branch).await?;
                return self
                    .state
                    .get_workspace(&ws.id)
                    .ok_or_else(|| Error::WorkspaceNotFound(ws.id.clone()));
            }
        }

        self.create_new(repo_url, branch).await
    }

    async fn create_new(&self, repo_url: &str, requested_branch: &str) -> Result<Workspace> {
        let repo = self.repo(repo_url)?;
        let id = self.allocate_workspace_id(&repo.name);
        let dest = self.config.worktrees_dir().join(&id);

        let base_dir = self.ensure_base_repo(&repo).await?;
        let base_ctx = self.ctx(&base_dir);
        self.vcs.fetch(&base_ctx).await.ok();

        let branch = self.unique_branch_name(&base_dir, requested_branch).await?;

        tokio::fs::create_dir_all(dest.parent().unwrap_or(&dest)).await?;
        let start_point = format!("origin/{}", self.default_branch(&base_dir).await?);
        self.vcs
            .worktree_add(&base_ctx, &dest, &branch, &start_point)
            .await?;

        let mut overlay_manifest = OverlayManifest::default();
        self.copy_overlay_defaults(&repo, &dest, &mut overlay_manifest).await?;

        let workspace = Workspace {
            id: id.clone(),
            repo_url: repo_url.to_string(),
            branch,
            path: dest,
            remote_host_id: None,
            git_dirty: false,
            git_ahead: 0,
            git_behind: 0,
            git_files_changed: 0,
            lines_added: 0,
            lines_removed: 0,
            commits_synced_with_remote: true,
            overlay_manifest,
            extra: serde_json::Map::new(),
        };
        self.state.add_workspace(workspace.clone());
        Ok(workspace)
    }

    fn allocate_workspace_id(&self, repo_name: &str) -> String {
        let existing = self.state.list_workspaces();
        let mut n = 1u32;
        loop {
            let candidate = format!("{repo_name}-{n:03}");
            if !existing.iter().any(|w| w.id == candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    async fn ensure_base_repo(&self, repo: &Repo) -> Result<PathBuf> {
        let base_dir = repo
            .bare_path
            .clone()
            .unwrap_or_else(|| self.config.worktrees_dir().join(format!("_bases/{}.git", repo.name)));

        if !base_dir.exists() {
            tokio::fs::create_dir_all(base_dir.parent().unwrap_or(&base_dir)).await?;
            let ctx = self.ctx(base_dir.parent().unwrap_or(&base_dir));
            self.vcs.clone_repo(&ctx, &repo.url, &base_dir).await?;
        }
        Ok(base_dir)
    }

    /// If `requested` already names an existing local branch, suffix it with
    /// a short random token until the name is free. The branch actually
    /// used is what the caller must record — never silently substitute
    /// without surfacing the final name.
    async fn unique_branch_name(&self, base_dir: &std::path::Path, requested: &str) -> Result<String> {
        let ctx = self.ctx(base_dir);
        let mut candidate = requested.to_string();
        let mut attempts = 0;
        while self.vcs.local_branch_exists(&ctx, &candidate).await? {
            attempts += 1;
            let suffix: String = {
                let mut rng = rand::thread_rng();
                (0..5).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect::<String>().to_lowercase()
            };
            candidate = format!("{requested}-{suffix}");
            if attempts > 100 {
                return Err(Error::Core(schmux_core::Error::Internal(
                    "exhausted branch uniquification attempts".into(),
                )));
            }
        }
        Ok(candidate)
    }

    /// Declared overlay paths for the repo behind `repo_url`, the same set
    /// `copy_overlay_defaults` and the Compounder's per-workspace watch
    /// both sync.
    pub fn declared_overlay_paths(&self, repo_url: &str) -> Result<Vec<String>> {
        Ok(declared_paths(&self.repo(repo_url)?))
    }

    /// Only a path the workspace's own `.gitignore` would ignore is ever
    /// copied in — checked here at the initial-copy boundary, and again at
    /// the Compounder's runtime sync boundary.
    async fn copy_overlay_defaults(
        &self,
        repo: &Repo,
        dest: &std::path::Path,
        manifest: &mut OverlayManifest,
    ) -> Result<()> {
        let overlay_dir = self.config.overlays_dir().join(&repo.name);
        if !overlay_dir.exists() {
            return Ok(());
        }
        let ctx = self.ctx(dest);
        for relpath in declared_paths(repo) {
            let src = overlay_dir.join(&relpath);
            if !src.exists() {
                continue;
            }
            if !self.vcs.is_ignored(&ctx, &relpath).await.unwrap_or(false) {
                tracing::warn!(repo = %repo.name, relpath = %relpath, "overlay path is not gitignored in workspace, skipping copy");
                continue;
            }
            let dst = dest.join(&relpath);
            if let Some(parent) = dst.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&src, &dst).await?;
            let content = tokio::fs::read(&dst).await?;
            let hash = sha256_hex(&content);
            manifest.set(relpath, hash);
        }
        Ok(())
    }

    /// Refresh a workspace onto `branch`: fetch, discard local changes,
    /// clean untracked, checkout (resetting to the remote branch if it
    /// exists), and pull --rebase against the explicit remote branch.
    /// Refuses when the workspace has active sessions.
    pub async fn prepare(&self, workspace_id: &str, branch: &str) -> Result<()> {
        let lock = {
            let ws = self
                .state
                .get_workspace(workspace_id)
                .ok_or_else(|| Error::WorkspaceNotFound(workspace_id.to_string()))?;
            self.lock_for(&ws.repo_url)
        };
        let _guard = lock.write().await;
        self.prepare_locked(workspace_id, branch).await
    }

    async fn prepare_locked(&self, workspace_id: &str, branch: &str) -> Result<()> {
        if self.state.has_active_sessions(workspace_id) {
            return Err(Error::ActiveSessions(workspace_id.to_string()));
        }
        let ws = self
            .state
            .get_workspace(workspace_id)
            .ok_or_else(|| Error::WorkspaceNotFound(workspace_id.to_string()))?;
        let ctx = self.ctx(&ws.path);

        self.vcs.fetch(&ctx).await.ok();
        let remote_exists = self.vcs.remote_branch_exists(&ctx, branch).await?;

        self.vcs.checkout_discard_all(&ctx).await?;
        self.vcs.clean_untracked(&ctx).await?;

        let reset_to = if remote_exists {
            Some(format!("origin/{branch}"))
        } else {
            None
        };
        self.vcs.checkout_branch(&ctx, branch, reset_to.as_deref()).await?;

        if remote_exists {
            self.vcs.pull_rebase(&ctx, branch).await?;
        }

        self.state.update_workspace(workspace_id, |w| {
            w.branch = branch.to_string();
        })?;
        Ok(())
    }

    /// Remove a workspace's worktree. A workspace is unsafe to dispose if it
    /// has tracked modifications, untracked non-ignored files, or commits
    /// ahead of the remote that aren't mirrored there.
    pub async fn dispose(&self, workspace_id: &str) -> Result<()> {
        if self.state.has_active_sessions(workspace_id) {
            return Err(Error::ActiveSessions(workspace_id.to_string()));
        }
        let ws = self
            .state
            .get_workspace(workspace_id)
            .ok_or_else(|| Error::WorkspaceNotFound(workspace_id.to_string()))?;

        if ws.is_materialized() {
            let ctx = self.ctx(&ws.path);
            let mut reasons = Vec::new();

            if self.vcs.has_tracked_changes(&ctx).await.unwrap_or(true) {
                reasons.push("tracked files modified".to_string());
            }
            let untracked = self.vcs.untracked_files(&ctx).await.unwrap_or_default();
            if !untracked.is_empty() {
                reasons.push(format!("{} untracked file(s)", untracked.len()));
            }
            let remote_branch = format!("origin/{}", ws.branch);
            if self.vcs.remote_branch_exists(&ctx, &ws.branch).await.unwrap_or(false) {
                if !self
                    .vcs
                    .is_ancestor(&ctx, "HEAD", &remote_branch)
                    .await
                    .unwrap_or(false)
                {
                    reasons.push("local commits not pushed to remote".to_string());
                }
            } else {
                // No remote branch at all: only safe if there's nothing
                // committed beyond the default branch either.
                if self
                    .vcs
                    .rev_list_count(&ctx, "origin/HEAD..HEAD")
                    .await
                    .unwrap_or(1)
                    > 0
                {
                    reasons.push("branch never pushed".to_string());
                }
            }

            if !reasons.is_empty() {
                return Err(Error::UnsafeDispose { reasons });
            }

            let lock = self.lock_for(&ws.repo_url);
            let _guard = lock.write().await;
            let base_ctx = self.ctx(ws.path.parent().unwrap_or(&ws.path));
            self.vcs.worktree_remove(&ctx, &ws.path).await.ok();
            self.vcs.worktree_prune(&base_ctx).await.ok();
        }

        self.state.remove_workspace(workspace_id);
        Ok(())
    }

    /// Periodic git-status refresh for every materialized workspace.
    /// Skips any workspace with active sessions intentionally held by a
    /// caller (e.g. the overlay compounder) — callers pass the set of
    /// currently-locked workspace IDs to exclude.
    pub async fn poll_git_status_once(&self, skip: &std::collections::HashSet<String>) {
        for ws in self.state.list_workspaces() {
            if skip.contains(&ws.id) || !ws.is_materialized() {
                continue;
            }
            if let Err(err) = self.refresh_git_status(&ws.id).await {
                tracing::warn!(workspace = %ws.id, error = %err, "git status refresh failed");
            }
        }
    }

    async fn refresh_git_status(&self, workspace_id: &str) -> Result<()> {
        let ws = self
            .state
            .get_workspace(workspace_id)
            .ok_or_else(|| Error::WorkspaceNotFound(workspace_id.to_string()))?;
        let ctx = self.ctx(&ws.path);

        let dirty = self.vcs.has_tracked_changes(&ctx).await.unwrap_or(false);
        let diff = self.vcs.diff_numstat(&ctx, "HEAD").await.unwrap_or_default();
        let ahead = self
            .vcs
            .rev_list_count(&ctx, &format!("origin/{}..HEAD", ws.branch))
            .await
            .unwrap_or(0);
        let behind = self
            .vcs
            .rev_list_count(&ctx, &format!("HEAD..origin/{}", ws.branch))
            .await
            .unwrap_or(0);
        let synced = self.vcs.remote_branch_exists(&ctx, &ws.branch).await.unwrap_or(false) && behind == 0;

        self.state.update_workspace(workspace_id, |w| {
            w.git_dirty = dirty;
            w.git_files_changed = diff.files_changed;
            w.lines_added = diff.lines_added;
            w.lines_removed = diff.lines_removed;
            w.git_ahead = ahead;
            w.git_behind = behind;
            w.commits_synced_with_remote = synced;
        })?;
        Ok(())
    }

    /// Spawn the background polling loop; runs until cancelled.
    pub async fn run_poll_loop(self: Arc<Self>, interval: Duration, skip_provider: impl Fn() -> std::collections::HashSet<String> + Send + Sync + 'static) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let skip = skip_provider();
            self.poll_git_status_once(&skip).await;
        }
    }
}

/// Declared overlay paths: repo-specific entries plus the hardcoded
/// defaults every workspace carries.
fn declared_paths(repo: &Repo) -> Vec<String> {
    let mut paths = vec![".claude/settings.json".to_string(), ".claude/settings.local.json".to_string()];
    paths.extend(repo.overlay_paths.iter().cloned());
    paths.sort();
    paths.dedup();
    paths
}

fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    format!("{:x}", Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;

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
        std::fs::write(dir.join(".gitignore"), b".claude/\n").unwrap();
        std::fs::write(dir.join("README.md"), b"hello\n").unwrap();
        git(dir, &["add", "-A"]);
        git(dir, &["commit", "-q", "-m", "init"]);
    }

    #[tokio::test]
    async fn get_or_create_materializes_workspace_with_gitignored_overlay() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        init_origin(&origin_dir);

        let config = Arc::new(Config {
            data_dir: root.path().join("data"),
            ..Config::default()
        });
        let overlay_dir = config.overlays_dir().join("demo");
        tokio::fs::create_dir_all(&overlay_dir).await.unwrap();
        tokio::fs::create_dir_all(overlay_dir.join(".claude")).await.unwrap();
        tokio::fs::write(overlay_dir.join(".claude/settings.json"), br#"{"model":"default"}"#)
            .await
            .unwrap();

        let repo = Repo {
            name: "demo".into(),
            url: origin_dir.to_string_lossy().into_owned(),
            wrapper_command: None,
            bare_path: None,
            overlay_paths: vec![],
        };
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let manager = WorkspaceManager::new(state.clone(), config.clone(), vec![repo.clone()]);

        let ws = manager.get_or_create(&repo.url, "feature").await.unwrap();
        assert_eq!(ws.branch, "feature");
        assert!(ws.path.join(".claude/settings.json").exists());
        let copied = tokio::fs::read_to_string(ws.path.join(".claude/settings.json")).await.unwrap();
        assert_eq!(copied, r#"{"model":"default"}"#);
        assert!(ws.overlay_manifest.get(".claude/settings.json").is_some());
    }

    #[tokio::test]
    async fn copy_overlay_defaults_skips_paths_not_covered_by_gitignore() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        // No .gitignore at all: nothing declared should ever be copied.
        std::fs::create_dir_all(&origin_dir).unwrap();
        git(&origin_dir, &["init", "-q", "-b", "main"]);
        git(&origin_dir, &["config", "user.email", "a@b.c"]);
        git(&origin_dir, &["config", "user.name", "Test"]);
        std::fs::write(origin_dir.join("README.md"), b"hello\n").unwrap();
        git(&origin_dir, &["add", "-A"]);
        git(&origin_dir, &["commit", "-q", "-m", "init"]);

        let config = Arc::new(Config {
            data_dir: root.path().join("data"),
            ..Config::default()
        });
        let overlay_dir = config.overlays_dir().join("demo");
        tokio::fs::create_dir_all(overlay_dir.join(".claude")).await.unwrap();
        tokio::fs::write(overlay_dir.join(".claude/settings.json"), b"{}").await.unwrap();

        let repo = Repo {
            name: "demo".into(),
            url: origin_dir.to_string_lossy().into_owned(),
            wrapper_command: None,
            bare_path: None,
            overlay_paths: vec![],
        };
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let manager = WorkspaceManager::new(state.clone(), config.clone(), vec![repo.clone()]);

        let ws = manager.get_or_create(&repo.url, "feature").await.unwrap();
        assert!(!ws.path.join(".claude/settings.json").exists());
        assert!(ws.overlay_manifest.get(".claude/settings.json").is_none());
    }

    #[tokio::test]
    async fn dispose_refuses_when_untracked_non_ignored_file_present() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        init_origin(&origin_dir);

        let config = Arc::new(Config {
            data_dir: root.path().join("data"),
            ..Config::default()
        });
        let repo = Repo {
            name: "demo".into(),
            url: origin_dir.to_string_lossy().into_owned(),
            wrapper_command: None,
            bare_path: None,
            overlay_paths: vec![],
        };
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let manager = WorkspaceManager::new(state.clone(), config.clone(), vec![repo.clone()]);

        let ws = manager.get_or_create(&repo.url, "feature").await.unwrap();
        tokio::fs::write(ws.path.join("scratch.txt"), b"not ignored").await.unwrap();

        let result = manager.dispose(&ws.id).await;
        match result {
            Err(Error::UnsafeDispose { reasons }) => {
                assert!(reasons.iter().any(|r| r.contains("untracked")));
            }
            other => panic!("expected UnsafeDispose, got {other:?}"),
        }
        assert!(ws.path.exists());
    }

    /// Scenario: a second `Spawn` for a branch name already live on another
    /// workspace gets a short, lowercase-alnum suffixed name instead of
    /// colliding, and the suffixed name is what actually ends up checked out.
    #[tokio::test]
    async fn get_or_create_uniquifies_a_colliding_branch_name() {
        let root = tempfile::tempdir().unwrap();
        let origin_dir = root.path().join("origin");
        init_origin(&origin_dir);

        let config = Arc::new(Config {
            data_dir: root.path().join("data"),
            ..Config::default()
        });
        let repo = Repo {
            name: "demo".into(),
            url: origin_dir.to_string_lossy().into_owned(),
            wrapper_command: None,
            bare_path: None,
            overlay_paths: vec![],
        };
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let manager = WorkspaceManager::new(state.clone(), config.clone(), vec![repo.clone()]);

        let first = manager.get_or_create(&repo.url, "feature-a").await.unwrap();
        assert_eq!(first.branch, "feature-a");

        // An active session on `first` keeps it ineligible for reuse, so the
        // second request must allocate a brand-new workspace instead.
        state.add_session(schmux_core::Session {
            id: "sess-1".into(),
            workspace_id: first.id.clone(),
            target: schmux_core::AgentTarget::Claude,
            multiplexer_window: "schmux-sess-1".into(),
            created_at: chrono::Utc::now(),
            last_output_at: chrono::Utc::now(),
            last_signal_at: None,
            current_nudge: None,
            nudge_seq: 0,
            extra: serde_json::Map::new(),
        });

        let second = manager.get_or_create(&repo.url, "feature-a").await.unwrap();
        assert_ne!(second.id, first.id);
        assert_ne!(second.branch, "feature-a");
        assert!(second.branch.starts_with("feature-a-"));
        let suffix = second.branch.strip_prefix("feature-a-").unwrap();
        assert!(suffix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));

        let checked_out = String::from_utf8(
            std::process::Command::new("git")
                .args(["rev-parse", "--abbrev-ref", "HEAD"])
                .current_dir(&second.path)
                .output()
                .unwrap()
                .stdout,
        )
        .unwrap();
        assert_eq!(checked_out.trim(), second.branch);
    }

    /// Boundary: uniquification must still terminate with 100 colliding
    /// requests for the same base branch name, each yielding a distinct,
    /// lowercase-alnum-suffixed candidate.
    #[tokio::test]
    async fn unique_branch_name_survives_100_collisions() {
        let root = tempfile::tempdir().unwrap();
        let base_dir = root.path().join("base");
        init_origin(&base_dir);

        let config = Arc::new(Config {
            data_dir: root.path().join("data"),
            ..Config::default()
        });
        let repo = Repo {
            name: "demo".into(),
            url: base_dir.to_string_lossy().into_owned(),
            wrapper_command: None,
            bare_path: None,
            overlay_paths: vec![],
        };
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let manager = WorkspaceManager::new(state, config, vec![repo]);

        git(&base_dir, &["branch", "feature-a"]);

        let mut seen = std::collections::HashSet::new();
        seen.insert("feature-a".to_string());
        for _ in 0..100 {
            let candidate = manager.unique_branch_name(&base_dir, "feature-a").await.unwrap();
            assert!(seen.insert(candidate.clone()), "branch name reused: {candidate}");
            git(&base_dir, &["branch", &candidate]);
        }
    }

    #[test]
    fn declared_paths_includes_repo_specific_entries() {
        let repo = Repo {
            name: "demo".into(),
            url: "https://example.com/demo.git".into(),
            wrapper_command: None,
            bare_path: None,
            overlay_paths: vec![".env.local".into()],
        };
        let paths = declared_paths(&repo);
        assert!(paths.contains(&".claude/settings.json".to_string()));
        assert!(paths.contains(&".env.local".to_string()));
    }
}
