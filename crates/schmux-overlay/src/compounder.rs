//! The Compounding Engine: anti-echo suppression, per-file debounce, the
//! skip/fast-path/three-way-merge decision tree, propagation across sibling
//! workspaces, and startup reconciliation.
//!
//! The suppress set's `DashMap`-of-timestamps shape is grounded on
//! `dk-engine::workspace::event_bus::RepoEventBus`'s per-key lazy-channel
//! idiom; the decision tree itself has no teacher analogue and is built
//! directly from SPEC_FULL.md §4.6.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use schmux_core::{Config, StateStore};
use schmux_vcs::{CommandContext, VcsDriver};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::manifest::{hash_bytes, hash_file, looks_binary};
use crate::merger::{MergeOutcome, Merger};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Workspace file hash matched the manifest; nothing to do.
    Skipped,
    /// Overlay was untouched since the last sync; copied workspace -> overlay.
    FastPath,
    /// Both sides had changed; merged and propagated.
    Merged,
    /// Divergence could not be merged; last-write-wins fallback applied.
    FellBackLastWriteWins,
}

struct WatcherHandle {
    cancellation: CancellationToken,
    refcount: usize,
}

pub struct Compounder {
    config: Arc<Config>,
    state: Arc<StateStore>,
    merger: Arc<dyn Merger>,
    vcs: VcsDriver,
    suppress: DashMap<(String, String), Instant>,
    debounce_tokens: DashMap<(String, String), CancellationToken>,
    watchers: DashMap<String, WatcherHandle>,
}

impl Compounder {
    pub fn new(config: Arc<Config>, state: Arc<StateStore>, merger: Arc<dyn Merger>) -> Self {
        Self {
            config,
            state,
            merger,
            vcs: VcsDriver::new(),
            suppress: DashMap::new(),
            debounce_tokens: DashMap::new(),
            watchers: DashMap::new(),
        }
    }

    /// Workspace IDs currently held by an active per-workspace filesystem
    /// watch, so the git-status poll loop can skip them (the watcher already
    /// reacts to changes there faster than a poll would).
    pub fn locked_workspace_ids(&self) -> HashSet<String> {
        self.watchers.iter().map(|r| r.key().clone()).collect()
    }

    /// Register interest in watching `workspace_id`'s declared overlay
    /// paths, spawning the underlying `notify` watcher the first time and
    /// just bumping a refcount on subsequent callers (e.g. a second session
    /// on the same workspace).
    pub fn acquire_watch(
        self: &Arc<Self>,
        workspace_id: String,
        repo_name: String,
        workspace_path: PathBuf,
        declared_paths: Vec<String>,
    ) {
        if let Some(mut handle) = self.watchers.get_mut(&workspace_id) {
            handle.refcount += 1;
            return;
        }

        let cancellation = CancellationToken::new();
        self.watchers.insert(
            workspace_id.clone(),
            WatcherHandle {
                cancellation: cancellation.clone(),
                refcount: 1,
            },
        );

        let this = Arc::clone(self);
        let coalesce = self.config.overlay_debounce();
        tokio::task::spawn_blocking(move || {
            this.run_workspace_watch(workspace_id, repo_name, workspace_path, declared_paths, coalesce, cancellation)
        });
    }

    /// Release one reference on `workspace_id`'s watch; tears it down once
    /// the last session on that workspace disposes.
    pub fn release_watch(&self, workspace_id: &str) {
        let should_remove = match self.watchers.get_mut(workspace_id) {
            Some(mut handle) => {
                handle.refcount = handle.refcount.saturating_sub(1);
                handle.refcount == 0
            }
            None => false,
        };
        if should_remove {
            if let Some((_, handle)) = self.watchers.remove(workspace_id) {
                handle.cancellation.cancel();
            }
        }
    }

    fn run_workspace_watch(
        self: Arc<Self>,
        workspace_id: String,
        repo_name: String,
        workspace_path: PathBuf,
        declared_paths: Vec<String>,
        coalesce: Duration,
        cancellation: CancellationToken,
    ) {
        let declared: HashSet<PathBuf> = declared_paths.iter().map(|p| workspace_path.join(p)).collect();

        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<Event>();
        let watcher: Result<RecommendedWatcher> = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })
        .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string())));

        let mut watcher = match watcher {
            Ok(w) => w,
            Err(err) => {
                tracing::warn!(workspace = %workspace_id, error = %err, "failed to start overlay watcher");
                return;
            }
        };

        if let Err(err) = watcher.watch(&workspace_path, RecursiveMode::Recursive) {
            tracing::warn!(workspace = %workspace_id, error = %err, "failed to register overlay watch path");
            return;
        }

        loop {
            if cancellation.is_cancelled() {
                return;
            }
            match raw_rx.recv_timeout(coalesce) {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any) {
                        continue;
                    }
                    for path in &event.paths {
                        if let Some(relpath) = declared.contains(path).then(|| path.strip_prefix(&workspace_path).ok()).flatten() {
                            let relpath = relpath.to_string_lossy().to_string();
                            self.debounce_change(workspace_id.clone(), repo_name.clone(), relpath);
                        }
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
            }
        }
    }

    fn overlay_path(&self, repo_name: &str, relpath: &str) -> PathBuf {
        self.config.overlays_dir().join(repo_name).join(relpath)
    }

    /// Record that `(workspace_id, relpath)` was just written by the
    /// propagator, so the watcher that observes its own write doesn't
    /// re-trigger a merge cascade.
    pub fn mark_suppressed(&self, workspace_id: &str, relpath: &str) {
        self.suppress
            .insert((workspace_id.to_string(), relpath.to_string()), Instant::now());
    }

    pub fn is_suppressed(&self, workspace_id: &str, relpath: &str) -> bool {
        match self.suppress.get(&(workspace_id.to_string(), relpath.to_string())) {
            Some(entry) => entry.value().elapsed() < self.config.overlay_suppress_window(),
            None => false,
        }
    }

    /// Debounce a detected change: resets a 2s (configurable) quiet-period
    /// timer per `(workspace_id, relpath)`; only the last call within the
    /// window actually runs `sync_file`.
    pub fn debounce_change(self: &Arc<Self>, workspace_id: String, repo_name: String, relpath: String) {
        let key = (workspace_id.clone(), relpath.clone());
        let token = CancellationToken::new();
        if let Some(previous) = self.debounce_tokens.insert(key.clone(), token.clone()) {
            previous.cancel();
        }

        let this = Arc::clone(self);
        let debounce = self.config.overlay_debounce();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(debounce) => {
                    this.debounce_tokens.remove(&key);
                    if let Err(err) = this.sync_file(&workspace_id, &repo_name, &relpath).await {
                        tracing::warn!(workspace = %workspace_id, relpath = %relpath, error = %err, "overlay sync failed");
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// The skip/fast-path/merge decision tree for a single declared path in
    /// a single workspace, per SPEC_FULL.md §4.6.
    pub async fn sync_file(&self, workspace_id: &str, repo_name: &str, relpath: &str) -> Result<SyncOutcome> {
        if self.is_suppressed(workspace_id, relpath) {
            return Ok(SyncOutcome::Skipped);
        }

        let workspace = self
            .state
            .get_workspace(workspace_id)
            .ok_or_else(|| Error::Core(schmux_core::Error::WorkspaceNotFound(workspace_id.to_string())))?;

        let ctx = CommandContext::new(&workspace.path, self.config.vcs_command_timeout());
        if !self.vcs.is_ignored(&ctx, relpath).await.unwrap_or(false) {
            tracing::warn!(workspace = %workspace_id, relpath, "overlay path is not gitignored in workspace, skipping sync");
            return Ok(SyncOutcome::Skipped);
        }

        let ws_path = workspace.path.join(relpath);
        let overlay_path = self.overlay_path(repo_name, relpath);

        let ws_hash = hash_file(&ws_path).await?;
        let Some(ws_hash) = ws_hash else {
            return Ok(SyncOutcome::Skipped);
        };

        if workspace.overlay_manifest.matches(relpath, &ws_hash) {
            return Ok(SyncOutcome::Skipped);
        }

        let overlay_hash = hash_file(&overlay_path).await?;

        if overlay_hash.as_deref() == Some(ws_hash.as_str()) {
            // Shouldn't usually happen (manifest would have matched too),
            // but treat identical content as already in sync.
            self.record_manifest(workspace_id, relpath, &ws_hash)?;
            return Ok(SyncOutcome::Skipped);
        }

        let overlay_matches_manifest = match &overlay_hash {
            Some(h) => workspace.overlay_manifest.matches(relpath, h),
            None => workspace.overlay_manifest.get(relpath).is_none(),
        };

        if overlay_matches_manifest {
            // Fast path: overlay untouched since last sync, workspace
            // changed -> copy workspace's version into the overlay store.
            if let Some(parent) = overlay_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(&ws_path, &overlay_path).await?;
            self.record_manifest(workspace_id, relpath, &ws_hash)?;
            self.propagate(workspace_id, repo_name, relpath, &ws_hash).await?;
            return Ok(SyncOutcome::FastPath);
        }

        // Both sides diverged from the manifest: attempt a three-way merge.
        let ws_bytes = tokio::fs::read(&ws_path).await?;
        let overlay_bytes = match &overlay_hash {
            Some(_) => tokio::fs::read(&overlay_path).await?,
            None => Vec::new(),
        };

        let too_large = ws_bytes.len() as u64 > self.config.merge_max_bytes
            || overlay_bytes.len() as u64 > self.config.merge_max_bytes;
        let binary = looks_binary(&ws_bytes) || looks_binary(&overlay_bytes);

        if too_large || binary {
            return self.last_write_wins(workspace_id, repo_name, relpath, &ws_path, &overlay_path).await;
        }

        let outcome = tokio::time::timeout(
            self.config.merger_timeout(),
            self.merger.merge(&overlay_bytes, &ws_bytes),
        )
        .await;

        match outcome {
            Ok(MergeOutcome::Merged(merged)) => {
                if let Some(parent) = overlay_path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&overlay_path, &merged).await?;
                tokio::fs::write(&ws_path, &merged).await?;
                let hash = hash_bytes(&merged);
                self.record_manifest(workspace_id, relpath, &hash)?;
                self.mark_suppressed(workspace_id, relpath);
                self.propagate(workspace_id, repo_name, relpath, &hash).await?;
                Ok(SyncOutcome::Merged)
            }
            Ok(MergeOutcome::Conflict(reason)) => {
                tracing::warn!(relpath, reason, "merge conflict, falling back to last-write-wins");
                self.last_write_wins(workspace_id, repo_name, relpath, &ws_path, &overlay_path).await
            }
            Err(_) => {
                tracing::warn!(relpath, "merger timed out, falling back to last-write-wins");
                self.last_write_wins(workspace_id, repo_name, relpath, &ws_path, &overlay_path).await
            }
        }
    }

    async fn last_write_wins(
        &self,
        workspace_id: &str,
        repo_name: &str,
        relpath: &str,
        ws_path: &Path,
        overlay_path: &Path,
    ) -> Result<SyncOutcome> {
        let content = tokio::fs::read(ws_path).await?;
        if let Some(parent) = overlay_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(overlay_path, &content).await?;
        let hash = hash_bytes(&content);
        self.record_manifest(workspace_id, relpath, &hash)?;
        self.propagate(workspace_id, repo_name, relpath, &hash).await?;
        Ok(SyncOutcome::FellBackLastWriteWins)
    }

    fn record_manifest(&self, workspace_id: &str, relpath: &str, hash: &str) -> Result<()> {
        self.state.update_workspace(workspace_id, |w| {
            w.overlay_manifest.set(relpath, hash);
        })?;
        Ok(())
    }

    /// Copy the overlay's current content for `relpath` into every other
    /// live workspace of the same repo, marking each write suppressed and
    /// updating each target's manifest entry.
    async fn propagate(&self, source_workspace_id: &str, repo_name: &str, relpath: &str, new_hash: &str) -> Result<()> {
        let source = self
            .state
            .get_workspace(source_workspace_id)
            .ok_or_else(|| Error::Core(schmux_core::Error::WorkspaceNotFound(source_workspace_id.to_string())))?;
        let overlay_path = self.overlay_path(repo_name, relpath);
        let content = tokio::fs::read(&overlay_path).await?;

        for ws in self.state.workspaces_for_repo(&source.repo_url) {
            if ws.id == source_workspace_id || !ws.is_materialized() {
                continue;
            }
            let target_path = ws.path.join(relpath);
            if let Some(parent) = target_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            self.mark_suppressed(&ws.id, relpath);
            tokio::fs::write(&target_path, &content).await?;
            self.record_manifest(&ws.id, relpath, new_hash)?;
        }
        Ok(())
    }

    /// For every declared path of every workspace with active sessions,
    /// run the sync pipeline once. Catches changes that happened while the
    /// daemon was down.
    pub async fn reconcile_all(&self, declared_paths_by_repo: &HashMap<String, Vec<String>>) -> Result<()> {
        for ws in self.state.list_workspaces() {
            if !self.state.has_active_sessions(&ws.id) || !ws.is_materialized() {
                continue;
            }
            let Some(repo_name) = repo_name_for(&ws.repo_url, declared_paths_by_repo) else {
                continue;
            };
            let Some(paths) = declared_paths_by_repo.get(&repo_name) else {
                continue;
            };
            self.reconcile_workspace(&ws.id, &repo_name, paths).await;
        }
        Ok(())
    }

    /// Run the sync pipeline once for every declared path of a single
    /// workspace. Used both by `reconcile_all`'s startup sweep and by a
    /// disposal's final reconciliation pass.
    pub async fn reconcile_workspace(&self, workspace_id: &str, repo_name: &str, declared_paths: &[String]) {
        for relpath in declared_paths {
            if let Err(err) = self.sync_file(workspace_id, repo_name, relpath).await {
                tracing::warn!(workspace = %workspace_id, relpath, error = %err, "reconciliation sync failed");
            }
        }
    }
}

/// The repo name a workspace's URL maps to, looked up by matching against
/// the known declared-path config keys (which are keyed by repo name, not
/// URL). Real wiring resolves this via the repo registry; this helper keeps
/// the crate decoupled from `schmux-workspace`'s `Repo` type.
fn repo_name_for(repo_url: &str, declared_paths_by_repo: &HashMap<String, Vec<String>>) -> Option<String> {
    declared_paths_by_repo
        .keys()
        .find(|name| repo_url.contains(name.as_str()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merger::UnionMerger;
    use schmux_core::{OverlayManifest, Workspace};

    fn make_config(data_dir: &Path) -> Arc<Config> {
        Arc::new(Config {
            data_dir: data_dir.to_path_buf(),
            ..Config::default()
        })
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = std::process::Command::new("git")
            .args(args)
            .current_dir(dir)
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed in {}", dir.display());
    }

    /// Init `dir` as a git repo whose `.gitignore` covers `relpath`, the
    /// precondition `sync_file` now requires before touching a path.
    fn init_workspace_ignoring(dir: &Path, relpath: &str) {
        git(dir, &["init", "-q", "-b", "main"]);
        git(dir, &["config", "user.email", "a@b.c"]);
        git(dir, &["config", "user.name", "Test"]);
        std::fs::write(dir.join(".gitignore"), format!("{relpath}\n")).unwrap();
    }

    fn make_workspace(id: &str, repo_url: &str, path: &Path, manifest: OverlayManifest) -> Workspace {
        Workspace {
            id: id.to_string(),
            repo_url: repo_url.to_string(),
            branch: "feature".to_string(),
            path: path.to_path_buf(),
            remote_host_id: None,
            git_dirty: false,
            git_ahead: 0,
            git_behind: 0,
            git_files_changed: 0,
            lines_added: 0,
            lines_removed: 0,
            commits_synced_with_remote: true,
            overlay_manifest: manifest,
            extra: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn fast_path_copies_workspace_change_into_untouched_overlay() {
        let root = tempfile::tempdir().unwrap();
        let config = make_config(root.path());
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let compounder = Compounder::new(config.clone(), state.clone(), Arc::new(UnionMerger));

        let ws_dir = root.path().join("ws1");
        tokio::fs::create_dir_all(&ws_dir).await.unwrap();
        init_workspace_ignoring(&ws_dir, "settings.json");
        tokio::fs::write(ws_dir.join("settings.json"), br#"{"a":1}"#).await.unwrap();

        let overlay_dir = config.overlays_dir().join("demo");
        tokio::fs::create_dir_all(&overlay_dir).await.unwrap();
        tokio::fs::write(overlay_dir.join("settings.json"), br#"{"a":0}"#).await.unwrap();

        let mut manifest = OverlayManifest::default();
        manifest.set("settings.json", hash_bytes(br#"{"a":0}"#));
        state.add_workspace(make_workspace("ws1", "local:demo", &ws_dir, manifest));

        let outcome = compounder.sync_file("ws1", "demo", "settings.json").await.unwrap();
        assert_eq!(outcome, SyncOutcome::FastPath);

        let overlay_content = tokio::fs::read_to_string(overlay_dir.join("settings.json")).await.unwrap();
        assert_eq!(overlay_content, r#"{"a":1}"#);
    }

    #[tokio::test]
    async fn skip_when_workspace_hash_matches_manifest() {
        let root = tempfile::tempdir().unwrap();
        let config = make_config(root.path());
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let compounder = Compounder::new(config.clone(), state.clone(), Arc::new(UnionMerger));

        let ws_dir = root.path().join("ws1");
        tokio::fs::create_dir_all(&ws_dir).await.unwrap();
        init_workspace_ignoring(&ws_dir, "settings.json");
        tokio::fs::write(ws_dir.join("settings.json"), br#"{"a":1}"#).await.unwrap();

        let mut manifest = OverlayManifest::default();
        manifest.set("settings.json", hash_bytes(br#"{"a":1}"#));
        state.add_workspace(make_workspace("ws1", "local:demo", &ws_dir, manifest));

        let outcome = compounder.sync_file("ws1", "demo", "settings.json").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
    }

    #[tokio::test]
    async fn divergence_merges_and_propagates_to_sibling_workspace() {
        let root = tempfile::tempdir().unwrap();
        let config = make_config(root.path());
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let compounder = Compounder::new(config.clone(), state.clone(), Arc::new(UnionMerger));

        let ws1_dir = root.path().join("ws1");
        let ws2_dir = root.path().join("ws2");
        tokio::fs::create_dir_all(&ws1_dir).await.unwrap();
        tokio::fs::create_dir_all(&ws2_dir).await.unwrap();
        init_workspace_ignoring(&ws1_dir, "settings.json");
        init_workspace_ignoring(&ws2_dir, "settings.json");
        tokio::fs::write(ws1_dir.join("settings.json"), br#"{"a":1}"#).await.unwrap();
        tokio::fs::write(ws2_dir.join("settings.json"), br#"{"b":0}"#).await.unwrap();

        let overlay_dir = config.overlays_dir().join("demo");
        tokio::fs::create_dir_all(&overlay_dir).await.unwrap();
        tokio::fs::write(overlay_dir.join("settings.json"), br#"{"c":9}"#).await.unwrap();

        let mut manifest = OverlayManifest::default();
        manifest.set("settings.json", hash_bytes(br#"{"orig":true}"#));
        state.add_workspace(make_workspace("ws1", "local:demo", &ws1_dir, manifest.clone()));
        state.add_workspace(make_workspace("ws2", "local:demo", &ws2_dir, manifest));

        let outcome = compounder.sync_file("ws1", "demo", "settings.json").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Merged);

        let ws2_content = tokio::fs::read_to_string(ws2_dir.join("settings.json")).await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&ws2_content).unwrap();
        assert_eq!(value["a"], 1);
        assert_eq!(value["c"], 9);

        assert!(compounder.is_suppressed("ws2", "settings.json"));
    }

    #[tokio::test]
    async fn sync_file_skips_path_not_covered_by_gitignore() {
        let root = tempfile::tempdir().unwrap();
        let config = make_config(root.path());
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let compounder = Compounder::new(config.clone(), state.clone(), Arc::new(UnionMerger));

        let ws_dir = root.path().join("ws1");
        tokio::fs::create_dir_all(&ws_dir).await.unwrap();
        git(&ws_dir, &["init", "-q", "-b", "main"]);
        git(&ws_dir, &["config", "user.email", "a@b.c"]);
        git(&ws_dir, &["config", "user.name", "Test"]);
        // No .gitignore entry for settings.json: it is a tracked-looking path.
        tokio::fs::write(ws_dir.join("settings.json"), br#"{"a":1}"#).await.unwrap();

        let mut manifest = OverlayManifest::default();
        manifest.set("settings.json", hash_bytes(br#"{"a":0}"#));
        state.add_workspace(make_workspace("ws1", "local:demo", &ws_dir, manifest));

        let outcome = compounder.sync_file("ws1", "demo", "settings.json").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
    }

    #[tokio::test]
    async fn acquire_and_release_watch_tracks_refcount() {
        let root = tempfile::tempdir().unwrap();
        let config = make_config(root.path());
        let state = Arc::new(StateStore::new(root.path().join("state.json")));
        let compounder = Arc::new(Compounder::new(config.clone(), state.clone(), Arc::new(UnionMerger)));

        let ws_dir = root.path().join("ws1");
        tokio::fs::create_dir_all(&ws_dir).await.unwrap();

        compounder.acquire_watch("ws1".to_string(), "demo".to_string(), ws_dir.clone(), vec!["settings.json".to_string()]);
        assert!(compounder.locked_workspace_ids().contains("ws1"));

        compounder.acquire_watch("ws1".to_string(), "demo".to_string(), ws_dir.clone(), vec!["settings.json".to_string()]);
        compounder.release_watch("ws1");
        assert!(compounder.locked_workspace_ids().contains("ws1"), "refcount should still be 1");

        compounder.release_watch("ws1");
        assert!(!compounder.locked_workspace_ids().contains("ws1"));
    }
}
