//! The in-memory workspace/session catalog, with atomic JSON snapshotting.
//!
//! Mirrors `WorkspaceManager`'s `DashMap`-backed catalog: every getter
//! returns an owned clone so no caller can hold a guard across an `.await`,
//! and every mutator goes through a narrow, named method rather than handing
//! out mutable references to the collections themselves.

use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use crate::error::{Error, Result};
use crate::types::{OverlayManifest, Session, SessionId, Workspace, WorkspaceId};

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    #[serde(default)]
    workspaces: Vec<Workspace>,
    #[serde(default)]
    sessions: Vec<Session>,
}

/// The single mutable, long-lived singleton in the daemon.
///
/// Reads never block on writes and vice versa (`DashMap` shards
/// internally); `save()` takes an internal consistent snapshot and persists
/// it via temp-write-then-rename, so a crash mid-write can never leave a
/// half-written state file on disk.
pub struct StateStore {
    workspaces: DashMap<WorkspaceId, Workspace>,
    sessions: DashMap<SessionId, Session>,
    state_path: PathBuf,
    save_notify: Notify,
}

impl StateStore {
    pub fn new(state_path: impl Into<PathBuf>) -> Self {
        Self {
            workspaces: DashMap::new(),
            sessions: DashMap::new(),
            state_path: state_path.into(),
            save_notify: Notify::new(),
        }
    }

    /// Load an existing snapshot from disk, or start empty if none exists.
    pub async fn load(state_path: impl Into<PathBuf>) -> Result<Self> {
        let state_path = state_path.into();
        let store = Self::new(state_path.clone());
        if tokio::fs::try_exists(&state_path).await.unwrap_or(false) {
            let raw = tokio::fs::read(&state_path).await?;
            let snapshot: Snapshot = serde_json::from_slice(&raw)?;
            for ws in snapshot.workspaces {
                store.workspaces.insert(ws.id.clone(), ws);
            }
            for s in snapshot.sessions {
                store.sessions.insert(s.id.clone(), s);
            }
        }
        Ok(store)
    }

    // ── Workspace operations ────────────────────────────────────────

    pub fn get_workspace(&self, id: &str) -> Option<Workspace> {
        self.workspaces.get(id).map(|r| r.value().clone())
    }

    pub fn list_workspaces(&self) -> Vec<Workspace> {
        self.workspaces.iter().map(|r| r.value().clone()).collect()
    }

    pub fn workspaces_for_repo(&self, repo_url: &str) -> Vec<Workspace> {
        self.workspaces
            .iter()
            .filter(|r| r.value().repo_url == repo_url)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn add_workspace(&self, workspace: Workspace) {
        self.workspaces.insert(workspace.id.clone(), workspace);
        self.save_notify.notify_one();
    }

    pub fn update_workspace<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Workspace),
    {
        let mut entry = self
            .workspaces
            .get_mut(id)
            .ok_or_else(|| Error::WorkspaceNotFound(id.to_string()))?;
        f(entry.value_mut());
        drop(entry);
        self.save_notify.notify_one();
        Ok(())
    }

    pub fn update_overlay_manifest(&self, id: &str, manifest: OverlayManifest) -> Result<()> {
        self.update_workspace(id, |ws| ws.overlay_manifest = manifest)
    }

    pub fn remove_workspace(&self, id: &str) -> Option<Workspace> {
        let removed = self.workspaces.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.save_notify.notify_one();
        }
        removed
    }

    // ── Session operations ──────────────────────────────────────────

    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.sessions.get(id).map(|r| r.value().clone())
    }

    pub fn list_sessions(&self) -> Vec<Session> {
        self.sessions.iter().map(|r| r.value().clone()).collect()
    }

    pub fn sessions_for_workspace(&self, workspace_id: &str) -> Vec<Session> {
        self.sessions
            .iter()
            .filter(|r| r.value().workspace_id == workspace_id)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn has_active_sessions(&self, workspace_id: &str) -> bool {
        self.sessions
            .iter()
            .any(|r| r.value().workspace_id == workspace_id)
    }

    pub fn add_session(&self, session: Session) {
        self.sessions.insert(session.id.clone(), session);
        self.save_notify.notify_one();
    }

    pub fn remove_session(&self, id: &str) -> Option<Session> {
        let removed = self.sessions.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.save_notify.notify_one();
        }
        removed
    }

    pub fn update_session_last_output(&self, id: &str, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        entry.value_mut().last_output_at = at;
        drop(entry);
        self.save_notify.notify_one();
        Ok(())
    }

    /// Overwrite the session's nudge and bump its sequence number. Returns
    /// the new sequence number.
    pub fn update_session_nudge(&self, id: &str, text: impl Into<String>) -> Result<u64> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        let session = entry.value_mut();
        session.current_nudge = Some(text.into());
        session.nudge_seq += 1;
        session.last_signal_at = Some(chrono::Utc::now());
        self.save_notify.notify_one();
        Ok(session.nudge_seq)
    }

    /// Clear a pending nudge (e.g. the operator sent input). Returns `true`
    /// if there was a nudge to clear.
    pub fn clear_session_nudge(&self, id: &str) -> Result<bool> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| Error::SessionNotFound(id.to_string()))?;
        let session = entry.value_mut();
        let had_one = session.current_nudge.take().is_some();
        if had_one {
            session.nudge_seq += 1;
        }
        Ok(had_one)
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Atomically persist the current snapshot: write to a temp file in the
    /// same directory, then rename over the target — never leaves a
    /// partially-written state file.
    pub async fn save(&self) -> Result<()> {
        let snapshot = Snapshot {
            workspaces: self.list_workspaces(),
            sessions: self.list_sessions(),
        };
        let body = serde_json::to_vec_pretty(&snapshot)?;

        if let Some(parent) = self.state_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp_path = tmp_path_for(&self.state_path);
        tokio::fs::write(&tmp_path, &body).await?;
        tokio::fs::rename(&tmp_path, &self.state_path).await?;
        Ok(())
    }

    /// Run a background task that saves whenever `notify_one` fires,
    /// coalescing bursts of mutations into a single write.
    pub async fn run_save_loop(self: std::sync::Arc<Self>) {
        loop {
            self.save_notify.notified().await;
            // Drain any additional notifications queued while we were
            // about to save, so rapid mutation bursts become one write.
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            if let Err(err) = self.save().await {
                tracing::warn!(error = %err, "failed to persist state snapshot");
            }
        }
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
