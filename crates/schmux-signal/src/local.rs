//! Local filesystem-watch variant of the Signal Watcher.
//!
//! One `tokio::task` per session, backed by a blocking `notify` watcher on
//! the status file's *parent* directory (the file itself may not exist yet
//! when the watch is registered). Coalesces bursts within a short window,
//! matching the intent of `dk-engine::workspace::event_bus::RepoEventBus`'s
//! lossy-broadcast handling, applied here to filesystem events instead of
//! in-process ones.

use std::path::PathBuf;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::signal::{parse_status_line, AgentSignal};

/// Start watching `status_file` for this session. Returns a
/// `JoinHandle` the caller should await (or abort) on disposal; cancelling
/// `cancellation` stops the watcher and ends the task.
pub fn watch_local(
    session_id: String,
    status_file: PathBuf,
    coalesce: Duration,
    tx: mpsc::Sender<AgentSignal>,
    cancellation: CancellationToken,
) -> tokio::task::JoinHandle<Result<()>> {
    tokio::task::spawn_blocking(move || run_watch_loop(session_id, status_file, coalesce, tx, cancellation))
}

fn run_watch_loop(
    session_id: String,
    status_file: PathBuf,
    coalesce: Duration,
    tx: mpsc::Sender<AgentSignal>,
    cancellation: CancellationToken,
) -> Result<()> {
    let parent = status_file
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&parent)?;

    let (raw_tx, raw_rx) = std::sync::mpsc::channel::<Event>();
    let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        if let Ok(event) = res {
            let _ = raw_tx.send(event);
        }
    })
    .map_err(|e| Error::WatcherSetup(e.to_string()))?;

    watcher
        .watch(&parent, RecursiveMode::NonRecursive)
        .map_err(|e| Error::WatcherSetup(e.to_string()))?;

    let mut last_content: Option<String> = None;
    let mut pending = false;

    loop {
        if cancellation.is_cancelled() {
            return Ok(());
        }

        match raw_rx.recv_timeout(coalesce) {
            Ok(event) => {
                if event_touches(&event, &status_file) {
                    pending = true;
                }
                // Drain any further events already queued within the
                // coalescing window before acting.
                while let Ok(more) = raw_rx.try_recv() {
                    if event_touches(&more, &status_file) {
                        pending = true;
                    }
                }
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return Ok(()),
        }

        if pending {
            pending = false;
            if let Ok(content) = std::fs::read_to_string(&status_file) {
                if last_content.as_deref() != Some(content.as_str()) {
                    last_content = Some(content.clone());
                    if let Some(signal) = parse_status_line(&session_id, &content) {
                        if tx.blocking_send(signal).is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

fn event_touches(event: &Event, status_file: &std::path::Path) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
    ) && event.paths.iter().any(|p| p == status_file)
}
