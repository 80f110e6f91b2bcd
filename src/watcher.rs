//! Watches the workspace for Earthfile changes and forwards them to the
//! server as `workspace/didChangeWatchedFiles`.

use std::path::PathBuf;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tower_lsp::lsp_types::{FileChangeType, FileEvent, Url};
use tracing::{debug, warn};

use crate::client::options::ClientOptions;
use crate::client::session::{ClientHandle, SessionState};
use crate::error::ClientError;

/// A recursive workspace subscription. Dropping it tears the subscription
/// down along with the forwarding task.
pub struct WorkspaceWatcher {
    _watcher: RecommendedWatcher,
    forward_task: JoinHandle<()>,
}

impl WorkspaceWatcher {
    pub fn spawn(
        root: PathBuf,
        options: ClientOptions,
        handle: ClientHandle,
    ) -> Result<Self, ClientError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            match result {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(e) => warn!("workspace watcher error: {e}"),
            }
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), glob = %options.watch_glob, "watching workspace");

        let forward_task = tokio::spawn(async move {
            // Events observed before Running are stale (the server scans the
            // workspace during initialize) and get discarded. The biased
            // select stops the discarding in the same poll that observes the
            // transition, so an event raised once Running is set is never
            // lost to the drain.
            let mut state = handle.subscribe();
            loop {
                match handle.state() {
                    SessionState::Running => break,
                    SessionState::Stopped => return,
                    SessionState::Inactive | SessionState::Starting => {}
                }
                tokio::select! {
                    biased;
                    changed = state.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                    stale = rx.recv() => {
                        if stale.is_none() {
                            return;
                        }
                    }
                }
            }

            while let Some(event) = rx.recv().await {
                let changes = file_events(&options, &event);
                if changes.is_empty() {
                    continue;
                }
                debug!(count = changes.len(), "forwarding Earthfile changes");
                if handle.did_change_watched_files(changes).is_err() {
                    break;
                }
            }
        });

        Ok(Self { _watcher: watcher, forward_task })
    }
}

impl Drop for WorkspaceWatcher {
    fn drop(&mut self) {
        self.forward_task.abort();
    }
}

/// Translate a notify event into LSP file events, keeping watched paths only.
fn file_events(options: &ClientOptions, event: &Event) -> Vec<FileEvent> {
    let Some(change) = change_type(&event.kind) else {
        return Vec::new();
    };
    event
        .paths
        .iter()
        .filter(|path| options.watches(path))
        .filter_map(|path| Url::from_file_path(path).ok())
        .map(|uri| FileEvent::new(uri, change))
        .collect()
}

/// Create/modify/remove are the only change classes the subscription covers.
fn change_type(kind: &EventKind) -> Option<FileChangeType> {
    match kind {
        EventKind::Create(_) => Some(FileChangeType::CREATED),
        EventKind::Modify(_) => Some(FileChangeType::CHANGED),
        EventKind::Remove(_) => Some(FileChangeType::DELETED),
        _ => None,
    }
}
