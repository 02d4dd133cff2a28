//! Local folder watching.
//!
//! Watches one directory (non-recursive) for export files being written.
//! A per-path debounce timer restarts on every event, so a file written in
//! chunks surfaces exactly once, after it has been quiet for the stability
//! window. Paths currently being processed sit in an in-flight set and are
//! ignored until their [`StableFile`] is dropped.

use anyhow::{ensure, Context, Result};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::sources::{is_allowed, mime_for_path, SourceContent, SourceFile};

/// A path that survived the stability window. Holding the value keeps the
/// path in the in-flight set; dropping it releases the path for future
/// events.
pub struct StableFile {
    pub path: PathBuf,
    _guard: InFlightGuard,
}

struct InFlightGuard {
    shared: Arc<WatchShared>,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut state) = self.shared.state.lock() {
            state.in_flight.remove(&self.path);
        }
    }
}

#[derive(Default)]
struct WatchState {
    timers: HashMap<PathBuf, JoinHandle<()>>,
    in_flight: HashSet<PathBuf>,
}

struct WatchShared {
    tx: mpsc::UnboundedSender<StableFile>,
    // One mutex covers both maps so timer expiry and new events cannot
    // interleave between them.
    state: Mutex<WatchState>,
    window: Duration,
    runtime: tokio::runtime::Handle,
}

impl WatchShared {
    /// Called for every relevant notify event. Restarts the debounce timer
    /// for the path unless it is currently being processed.
    fn note_event(self: &Arc<Self>, path: PathBuf) {
        if !is_watchable(&path) {
            return;
        }
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if state.in_flight.contains(&path) {
            debug!("{:?} changed while in flight, ignoring", path);
            return;
        }
        if let Some(timer) = state.timers.remove(&path) {
            timer.abort();
        }
        let shared = self.clone();
        let timer_path = path.clone();
        let handle = self.runtime.spawn(async move {
            tokio::time::sleep(shared.window).await;
            shared.emit_stable(timer_path);
        });
        state.timers.insert(path, handle);
    }

    /// Timer expiry: the path has been quiet for a full window.
    fn emit_stable(self: &Arc<Self>, path: PathBuf) {
        let stable = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            state.timers.remove(&path);
            if state.in_flight.contains(&path) {
                return;
            }
            // The file may have been deleted or replaced by a directory
            // while the timer ran
            if !path.is_file() {
                return;
            }
            state.in_flight.insert(path.clone());
            StableFile {
                path: path.clone(),
                _guard: InFlightGuard {
                    shared: self.clone(),
                    path,
                },
            }
        };
        // A closed receiver just means shutdown; the guard drop cleans up
        let _ = self.tx.send(stable);
    }
}

/// Watches a directory and emits stabilized files on a channel.
pub struct FolderWatcher {
    shared: Arc<WatchShared>,
    watcher: RecommendedWatcher,
    root: PathBuf,
}

impl FolderWatcher {
    /// Start watching. Must be called from within a tokio runtime. Fails
    /// when the path does not exist.
    pub fn start(
        root: &Path,
        window: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<StableFile>)> {
        ensure!(
            root.is_dir(),
            "watch path {:?} does not exist or is not a directory",
            root
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(WatchShared {
            tx,
            state: Mutex::new(WatchState::default()),
            window,
            runtime: tokio::runtime::Handle::current(),
        });

        let event_shared = shared.clone();
        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| match res {
                Ok(event) => {
                    if !relevant_kind(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        event_shared.note_event(path);
                    }
                }
                Err(e) => warn!("filesystem watch error: {}", e),
            })
            .context("failed to create filesystem watcher")?;
        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {:?}", root))?;

        info!("watching {:?} (stability window {:?})", root, window);
        Ok((
            Self {
                shared,
                watcher,
                root: root.to_path_buf(),
            },
            rx,
        ))
    }

    /// Release the notify subscription and drop pending debounce timers.
    /// Files already emitted keep processing to completion.
    pub fn stop(mut self) {
        let _ = self.watcher.unwatch(&self.root);
        if let Ok(mut state) = self.shared.state.lock() {
            for (_, timer) in state.timers.drain() {
                timer.abort();
            }
        }
        info!("stopped watching {:?}", self.root);
    }
}

fn relevant_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn is_watchable(path: &Path) -> bool {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => is_allowed(name, None),
        None => false,
    }
}

/// Build the [`SourceFile`] for a stabilized path. Identity is the path
/// relative to the watch root; the revision is the file's mtime, so a
/// rewritten export imports again while an untouched one dedups.
pub fn source_file_for(root: &Path, path: &Path) -> Result<SourceFile> {
    let meta = std::fs::metadata(path)
        .with_context(|| format!("failed to stat {:?}", path))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("non-UTF8 file name: {:?}", path))?
        .to_string();
    let relative = path.strip_prefix(root).unwrap_or(path);
    let modified_ms = meta
        .modified()?
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);

    Ok(SourceFile {
        provider: "local".to_string(),
        source_file_id: relative.to_string_lossy().to_string(),
        mime_type: mime_for_path(path),
        size: meta.len(),
        revision: modified_ms.to_string(),
        source_metadata: Some(json!({
            "absolute_path": path.to_string_lossy(),
            "modified_at": modified_ms,
        })),
        content: SourceContent::LocalPath(path.to_path_buf()),
        name,
    })
}
