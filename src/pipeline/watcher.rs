//! Directory watcher.
//!
//! Watches a single directory (non-recursive) and emits one [`FileEvent`]
//! per file that finishes writing (close-after-write) or is moved into the
//! directory, provided its basename matches a configured glob. Events keep
//! kernel order; nothing is deduplicated — a file re-entering the directory
//! produces a new event.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use glob::Pattern;
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use notify::{RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;

/// Backoff after a transient error from the event source.
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// How often the bridge loop re-checks the stop/cancel flags.
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watch directory does not exist: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("invalid watch pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A detected file.
#[derive(Debug, Clone)]
pub struct FileEvent {
    /// Absolute path of the detected file.
    pub path: PathBuf,

    /// Size in bytes at detection time.
    pub size: u64,

    /// Wall-clock detection time.
    pub timestamp: DateTime<Local>,
}

/// Inotify-backed directory watcher.
pub struct DirWatcher;

impl DirWatcher {
    /// Start watching `dir` for files matching `patterns`. An empty pattern
    /// list matches every file.
    ///
    /// Returns the ordered event stream and a handle that stops the watcher.
    /// The stream completes exactly once: when the handle is stopped or the
    /// cancel token fires.
    pub fn watch(
        cancel: CancelToken,
        dir: &Path,
        patterns: &[String],
    ) -> Result<(mpsc::Receiver<FileEvent>, WatchHandle), WatcherError> {
        if !dir.is_dir() {
            return Err(WatcherError::DirectoryNotFound(dir.to_path_buf()));
        }

        let compiled = compile_patterns(patterns)?;

        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let (event_tx, event_rx) = mpsc::channel::<FileEvent>(100);
        let stop = Arc::new(AtomicBool::new(false));

        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::spawn(move || {
            // Owns the watcher so the kernel watch lives as long as the loop.
            let _watcher = watcher;
            bridge_events(raw_rx, event_tx, compiled, thread_stop, cancel);
        });

        Ok((event_rx, WatchHandle { stop, thread: Some(thread) }))
    }
}

/// Handle controlling a running watcher.
pub struct WatchHandle {
    stop: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl WatchHandle {
    /// Stop the watcher and wait for the event stream to complete.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, WatcherError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p).map_err(|source| WatcherError::Pattern {
                pattern: p.clone(),
                source,
            })
        })
        .collect()
}

/// Forward kernel events into the typed stream until stopped or cancelled.
fn bridge_events(
    raw_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    event_tx: mpsc::Sender<FileEvent>,
    patterns: Vec<Pattern>,
    stop: Arc<AtomicBool>,
    cancel: CancelToken,
) {
    loop {
        if stop.load(Ordering::SeqCst) || cancel.is_cancelled() {
            return;
        }

        match raw_rx.recv_timeout(POLL_TIMEOUT) {
            Ok(Ok(event)) => {
                for path in arrival_paths(&event) {
                    if !matches_patterns(&path, &patterns) {
                        continue;
                    }

                    let Ok(meta) = std::fs::metadata(&path) else {
                        continue;
                    };
                    if !meta.is_file() {
                        continue;
                    }

                    let file_event = FileEvent {
                        path,
                        size: meta.len(),
                        timestamp: Local::now(),
                    };
                    if event_tx.blocking_send(file_event).is_err() {
                        // Consumer went away; nothing left to deliver to.
                        return;
                    }
                }
            }
            Ok(Err(e)) => {
                tracing::warn!("watch event error: {e}");
                std::thread::sleep(ERROR_BACKOFF);
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
        }
    }
}

/// Paths newly available in the directory for this kernel event:
/// close-after-write and move-into-directory only.
fn arrival_paths(event: &notify::Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Access(AccessKind::Close(AccessMode::Write)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths.clone(),
        // A paired rename reports [from, to]; only the destination arrived.
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            event.paths.last().cloned().into_iter().collect()
        }
        _ => Vec::new(),
    }
}

fn matches_patterns(path: &Path, patterns: &[Pattern]) -> bool {
    if patterns.is_empty() {
        return true;
    }

    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    patterns.iter().any(|p| p.matches(name))
}
