// src/watch/backend.rs

//! The OS-level watch primitive.
//!
//! The watcher only needs three things from it: open a subscription on a
//! set of paths, extend that subscription in place, and close it. Change
//! notifications arrive on a Tokio channel as plain paths.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak, mpsc as std_mpsc};
use std::thread;
use std::time::Duration;

use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::Result;

/// Receiving side of a backend's change stream.
pub type ChangeReceiver = mpsc::UnboundedReceiver<PathBuf>;

/// Opens watch subscriptions.
pub trait WatchBackend: Send + Sync {
    /// Start watching `paths` and return the handle plus the stream of
    /// changed paths.
    fn open(&self, paths: &[PathBuf]) -> Result<(Box<dyn WatchHandle>, ChangeReceiver)>;
}

/// A live subscription.
pub trait WatchHandle: Send {
    /// Add `paths` to the running subscription without restarting it.
    fn add(&mut self, paths: &[PathBuf]) -> Result<()>;

    /// Stop watching. Must tolerate being called more than once.
    fn close(&mut self) -> Result<()>;

    /// Paths currently subscribed through this handle.
    fn watched(&self) -> Vec<PathBuf>;
}

const REWATCH_ATTEMPTS: usize = 10;
const REWATCH_DELAY: Duration = Duration::from_millis(50);

type SharedWatcher = Arc<Mutex<Option<RecommendedWatcher>>>;
type FileEntries = Arc<Mutex<HashSet<PathBuf>>>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Backend built on `notify::RecommendedWatcher`.
///
/// Directories are watched recursively, files on their own. Content
/// modifications, file creations and rename targets are forwarded, so
/// editors that save by renaming a temp file over the original are seen.
/// Removals and metadata-only events are not.
///
/// A file watched on its own loses its OS watch when an atomic save
/// replaces its inode. A helper thread re-watches such entries and reports
/// them as changed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifyBackend;

impl WatchBackend for NotifyBackend {
    fn open(&self, paths: &[PathBuf]) -> Result<(Box<dyn WatchHandle>, ChangeReceiver)> {
        // Channel from the blocking notify callback into the async world.
        let (event_tx, event_rx) = mpsc::unbounded_channel::<PathBuf>();
        // `watch` cannot be called from inside the notify callback (it waits
        // on the thread running the callback), so replaced files are queued.
        let (rewatch_tx, rewatch_rx) = std_mpsc::channel::<PathBuf>();
        let files: FileEntries = Arc::default();

        let callback_files = Arc::clone(&files);
        let callback_tx = event_tx.clone();
        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if loses_file_watch(&event.kind) {
                        let files = lock(&callback_files);
                        for path in event.paths.iter().filter(|p| files.contains(*p)) {
                            // Only fails once the helper thread is gone.
                            let _ = rewatch_tx.send(path.clone());
                        }
                    }
                    if !is_content_change(&event.kind) {
                        return;
                    }
                    for path in event.paths {
                        if callback_tx.send(path).is_err() {
                            // Receiver dropped: the session is gone.
                            return;
                        }
                    }
                }
                Err(err) => {
                    warn!(error = %err, "file watch error");
                }
            },
            Config::default(),
        )?;

        let shared: SharedWatcher = Arc::new(Mutex::new(Some(watcher)));
        let weak = Arc::downgrade(&shared);
        thread::Builder::new()
            .name("devwatch-rewatch".to_string())
            .spawn(move || rewatch_loop(rewatch_rx, weak, event_tx))?;

        let mut handle = NotifyHandle {
            inner: shared,
            files,
            watched: Vec::new(),
            seen: HashSet::new(),
        };
        handle.add(paths)?;

        info!(paths = paths.len(), "file watcher started");
        Ok((Box::new(handle), event_rx))
    }
}

fn is_content_change(kind: &EventKind) -> bool {
    // `Name(Both)` always follows a `Name(To)` for the same target.
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any))
            | EventKind::Create(CreateKind::File | CreateKind::Any)
    )
}

/// Events after which a file watched on its own may no longer be watched.
fn loses_file_watch(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    )
}

/// Re-watch replaced file entries until the watcher is closed.
///
/// The replacement may land a moment after the removal event, so each path
/// is retried for a short while. A successful re-watch counts as a change.
fn rewatch_loop(
    rx: std_mpsc::Receiver<PathBuf>,
    watcher: Weak<Mutex<Option<RecommendedWatcher>>>,
    events: mpsc::UnboundedSender<PathBuf>,
) {
    while let Ok(path) = rx.recv() {
        let mut rewatched = false;
        for _ in 0..REWATCH_ATTEMPTS {
            let Some(shared) = watcher.upgrade() else {
                return;
            };
            {
                let mut guard = lock(&shared);
                let Some(w) = guard.as_mut() else {
                    return;
                };
                if path.is_file() {
                    // The stale watch is usually gone already.
                    let _ = w.unwatch(&path);
                    match w.watch(&path, RecursiveMode::NonRecursive) {
                        Ok(()) => rewatched = true,
                        Err(err) => debug!(path = ?path, error = %err, "re-watch failed"),
                    }
                }
            }
            if rewatched {
                break;
            }
            thread::sleep(REWATCH_DELAY);
        }

        if rewatched {
            debug!(path = ?path, "re-watched replaced file");
            if events.send(path).is_err() {
                return;
            }
        } else {
            debug!(path = ?path, "watched file did not come back");
        }
    }
}

struct NotifyHandle {
    inner: SharedWatcher,
    files: FileEntries,
    watched: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
}

impl fmt::Debug for NotifyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyHandle")
            .field("open", &lock(&self.inner).is_some())
            .field("watched", &self.watched)
            .finish()
    }
}

fn recursive_mode(path: &Path) -> RecursiveMode {
    if path.is_dir() {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    }
}

impl WatchHandle for NotifyHandle {
    fn add(&mut self, paths: &[PathBuf]) -> Result<()> {
        let mut guard = lock(&self.inner);
        let Some(watcher) = guard.as_mut() else {
            debug!(?paths, "ignoring add on closed watch handle");
            return Ok(());
        };

        for path in paths {
            if self.seen.contains(path) {
                continue;
            }
            let mode = recursive_mode(path);
            watcher.watch(path, mode)?;
            debug!(path = ?path, "watching path");
            if mode == RecursiveMode::NonRecursive {
                lock(&self.files).insert(path.clone());
            }
            self.seen.insert(path.clone());
            self.watched.push(path.clone());
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // Dropping the watcher drops its callback, which ends the re-watch
        // thread.
        let Some(mut watcher) = lock(&self.inner).take() else {
            return Ok(());
        };

        for path in &self.watched {
            // The path may already be gone; dropping the watcher releases
            // whatever is left anyway.
            if let Err(err) = watcher.unwatch(path) {
                debug!(path = ?path, error = %err, "unwatch failed");
            }
        }
        self.watched.clear();
        self.seen.clear();
        lock(&self.files).clear();
        info!("file watcher closed");
        Ok(())
    }

    fn watched(&self) -> Vec<PathBuf> {
        self.watched.clone()
    }
}
