// src/watch/watcher.rs

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use globset::GlobSet;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::engine::{BuildEngine, WatchMode};
use crate::errors::{DevwatchError, Result};
use crate::fs::FileSystem;
use crate::types::{LifecycleState, UpdateResult};
use crate::watch::absorber::absorb_update_result;
use crate::watch::backend::{ChangeReceiver, WatchBackend, WatchHandle};
use crate::watch::collector::collect_extra_paths;
use crate::watch::dispatcher::dispatch_change;
use crate::watch::path_utils::{normalize_path, relative_str};
use crate::watch::registry::WatchSet;

/// Everything a running session owns.
pub(crate) struct ActiveSession {
    pub(crate) mode: WatchMode,
    pub(crate) watched: WatchSet,
    pub(crate) handle: Box<dyn WatchHandle>,
    loop_task: Option<JoinHandle<()>>,
}

/// Lifecycle of one [`FileWatcher`].
///
/// `Pending -> Active -> Closed`, or `Pending -> Closed`. Closing moves the
/// owned resources out and drops them.
pub(crate) enum Session {
    Pending { mode: WatchMode },
    Active(ActiveSession),
    Closed,
}

/// State shared between the watcher, its event loop, in-flight dispatches
/// and the live-update callback.
pub(crate) struct WatcherInner {
    pub(crate) root: PathBuf,
    pub(crate) fs: Arc<dyn FileSystem>,
    pub(crate) ignored: GlobSet,
    pub(crate) in_flight: AtomicUsize,
    session: Mutex<Session>,
}

impl WatcherInner {
    /// The session lock is never held across an `.await`.
    pub(crate) fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_closed(&self) -> bool {
        matches!(*self.lock_session(), Session::Closed)
    }

    /// Mode of the running session, or `None` if not started / closed.
    pub(crate) fn active_mode(&self) -> Option<WatchMode> {
        match &*self.lock_session() {
            Session::Active(active) => Some(active.mode.clone()),
            _ => None,
        }
    }

    /// Build engine plus a copy of the watch set, so the engine can be
    /// queried without holding the lock. `None` once closed.
    fn collection_view(&self) -> Option<(Arc<dyn BuildEngine>, WatchSet)> {
        match &*self.lock_session() {
            Session::Pending { mode } => Some((Arc::clone(mode.build_engine()), WatchSet::new())),
            Session::Active(active) => Some((
                Arc::clone(active.mode.build_engine()),
                active.watched.clone(),
            )),
            Session::Closed => None,
        }
    }

    fn is_ignored(&self, path: &Path) -> bool {
        if self.ignored.is_empty() {
            return false;
        }
        let candidate = relative_str(&self.root, path)
            .unwrap_or_else(|| path.to_string_lossy().replace('\\', "/"));
        self.ignored.is_match(&candidate)
    }
}

/// Watches a project root plus whatever out-of-root paths the build engine
/// depends on, and routes changes to the live-update engine or to an
/// incremental rebuild.
///
/// Dropping the watcher closes it.
pub struct FileWatcher {
    inner: Arc<WatcherInner>,
    backend: Arc<dyn WatchBackend>,
}

impl fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &self.inner.root)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// `root` is normalized; a relative root is resolved against the
    /// current working directory.
    pub fn new(
        root: impl AsRef<Path>,
        mode: WatchMode,
        backend: Arc<dyn WatchBackend>,
        fs: Arc<dyn FileSystem>,
    ) -> Self {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
        let root = normalize_path(root.as_ref(), &cwd);

        Self {
            inner: Arc::new(WatcherInner {
                root,
                fs,
                ignored: GlobSet::empty(),
                in_flight: AtomicUsize::new(0),
                session: Mutex::new(Session::Pending { mode }),
            }),
            backend,
        }
    }

    /// Drop change events whose root-relative path matches `ignored`.
    ///
    /// Only effective before [`start`](Self::start).
    pub fn with_ignored(mut self, ignored: GlobSet) -> Self {
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.ignored = ignored;
        } else {
            warn!("ignored globs set after the watcher was shared; ignoring");
        }
        self
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    pub fn state(&self) -> LifecycleState {
        if self.inner.is_closed() {
            LifecycleState::Closed
        } else {
            LifecycleState::Active
        }
    }

    /// Number of change dispatches currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Open the backend on `root` plus the engine's extra paths and start
    /// dispatching changes.
    ///
    /// Fails with [`DevwatchError::AlreadyStarted`] on a second call and with
    /// [`DevwatchError::Closed`] after [`close`](Self::close).
    pub async fn start(&self) -> Result<()> {
        let mode = match &*self.inner.lock_session() {
            Session::Pending { mode } => mode.clone(),
            Session::Active(_) => return Err(DevwatchError::AlreadyStarted),
            Session::Closed => return Err(DevwatchError::Closed),
        };

        let root = self.inner.root.clone();
        let mut watched = WatchSet::new();
        watched.add_if_absent(root.clone());
        let extra = collect_extra_paths(
            mode.build_engine().as_ref(),
            &root,
            &watched,
            self.inner.fs.as_ref(),
        );
        for path in extra {
            // Two collected entries may cover each other.
            if !watched.is_covered(&path) {
                watched.add_if_absent(path);
            }
        }

        let (mut handle, rx) = self.backend.open(&watched.snapshot())?;
        let watched_count = watched.len();

        {
            let mut session = self.inner.lock_session();
            if !matches!(*session, Session::Pending { .. }) {
                let err = match *session {
                    Session::Active(_) => DevwatchError::AlreadyStarted,
                    _ => DevwatchError::Closed,
                };
                drop(session);
                if let Err(close_err) = handle.close() {
                    warn!(error = %close_err, "failed to close watch handle");
                }
                return Err(err);
            }
            *session = Session::Active(ActiveSession {
                mode: mode.clone(),
                watched,
                handle,
                loop_task: None,
            });
        }

        let task = tokio::spawn(run_event_loop(Arc::clone(&self.inner), rx));
        match &mut *self.inner.lock_session() {
            Session::Active(active) => active.loop_task = Some(task),
            _ => task.abort(),
        }

        if let Some(live) = mode.live_engine() {
            let weak: Weak<WatcherInner> = Arc::downgrade(&self.inner);
            live.on_update_finish(Box::new(move |result: &UpdateResult| {
                if let Some(inner) = weak.upgrade() {
                    absorb_update_result(&inner, result);
                }
            }));
        }

        info!(
            root = ?root,
            mode = mode.name(),
            watched = watched_count,
            "watching for changes"
        );
        Ok(())
    }

    /// Extra paths that would be added if collected now.
    ///
    /// Before `start` this is the initial extra set; afterwards it only
    /// contains paths the engine reported since that are not yet watched.
    /// Empty once closed.
    pub fn extra_watched_files(&self) -> Vec<PathBuf> {
        let Some((build, watched)) = self.inner.collection_view() else {
            return Vec::new();
        };
        collect_extra_paths(
            build.as_ref(),
            &self.inner.root,
            &watched,
            self.inner.fs.as_ref(),
        )
    }

    /// Re-collect extra paths from the build engine and add the new ones to
    /// the running watch. Returns the added paths.
    ///
    /// A path the backend refuses is logged and left out; the rest are
    /// still added.
    pub fn refresh_extra_paths(&self) -> Result<Vec<PathBuf>> {
        let (build, watched) = match &*self.inner.lock_session() {
            Session::Active(active) => (
                Arc::clone(active.mode.build_engine()),
                active.watched.clone(),
            ),
            Session::Pending { .. } => return Ok(Vec::new()),
            Session::Closed => return Err(DevwatchError::Closed),
        };

        // The engine is queried without the session lock.
        let candidates = collect_extra_paths(
            build.as_ref(),
            &self.inner.root,
            &watched,
            self.inner.fs.as_ref(),
        );
        drop(build);

        let mut session = self.inner.lock_session();
        let Session::Active(active) = &mut *session else {
            return Err(DevwatchError::Closed);
        };

        let mut added = Vec::new();
        for path in candidates {
            // Re-checked: the set may have grown since the snapshot.
            if active.watched.is_covered(&path) {
                continue;
            }
            if let Err(err) = active.handle.add(std::slice::from_ref(&path)) {
                warn!(path = ?path, error = %err, "failed to add path to watcher");
                continue;
            }
            active.watched.add_if_absent(path.clone());
            added.push(path);
        }

        if !added.is_empty() {
            info!(added = ?added, "watching extra paths");
        }
        Ok(added)
    }

    /// Snapshot of the watch set in insertion order (empty unless active).
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        match &*self.inner.lock_session() {
            Session::Active(active) => active.watched.snapshot(),
            _ => Vec::new(),
        }
    }

    /// Run `f` against the backend handle of the running session, e.g. to
    /// add paths by hand. Paths added this way bypass the watch set.
    pub fn with_watch_handle<R>(&self, f: impl FnOnce(&mut dyn WatchHandle) -> R) -> Option<R> {
        match &mut *self.inner.lock_session() {
            Session::Active(active) => Some(f(active.handle.as_mut())),
            _ => None,
        }
    }

    /// Stop watching and release the backend handle and engine references.
    ///
    /// Idempotent. Dispatches already running finish their current engine
    /// call but skip every follow-up step.
    pub fn close(&self) {
        let previous = std::mem::replace(&mut *self.inner.lock_session(), Session::Closed);

        match previous {
            Session::Active(mut active) => {
                if let Some(task) = active.loop_task.take() {
                    task.abort();
                }
                if let Err(err) = active.handle.close() {
                    warn!(error = %err, "failed to close watch handle");
                }
                info!(
                    root = ?self.inner.root,
                    watched = active.watched.len(),
                    "file watcher closed"
                );
            }
            Session::Pending { .. } => debug!("file watcher closed before start"),
            Session::Closed => {}
        }
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consume backend change events until the stream ends or the session
/// closes. Each event is dispatched on its own task; dispatches are neither
/// serialized nor coalesced.
async fn run_event_loop(inner: Arc<WatcherInner>, mut rx: ChangeReceiver) {
    while let Some(path) = rx.recv().await {
        if inner.is_closed() {
            break;
        }

        let path = normalize_path(&path, &inner.root);
        if inner.is_ignored(&path) {
            continue;
        }

        let inner = Arc::clone(&inner);
        tokio::spawn(async move {
            dispatch_change(&inner, path).await;
        });
    }
}
