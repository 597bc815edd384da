// src/watch/absorber.rs

//! Folds dependencies discovered by a rebuild into the running watch.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::types::UpdateResult;
use crate::watch::filter::PathFilter;
use crate::watch::path_utils::normalize_path;
use crate::watch::watcher::{Session, WatcherInner};

/// Extend the watch with every eligible path in `result`.
///
/// Each candidate id is resolved through the build engine, filtered against
/// the watch set *as it is at that moment* (so earlier candidates of the
/// same batch are already visible), handed to the backend and finally
/// recorded. Returns the paths that were added, in order.
///
/// A closed (or not yet started) session ignores the result.
pub(crate) fn absorb_update_result(inner: &WatcherInner, result: &UpdateResult) -> Vec<PathBuf> {
    if result.is_empty() {
        return Vec::new();
    }

    // Resolve ids without holding the session lock; the engine is foreign
    // code.
    let build = {
        let session = inner.lock_session();
        match &*session {
            Session::Active(active) => Arc::clone(active.mode.build_engine()),
            _ => return Vec::new(),
        }
    };
    let resolved: Vec<PathBuf> = result
        .watch_candidates()
        .map(|id| normalize_path(&build.transform_module_path(&inner.root, id), &inner.root))
        .collect();
    drop(build);

    let mut session = inner.lock_session();
    let Session::Active(active) = &mut *session else {
        debug!("session closed during rebuild; dropping update result");
        return Vec::new();
    };

    let mut added = Vec::new();
    for path in resolved {
        let filter = PathFilter::new(&inner.root, &active.watched, inner.fs.as_ref());
        if let Err(reason) = filter.check(&path) {
            trace!(path = ?path, %reason, "not watching discovered path");
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
        info!(
            added = ?added,
            watched = active.watched.len(),
            "extended watch set"
        );
    }
    added
}
