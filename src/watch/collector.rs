// src/watch/collector.rs

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::engine::BuildEngine;
use crate::fs::FileSystem;
use crate::watch::filter::PathFilter;
use crate::watch::path_utils::normalize_path;
use crate::watch::registry::WatchSet;

/// Out-of-root paths the build engine needs watched, filtered against
/// `watched`.
///
/// Module paths come first, then engine-declared watch paths; relative
/// order is kept. Relative paths are resolved against `root`. The result is
/// a pure function of the engine's and the watch set's current state, so
/// calling this again after a rebuild yields fresh results.
pub fn collect_extra_paths(
    build: &dyn BuildEngine,
    root: &Path,
    watched: &WatchSet,
    fs: &dyn FileSystem,
) -> Vec<PathBuf> {
    let filter = PathFilter::new(root, watched, fs);

    build
        .resolved_module_paths(root)
        .into_iter()
        .chain(build.resolved_watch_paths())
        .map(|p| normalize_path(&p, root))
        .filter(|p| match filter.check(p) {
            Ok(()) => true,
            Err(reason) => {
                trace!(path = ?p, %reason, "skipping extra watch path");
                false
            }
        })
        .collect()
}
