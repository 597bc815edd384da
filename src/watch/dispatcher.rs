// src/watch/dispatcher.rs

//! Turns a single change event into a live update or a rebuild.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::time::Instant;

use tracing::{debug, error, info};

use crate::engine::WatchMode;
use crate::errors::Result;
use crate::watch::absorber::absorb_update_result;
use crate::watch::watcher::WatcherInner;

/// Marks a dispatch as in flight for as long as it is alive.
///
/// Dropping it returns the dispatcher to idle whatever the outcome.
struct Dispatching<'a> {
    inner: &'a WatcherInner,
}

impl<'a> Dispatching<'a> {
    fn enter(inner: &'a WatcherInner) -> Self {
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        Self { inner }
    }
}

impl Drop for Dispatching<'_> {
    fn drop(&mut self) {
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Handle one changed path.
///
/// Never fails: errors from the engines are logged and the session keeps
/// going. Does nothing at all once the session is closed.
pub(crate) async fn dispatch_change(inner: &WatcherInner, path: PathBuf) {
    let Some(mode) = inner.active_mode() else {
        return;
    };

    let _dispatching = Dispatching::enter(inner);
    if let Err(err) = handle_change(inner, &mode, &path).await {
        error!(path = ?path, mode = mode.name(), error = %err, "failed to handle change");
    }
}

async fn handle_change(inner: &WatcherInner, mode: &WatchMode, path: &Path) -> Result<()> {
    match mode {
        // HMR has priority: with a live-update engine attached the rebuild
        // path below is never taken.
        WatchMode::Server { live, .. } => {
            debug!(path = ?path, "pushing live update");
            live.hmr_update(path).await
        }
        WatchMode::Standalone { build } => {
            if !build.has_module(path) {
                debug!(path = ?path, "changed path is not a known module; ignoring");
                return Ok(());
            }

            let started = Instant::now();
            info!(path = ?path, "rebuilding");
            let result = build.update(vec![path.to_path_buf()], true).await?;

            if inner.is_closed() {
                debug!(path = ?path, "session closed during rebuild; skipping follow-up");
                return Ok(());
            }
            absorb_update_result(inner, &result);

            build.write_resources_to_disk().await?;
            info!(
                path = ?path,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "rebuild complete"
            );
            Ok(())
        }
    }
}
