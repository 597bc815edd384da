// src/engine/mod.rs

//! Collaborators the watcher drives.
//!
//! The watcher never compiles anything itself. It talks to:
//! - a [`BuildEngine`] that owns the module graph and performs incremental
//!   compiles,
//! - optionally a [`LiveUpdateEngine`] that pushes changed modules into a
//!   running target (server mode).
//!
//! Which of the two paths a change takes is decided once, at construction,
//! through [`WatchMode`]. [`command::CommandBuildEngine`] is the concrete
//! build engine used by the `devwatch` binary; tests provide fakes.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::Result;
use crate::types::UpdateResult;

pub mod command;

pub use command::CommandBuildEngine;

/// Boxed future returned by the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Callback invoked by a [`LiveUpdateEngine`] after each finished update.
pub type UpdateFinishCallback = Box<dyn Fn(&UpdateResult) + Send + Sync>;

/// The compiler / bundler side of the pipeline.
pub trait BuildEngine: Send + Sync {
    /// Whether `path` belongs to the engine's current module graph.
    fn has_module(&self, path: &Path) -> bool;

    /// Incrementally recompile `paths` and their dependents.
    fn update(&self, paths: Vec<PathBuf>, is_hmr: bool) -> BoxFuture<'_, Result<UpdateResult>>;

    /// Paths of graph modules that live outside `root`.
    fn resolved_module_paths(&self, root: &Path) -> Vec<PathBuf>;

    /// Non-module paths the engine declares build-relevant (config files
    /// read during compilation, etc).
    fn resolved_watch_paths(&self) -> Vec<PathBuf>;

    /// Resolve a module id from an [`UpdateResult`] to a filesystem path.
    fn transform_module_path(&self, root: &Path, module_id: &str) -> PathBuf;

    /// Flush compiled output to disk.
    fn write_resources_to_disk(&self) -> BoxFuture<'_, Result<()>>;
}

/// Hot-module-replacement engine (present only in server mode).
pub trait LiveUpdateEngine: Send + Sync {
    /// Push the change at `path` to connected clients.
    fn hmr_update<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>>;

    /// Register a callback run after every finished update. The watcher
    /// registers exactly one per session and never unregisters it.
    fn on_update_finish(&self, callback: UpdateFinishCallback);
}

/// How changes are turned into work.
#[derive(Clone)]
pub enum WatchMode {
    /// Changes go to the live-update engine; watch growth is driven by its
    /// update-finished notifications.
    Server {
        live: Arc<dyn LiveUpdateEngine>,
        build: Arc<dyn BuildEngine>,
    },
    /// Changes to known modules trigger an incremental rebuild directly.
    Standalone { build: Arc<dyn BuildEngine> },
}

impl WatchMode {
    pub fn build_engine(&self) -> &Arc<dyn BuildEngine> {
        match self {
            WatchMode::Server { build, .. } => build,
            WatchMode::Standalone { build } => build,
        }
    }

    pub fn live_engine(&self) -> Option<&Arc<dyn LiveUpdateEngine>> {
        match self {
            WatchMode::Server { live, .. } => Some(live),
            WatchMode::Standalone { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WatchMode::Server { .. } => "server",
            WatchMode::Standalone { .. } => "standalone",
        }
    }
}

impl fmt::Debug for WatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchMode")
            .field("mode", &self.name())
            .finish_non_exhaustive()
    }
}
