// src/watch/mod.rs

//! File watching and change dispatch.
//!
//! This module is responsible for:
//! - Deciding which paths may join the watch set ([`filter`], [`registry`]).
//! - Collecting the out-of-root paths the build engine depends on
//!   ([`collector`]).
//! - Wiring up a cross-platform filesystem watcher (`notify`) behind the
//!   [`backend::WatchBackend`] seam.
//! - Routing each change to the live-update engine or to a rebuild
//!   ([`dispatcher`]) and folding newly discovered dependencies back into
//!   the running watch ([`absorber`]).
//!
//! [`FileWatcher`] owns the session and ties everything together.

mod absorber;
pub mod backend;
pub mod collector;
mod dispatcher;
pub mod filter;
pub mod path_utils;
pub mod registry;
pub mod watcher;

pub use backend::{ChangeReceiver, NotifyBackend, WatchBackend, WatchHandle};
pub use collector::collect_extra_paths;
pub use filter::{PathFilter, Rejection};
pub use registry::WatchSet;
pub use watcher::FileWatcher;
