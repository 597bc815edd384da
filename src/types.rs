use std::fmt;

/// Whether a watch session still accepts events.
///
/// `Active -> Closed` is one-way and only happens through
/// [`FileWatcher::close`](crate::watch::FileWatcher::close).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Active,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::Active => f.write_str("active"),
            LifecycleState::Closed => f.write_str("closed"),
        }
    }
}

/// Paths the build engine wants watched that are not modules themselves
/// (config files read during compilation, etc).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtraWatchResult {
    pub add: Vec<String>,
}

/// Result of one incremental compile.
///
/// Both lists are raw: they may contain duplicates, paths under the project
/// root or paths that are already watched. Entries are module ids and must
/// go through [`BuildEngine::transform_module_path`](crate::engine::BuildEngine::transform_module_path)
/// before they can be compared against the watch set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateResult {
    pub added: Vec<String>,
    pub extra_watch_result: ExtraWatchResult,
}

impl UpdateResult {
    /// `added` followed by `extra_watch_result.add`, in order.
    pub fn watch_candidates(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(self.extra_watch_result.add.iter())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.extra_watch_result.add.is_empty()
    }
}
