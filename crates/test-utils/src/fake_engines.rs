use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use devwatch::engine::{BoxFuture, BuildEngine, LiveUpdateEngine, UpdateFinishCallback};
use devwatch::errors::{DevwatchError, Result};
use devwatch::types::{ExtraWatchResult, UpdateResult};

/// Calls observed by [`FakeBuildEngine`] (queries like `has_module` are
/// not recorded).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildCall {
    Update { paths: Vec<PathBuf>, is_hmr: bool },
    WriteResources,
}

#[derive(Default)]
struct BuildState {
    modules: HashSet<PathBuf>,
    module_paths: Vec<PathBuf>,
    watch_paths: Vec<PathBuf>,
    transforms: HashMap<String, PathBuf>,
    next_result: UpdateResult,
    fail_update: bool,
    fail_write: bool,
    calls: Vec<BuildCall>,
}

/// Scriptable in-memory build engine.
#[derive(Default)]
pub struct FakeBuildEngine {
    state: Mutex<BuildState>,
    /// When set, `update` waits for a notification before returning.
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeBuildEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(self, path: impl Into<PathBuf>) -> Self {
        self.state.lock().unwrap().modules.insert(path.into());
        self
    }

    pub fn with_module_path(self, path: impl Into<PathBuf>) -> Self {
        self.state.lock().unwrap().module_paths.push(path.into());
        self
    }

    pub fn with_watch_path(self, path: impl Into<PathBuf>) -> Self {
        self.state.lock().unwrap().watch_paths.push(path.into());
        self
    }

    pub fn with_transform(self, id: &str, path: impl Into<PathBuf>) -> Self {
        self.state
            .lock()
            .unwrap()
            .transforms
            .insert(id.to_string(), path.into());
        self
    }

    pub fn with_update_result(self, result: UpdateResult) -> Self {
        self.state.lock().unwrap().next_result = result;
        self
    }

    pub fn failing_update(self) -> Self {
        self.state.lock().unwrap().fail_update = true;
        self
    }

    pub fn failing_write(self) -> Self {
        self.state.lock().unwrap().fail_write = true;
        self
    }

    /// Block every `update` until the returned `Notify` is signalled.
    pub fn gated(self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn add_watch_path(&self, path: impl Into<PathBuf>) {
        self.state.lock().unwrap().watch_paths.push(path.into());
    }

    pub fn calls(&self) -> Vec<BuildCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn update_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, BuildCall::Update { .. }))
            .count()
    }
}

impl BuildEngine for FakeBuildEngine {
    fn has_module(&self, path: &Path) -> bool {
        self.state.lock().unwrap().modules.contains(path)
    }

    fn update(&self, paths: Vec<PathBuf>, is_hmr: bool) -> BoxFuture<'_, Result<UpdateResult>> {
        let gate = self.gate.lock().unwrap().clone();
        Box::pin(async move {
            let (fail, result) = {
                let mut state = self.state.lock().unwrap();
                state.calls.push(BuildCall::Update {
                    paths: paths.clone(),
                    is_hmr,
                });
                (state.fail_update, state.next_result.clone())
            };

            if let Some(gate) = gate {
                gate.notified().await;
            }

            if fail {
                return Err(DevwatchError::BuildFailed(format!(
                    "fake build failed for {paths:?}"
                )));
            }
            Ok(result)
        })
    }

    fn resolved_module_paths(&self, _root: &Path) -> Vec<PathBuf> {
        self.state.lock().unwrap().module_paths.clone()
    }

    fn resolved_watch_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().watch_paths.clone()
    }

    fn transform_module_path(&self, _root: &Path, module_id: &str) -> PathBuf {
        self.state
            .lock()
            .unwrap()
            .transforms
            .get(module_id)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(module_id))
    }

    fn write_resources_to_disk(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap();
            state.calls.push(BuildCall::WriteResources);
            if state.fail_write {
                return Err(DevwatchError::Other(anyhow::anyhow!("disk full")));
            }
            Ok(())
        })
    }
}

/// In-memory live-update engine that records pushes and holds the single
/// update-finished callback so tests can fire it.
#[derive(Default)]
pub struct FakeLiveUpdateEngine {
    pushed: Mutex<Vec<PathBuf>>,
    callbacks: Mutex<Vec<UpdateFinishCallback>>,
    fail_for: Mutex<HashSet<PathBuf>>,
}

impl FakeLiveUpdateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, path: impl Into<PathBuf>) {
        self.fail_for.lock().unwrap().insert(path.into());
    }

    pub fn pushed(&self) -> Vec<PathBuf> {
        self.pushed.lock().unwrap().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.lock().unwrap().len()
    }

    /// Invoke every registered update-finished callback with `result`.
    pub fn finish_update(&self, result: &UpdateResult) {
        for cb in self.callbacks.lock().unwrap().iter() {
            cb(result);
        }
    }
}

impl LiveUpdateEngine for FakeLiveUpdateEngine {
    fn hmr_update<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.pushed.lock().unwrap().push(path.to_path_buf());
            if self.fail_for.lock().unwrap().contains(path) {
                return Err(DevwatchError::LiveUpdateFailed {
                    path: path.display().to_string(),
                    reason: "client rejected update".to_string(),
                });
            }
            Ok(())
        })
    }

    fn on_update_finish(&self, callback: UpdateFinishCallback) {
        self.callbacks.lock().unwrap().push(callback);
    }
}

/// Shorthand for an `UpdateResult` from string slices.
pub fn update_result(added: &[&str], extra: &[&str]) -> UpdateResult {
    UpdateResult {
        added: added.iter().map(|s| s.to_string()).collect(),
        extra_watch_result: ExtraWatchResult {
            add: extra.iter().map(|s| s.to_string()).collect(),
        },
    }
}
