#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use devwatch::engine::{BuildEngine, LiveUpdateEngine, WatchMode};
use devwatch::fs::mock::MockFileSystem;
use devwatch::watch::FileWatcher;
use devwatch_test_utils::fake_backend::RecordingBackend;
use devwatch_test_utils::fake_engines::{FakeBuildEngine, FakeLiveUpdateEngine};

pub const ROOT: &str = "/proj";

/// Everything a session test needs to poke at.
pub struct Harness {
    pub watcher: FileWatcher,
    pub backend: RecordingBackend,
    pub fs: MockFileSystem,
    pub build: Arc<FakeBuildEngine>,
    pub live: Option<Arc<FakeLiveUpdateEngine>>,
}

/// A mock filesystem with the project root and a few out-of-root files.
pub fn project_fs() -> MockFileSystem {
    let fs = MockFileSystem::new();
    fs.add_file("/proj/src/a.ts", "export const a = 1;");
    fs.add_file("/proj/src/b.ts", "export const b = 2;");
    fs.add_file("/lib/x.css", ".x {}");
    fs.add_file("/lib/b.ts", "export const libB = 3;");
    fs.add_file("/cfg/y.json", "{}");
    fs
}

pub fn standalone(build: FakeBuildEngine, fs: MockFileSystem) -> Harness {
    let build = Arc::new(build);
    let backend = RecordingBackend::new();
    let mode = WatchMode::Standalone {
        build: Arc::clone(&build) as Arc<dyn BuildEngine>,
    };
    let watcher = FileWatcher::new(
        ROOT,
        mode,
        Arc::new(backend.clone()),
        Arc::new(fs.clone()),
    );
    Harness {
        watcher,
        backend,
        fs,
        build,
        live: None,
    }
}

pub fn server(build: FakeBuildEngine, fs: MockFileSystem) -> Harness {
    let build = Arc::new(build);
    let live = Arc::new(FakeLiveUpdateEngine::new());
    let backend = RecordingBackend::new();
    let mode = WatchMode::Server {
        live: Arc::clone(&live) as Arc<dyn LiveUpdateEngine>,
        build: Arc::clone(&build) as Arc<dyn BuildEngine>,
    };
    let watcher = FileWatcher::new(
        ROOT,
        mode,
        Arc::new(backend.clone()),
        Arc::new(fs.clone()),
    );
    Harness {
        watcher,
        backend,
        fs,
        build,
        live: Some(live),
    }
}

pub fn paths(items: &[&str]) -> Vec<PathBuf> {
    items.iter().map(PathBuf::from).collect()
}
