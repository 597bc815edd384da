#![cfg(unix)]

mod common;
use crate::common::{ROOT, paths, project_fs, server, standalone};

use std::path::{Path, PathBuf};

use devwatch::errors::DevwatchError;
use devwatch::types::LifecycleState;
use devwatch_test_utils::fake_engines::{BuildCall, FakeBuildEngine, update_result};
use devwatch_test_utils::log_capture::LogCapture;
use devwatch_test_utils::{init_tracing, settle, wait_until};

#[tokio::test]
async fn start_seeds_root_and_engine_declared_paths() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new().with_watch_path("/lib/x.css"), project_fs());

    h.watcher.start().await.unwrap();

    assert_eq!(h.watcher.watched_paths(), paths(&[ROOT, "/lib/x.css"]));
    assert_eq!(h.backend.opened(), vec![paths(&[ROOT, "/lib/x.css"])]);
    assert_eq!(h.watcher.state(), LifecycleState::Active);
}

#[tokio::test]
async fn start_filters_module_and_watch_paths_in_order() {
    init_tracing();
    let build = FakeBuildEngine::new()
        .with_module_path("/lib/b.ts")
        .with_module_path("/proj/src/a.ts")
        .with_watch_path("/cfg/y.json")
        .with_watch_path("/cfg/missing.json")
        .with_watch_path("/lib/x.css")
        .with_watch_path("/lib/b.ts");
    let h = standalone(build, project_fs());

    h.watcher.start().await.unwrap();

    assert_eq!(
        h.watcher.watched_paths(),
        paths(&[ROOT, "/lib/b.ts", "/cfg/y.json", "/lib/x.css"])
    );
}

#[tokio::test]
async fn nested_extra_paths_collapse_into_the_broader_entry() {
    init_tracing();
    let build = FakeBuildEngine::new()
        .with_watch_path("/lib")
        .with_watch_path("/lib/x.css");
    let h = standalone(build, project_fs());

    h.watcher.start().await.unwrap();

    assert_eq!(h.watcher.watched_paths(), paths(&[ROOT, "/lib"]));
}

#[tokio::test]
async fn relative_extra_paths_resolve_against_root() {
    init_tracing();
    let build = FakeBuildEngine::new().with_watch_path("../lib/./x.css");
    let h = standalone(build, project_fs());

    assert_eq!(h.watcher.extra_watched_files(), paths(&["/lib/x.css"]));
    h.watcher.start().await.unwrap();
    assert_eq!(h.watcher.watched_paths(), paths(&[ROOT, "/lib/x.css"]));
}

#[tokio::test]
async fn standalone_change_to_module_rebuilds_then_writes() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new().with_module("/proj/src/a.ts"), project_fs());
    h.watcher.start().await.unwrap();

    assert!(h.backend.emit("/proj/src/a.ts"));
    wait_until(|| h.build.calls().len() == 2).await;

    assert_eq!(
        h.build.calls(),
        vec![
            BuildCall::Update {
                paths: paths(&["/proj/src/a.ts"]),
                is_hmr: true,
            },
            BuildCall::WriteResources,
        ]
    );
    assert!(h.live.is_none());
}

#[tokio::test]
async fn standalone_change_to_unknown_path_does_nothing() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new().with_module("/proj/src/a.ts"), project_fs());
    h.watcher.start().await.unwrap();

    h.backend.emit("/proj/README.md");
    settle().await;

    assert!(h.build.calls().is_empty());
    assert_eq!(h.watcher.in_flight(), 0);
}

#[tokio::test]
async fn server_mode_only_pushes_live_updates() {
    init_tracing();
    let h = server(FakeBuildEngine::new().with_module("/proj/src/a.ts"), project_fs());
    h.watcher.start().await.unwrap();
    let live = h.live.as_ref().unwrap();

    h.backend.emit("/proj/src/a.ts");
    wait_until(|| live.pushed().len() == 1).await;
    settle().await;

    assert_eq!(live.pushed(), paths(&["/proj/src/a.ts"]));
    assert!(h.build.calls().is_empty());
}

#[tokio::test]
async fn server_mode_subscribes_absorber_once() {
    init_tracing();
    let h = server(FakeBuildEngine::new(), project_fs());
    h.watcher.start().await.unwrap();

    assert_eq!(h.live.as_ref().unwrap().subscriber_count(), 1);
}

#[tokio::test]
async fn update_finished_grows_the_watch_set() {
    init_tracing();
    let build = FakeBuildEngine::new()
        .with_transform("mod:b", "/lib/b.ts")
        .with_transform("mod:c", "/proj/src/b.ts");
    let h = server(build, project_fs());
    h.watcher.start().await.unwrap();
    let live = h.live.as_ref().unwrap();

    live.finish_update(&update_result(
        &["mod:b", "mod:c", "mod:b"],
        &["/cfg/y.json", "/cfg/y.json", "/cfg/gone.json"],
    ));

    assert_eq!(
        h.watcher.watched_paths(),
        paths(&[ROOT, "/lib/b.ts", "/cfg/y.json"])
    );
    assert_eq!(h.backend.added(), paths(&["/lib/b.ts", "/cfg/y.json"]));

    // Replaying the same result is a no-op.
    live.finish_update(&update_result(&["mod:b"], &["/cfg/y.json"]));
    assert_eq!(h.watcher.watched_paths().len(), 3);
    assert_eq!(h.backend.added().len(), 2);
}

#[tokio::test]
async fn paths_under_an_existing_watch_are_not_added() {
    init_tracing();
    let h = server(FakeBuildEngine::new().with_watch_path("/lib"), project_fs());
    h.watcher.start().await.unwrap();

    h.live
        .as_ref()
        .unwrap()
        .finish_update(&update_result(&["/lib/b.ts"], &["/lib/x.css"]));

    assert_eq!(h.watcher.watched_paths(), paths(&[ROOT, "/lib"]));
    assert!(h.backend.added().is_empty());
}

#[tokio::test]
async fn standalone_rebuild_result_grows_the_watch_set() {
    init_tracing();
    let build = FakeBuildEngine::new()
        .with_module("/proj/src/a.ts")
        .with_transform("mod:b", "/lib/b.ts")
        .with_update_result(update_result(&["mod:b"], &["/cfg/y.json"]));
    let h = standalone(build, project_fs());
    h.watcher.start().await.unwrap();

    h.backend.emit("/proj/src/a.ts");
    wait_until(|| h.build.calls().len() == 2).await;

    assert_eq!(
        h.watcher.watched_paths(),
        paths(&[ROOT, "/lib/b.ts", "/cfg/y.json"])
    );
}

#[tokio::test]
async fn failed_backend_add_leaves_path_unwatched() {
    init_tracing();
    let h = server(FakeBuildEngine::new(), project_fs());
    h.backend.fail_add_for("/lib/x.css");
    h.watcher.start().await.unwrap();

    h.live
        .as_ref()
        .unwrap()
        .finish_update(&update_result(&["/lib/x.css", "/cfg/y.json"], &[]));

    assert_eq!(h.watcher.watched_paths(), paths(&[ROOT, "/cfg/y.json"]));
}

#[tokio::test]
async fn starting_twice_is_rejected() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new(), project_fs());
    h.watcher.start().await.unwrap();

    let err = h.watcher.start().await.unwrap_err();
    assert!(matches!(err, DevwatchError::AlreadyStarted));
    assert_eq!(h.backend.opened().len(), 1);
}

#[tokio::test]
async fn close_is_idempotent_and_releases_everything() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new().with_watch_path("/lib/x.css"), project_fs());
    h.watcher.start().await.unwrap();

    h.watcher.close();
    h.watcher.close();

    assert_eq!(h.watcher.state(), LifecycleState::Closed);
    assert_eq!(h.backend.close_calls(), 1);
    assert!(h.watcher.watched_paths().is_empty());
    assert!(h.watcher.extra_watched_files().is_empty());
    assert!(h.watcher.with_watch_handle(|_| ()).is_none());
    assert!(matches!(
        h.watcher.start().await.unwrap_err(),
        DevwatchError::Closed
    ));
    assert!(matches!(
        h.watcher.refresh_extra_paths().unwrap_err(),
        DevwatchError::Closed
    ));
}

#[tokio::test]
async fn close_before_start_is_fine() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new(), project_fs());

    h.watcher.close();

    assert_eq!(h.watcher.state(), LifecycleState::Closed);
    assert!(h.backend.opened().is_empty());
}

#[tokio::test]
async fn events_after_close_do_nothing_and_log_nothing() {
    let h = server(FakeBuildEngine::new().with_module("/proj/src/a.ts"), project_fs());
    let (logs, _guard) = LogCapture::install();
    h.watcher.start().await.unwrap();
    h.watcher.close();
    logs.clear();

    h.backend.emit("/proj/src/a.ts");
    h.live
        .as_ref()
        .unwrap()
        .finish_update(&update_result(&["/lib/x.css"], &[]));
    settle().await;

    assert!(h.live.as_ref().unwrap().pushed().is_empty());
    assert!(h.build.calls().is_empty());
    assert_eq!(logs.count(), 0, "unexpected logs: {:?}", logs.events());
}

#[tokio::test]
async fn dropping_the_watcher_closes_the_backend() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new(), project_fs());
    h.watcher.start().await.unwrap();
    let backend = h.backend.clone();

    drop(h);

    assert_eq!(backend.close_calls(), 1);
}

#[tokio::test]
async fn extra_watched_files_reflects_the_live_set() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new().with_watch_path("/lib/x.css"), project_fs());

    assert_eq!(h.watcher.extra_watched_files(), paths(&["/lib/x.css"]));
    h.watcher.start().await.unwrap();
    // Everything collected so far is already watched.
    assert!(h.watcher.extra_watched_files().is_empty());

    h.build.add_watch_path("/cfg/y.json");
    assert_eq!(h.watcher.extra_watched_files(), paths(&["/cfg/y.json"]));
}

#[tokio::test]
async fn refresh_extra_paths_adds_new_engine_paths() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new().with_watch_path("/lib/x.css"), project_fs());
    h.watcher.start().await.unwrap();

    h.build.add_watch_path("/cfg/y.json");
    h.build.add_watch_path("/cfg/not-there.json");
    let added = h.watcher.refresh_extra_paths().unwrap();

    assert_eq!(added, paths(&["/cfg/y.json"]));
    assert_eq!(h.backend.added(), paths(&["/cfg/y.json"]));
    assert_eq!(
        h.watcher.watched_paths(),
        paths(&[ROOT, "/lib/x.css", "/cfg/y.json"])
    );
    assert!(h.watcher.refresh_extra_paths().unwrap().is_empty());
}

#[tokio::test]
async fn refresh_skips_paths_the_backend_refuses() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new(), project_fs());
    h.backend.fail_add_for("/lib/x.css");
    h.watcher.start().await.unwrap();

    h.build.add_watch_path("/cfg/y.json");
    h.build.add_watch_path("/lib/x.css");
    h.build.add_watch_path("/lib/b.ts");
    let added = h.watcher.refresh_extra_paths().unwrap();

    assert_eq!(added, paths(&["/cfg/y.json", "/lib/b.ts"]));
    assert_eq!(
        h.watcher.watched_paths(),
        paths(&[ROOT, "/cfg/y.json", "/lib/b.ts"])
    );
    assert_eq!(h.backend.added(), paths(&["/cfg/y.json", "/lib/b.ts"]));
    // Still offered on the next collection.
    assert_eq!(h.watcher.extra_watched_files(), paths(&["/lib/x.css"]));
}

#[tokio::test]
async fn paths_that_disappear_are_not_added() {
    init_tracing();
    let h = server(FakeBuildEngine::new(), project_fs());
    h.watcher.start().await.unwrap();
    h.fs.remove("/cfg/y.json");

    h.live
        .as_ref()
        .unwrap()
        .finish_update(&update_result(&[], &["/cfg/y.json"]));

    assert_eq!(h.watcher.watched_paths(), paths(&[ROOT]));
}

#[tokio::test]
async fn watch_handle_is_reachable_for_manual_adds() {
    init_tracing();
    let h = standalone(FakeBuildEngine::new(), project_fs());
    h.watcher.start().await.unwrap();

    let watched = h
        .watcher
        .with_watch_handle(|handle| {
            handle.add(&[PathBuf::from("/opt/manual")]).unwrap();
            handle.watched()
        })
        .unwrap();

    assert_eq!(watched, paths(&[ROOT, "/opt/manual"]));
    // Manual adds bypass the watch set.
    assert_eq!(h.watcher.watched_paths(), paths(&[ROOT]));
    assert_eq!(h.watcher.root(), Path::new(ROOT));
}

#[tokio::test]
async fn ignored_globs_drop_matching_events() {
    init_tracing();
    let build = FakeBuildEngine::new()
        .with_module("/proj/node_modules/pkg/index.js")
        .with_module("/proj/src/a.ts");
    let mut h = standalone(build, project_fs());
    let ignored = devwatch::config::compile_globs("ignored", &["node_modules/**".to_string()])
        .unwrap();
    h.watcher = h.watcher.with_ignored(ignored);
    h.watcher.start().await.unwrap();

    h.backend.emit("/proj/node_modules/pkg/index.js");
    h.backend.emit("/proj/src/a.ts");
    wait_until(|| h.build.calls().len() == 2).await;
    settle().await;

    assert_eq!(h.build.update_calls(), 1);
    assert_eq!(
        h.build.calls()[0],
        BuildCall::Update {
            paths: paths(&["/proj/src/a.ts"]),
            is_hmr: true
        }
    );
}
