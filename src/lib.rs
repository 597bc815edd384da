// src/lib.rs

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::validate::compile_globs;
use crate::engine::{CommandBuildEngine, WatchMode};
use crate::fs::{FileSystem, RealFileSystem};
use crate::watch::path_utils::normalize_path;
use crate::watch::{FileWatcher, NotifyBackend};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the command-driven build engine (standalone mode)
/// - the file watcher on top of `notify`
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(fs.as_ref(), &config_path)?;

    let cwd = std::env::current_dir()?;
    let root = match &args.root {
        Some(root) => normalize_path(Path::new(root), &cwd),
        None => cfg.resolve_root(&config_dir(&config_path, &cwd)),
    };
    // Prefer the canonical form so event paths from the OS line up with it.
    let root = fs.canonicalize(&root).unwrap_or(root);

    let build = Arc::new(CommandBuildEngine::from_config(&root, &cfg)?);
    let ignored = compile_globs("[watch].ignored", &cfg.watch.ignored)?;
    let watcher = FileWatcher::new(
        &root,
        WatchMode::Standalone { build },
        Arc::new(NotifyBackend),
        fs,
    )
    .with_ignored(ignored);

    if args.dry_run {
        print_dry_run(&watcher);
        return Ok(());
    }

    watcher.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    watcher.close();
    Ok(())
}

/// Directory the config file lives in, made absolute.
///
/// A bare filename like "Devwatch.toml" (parent = "") falls back to the
/// current working directory.
fn config_dir(config_path: &Path, cwd: &Path) -> PathBuf {
    match config_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => normalize_path(parent, cwd),
        _ => cwd.to_path_buf(),
    }
}

/// Print the root and the initial watch set without starting anything.
fn print_dry_run(watcher: &FileWatcher) {
    println!("devwatch dry-run");
    println!("  root: {}", watcher.root().display());

    let extra = watcher.extra_watched_files();
    println!("extra watch paths ({}):", extra.len());
    for path in &extra {
        println!("  - {}", path.display());
    }

    debug!("dry-run complete (no watching)");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn config_dir_falls_back_to_cwd_for_bare_names() {
        let cwd = Path::new("/work");
        assert_eq!(config_dir(Path::new("Devwatch.toml"), cwd), PathBuf::from("/work"));
        assert_eq!(
            config_dir(Path::new("conf/Devwatch.toml"), cwd),
            PathBuf::from("/work/conf")
        );
    }
}
