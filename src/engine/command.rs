// src/engine/command.rs

//! Build engine backed by shell commands.
//!
//! This is what the `devwatch` binary runs in standalone mode:
//! - module membership comes from the `[build].modules` globs plus every
//!   dependency discovered so far,
//! - `update` runs `[build].cmd` and scans its stdout with
//!   `[build].discover_on_stdout` to report new dependencies,
//! - `write_resources_to_disk` runs `[build].emit_cmd` when configured.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::Context;
use globset::GlobSet;
use regex::Regex;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::model::ConfigFile;
use crate::config::validate::{compile_discover_regex, compile_globs};
use crate::engine::{BoxFuture, BuildEngine};
use crate::errors::{DevwatchError, Result};
use crate::types::UpdateResult;
use crate::watch::path_utils::{is_strictly_under, normalize_path, relative_str};

pub struct CommandBuildEngine {
    root: PathBuf,
    cmd: String,
    emit_cmd: Option<String>,
    modules: GlobSet,
    discover: Option<Regex>,
    extra: Vec<PathBuf>,
    discovered: Mutex<Vec<PathBuf>>,
}

impl std::fmt::Debug for CommandBuildEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandBuildEngine")
            .field("root", &self.root)
            .field("cmd", &self.cmd)
            .field("emit_cmd", &self.emit_cmd)
            .finish_non_exhaustive()
    }
}

impl CommandBuildEngine {
    /// Build an engine for the project at `root` (absolute).
    pub fn from_config(root: impl Into<PathBuf>, cfg: &ConfigFile) -> Result<Self> {
        let root = root.into();
        let modules = compile_globs("[build].modules", &cfg.build.modules)?;
        let discover = cfg
            .build
            .discover_on_stdout
            .as_deref()
            .map(compile_discover_regex)
            .transpose()?;
        let extra = cfg
            .watch
            .extra
            .iter()
            .map(|e| normalize_path(Path::new(e), &root))
            .collect();

        Ok(Self {
            root,
            cmd: cfg.build.cmd.clone(),
            emit_cmd: cfg.build.emit_cmd.clone(),
            modules,
            discover,
            extra,
            discovered: Mutex::new(Vec::new()),
        })
    }

    fn lock_discovered(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.discovered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record_discovered(&self, ids: &[String]) {
        let mut discovered = self.lock_discovered();
        for id in ids {
            let path = normalize_path(Path::new(id), &self.root);
            if !discovered.contains(&path) {
                discovered.push(path);
            }
        }
    }

    async fn run_build(&self, paths: Vec<PathBuf>, is_hmr: bool) -> Result<UpdateResult> {
        let changed = paths
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("\n");
        let hmr = if is_hmr { "1" } else { "0" };

        let started = Instant::now();
        let stdout = run_shell(
            &self.cmd,
            &self.root,
            &[("DEVWATCH_CHANGED", changed.as_str()), ("DEVWATCH_HMR", hmr)],
        )
        .await?;

        let added = match &self.discover {
            Some(re) => discover_paths(re, &stdout),
            None => Vec::new(),
        };
        self.record_discovered(&added);

        info!(
            changed = paths.len(),
            discovered = added.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );

        Ok(UpdateResult {
            added,
            ..UpdateResult::default()
        })
    }
}

impl BuildEngine for CommandBuildEngine {
    fn has_module(&self, path: &Path) -> bool {
        if let Some(rel) = relative_str(&self.root, path) {
            if self.modules.is_match(&rel) {
                return true;
            }
        }
        self.lock_discovered().iter().any(|p| p == path)
    }

    fn update(&self, paths: Vec<PathBuf>, is_hmr: bool) -> BoxFuture<'_, Result<UpdateResult>> {
        Box::pin(self.run_build(paths, is_hmr))
    }

    fn resolved_module_paths(&self, root: &Path) -> Vec<PathBuf> {
        self.lock_discovered()
            .iter()
            .filter(|p| !is_strictly_under(p, root))
            .cloned()
            .collect()
    }

    fn resolved_watch_paths(&self) -> Vec<PathBuf> {
        self.extra.clone()
    }

    fn transform_module_path(&self, root: &Path, module_id: &str) -> PathBuf {
        normalize_path(Path::new(module_id), root)
    }

    fn write_resources_to_disk(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let Some(emit) = &self.emit_cmd else {
                return Ok(());
            };
            run_shell(emit, &self.root, &[]).await?;
            debug!(cmd = %emit, "emit command finished");
            Ok(())
        })
    }
}

/// Capture group 1 of every stdout line matching `re`, in order.
fn discover_paths(re: &Regex, stdout: &[String]) -> Vec<String> {
    stdout
        .iter()
        .filter_map(|line| re.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Run `cmd` through the platform shell in `cwd` and return its stdout
/// lines. A non-zero exit status is a [`DevwatchError::BuildFailed`].
async fn run_shell(cmd: &str, cwd: &Path, envs: &[(&str, &str)]) -> Result<Vec<String>> {
    debug!(%cmd, cwd = ?cwd, "starting build process");

    let mut command = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    };

    command
        .current_dir(cwd)
        .envs(envs.iter().copied())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .with_context(|| format!("spawning build command {cmd:?}"))?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let cmd_name = cmd.to_string();
        tokio::spawn(async move {
            for_each_line(BufReader::new(stderr), |line| {
                debug!(cmd = %cmd_name, "stderr: {}", line);
            })
            .await;
        });
    }

    let mut collected = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        for_each_line(BufReader::new(stdout), |line| {
            debug!(%cmd, "stdout: {}", line);
            collected.push(line);
        })
        .await;
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for build command {cmd:?}"))?;

    if !status.success() {
        let code = status.code().unwrap_or(-1);
        return Err(DevwatchError::BuildFailed(format!(
            "{cmd:?} exited with status {code}"
        )));
    }

    Ok(collected)
}

/// Feed every line of `reader` to `f` until EOF.
///
/// Invalid UTF-8 is replaced rather than ending the stream. A read error
/// stops reading; the caller still waits for the process.
async fn for_each_line<R>(mut reader: R, mut f: impl FnMut(String))
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                f(line.trim_end_matches(['\n', '\r']).to_string());
            }
            Err(err) => {
                warn!(error = %err, "stopped reading build output");
                break;
            }
        }
    }
}
