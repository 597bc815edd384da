// src/config/model.rs

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::watch::path_utils::normalize_path;

/// Configuration exactly as read from a TOML file, before validation.
///
/// ```toml
/// root = "."
///
/// [watch]
/// extra = ["../shared/theme.css"]
/// ignored = ["**/node_modules/**"]
///
/// [build]
/// cmd = "npm run build"
/// modules = ["src/**/*.ts"]
/// emit_cmd = "npm run emit"
/// discover_on_stdout = "^watch: (.+)$"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    /// Project root. Relative values are resolved against the directory
    /// containing the config file. Defaults to that directory.
    #[serde(default)]
    pub root: Option<PathBuf>,

    #[serde(default)]
    pub watch: WatchSection,

    pub build: BuildSection,
}

/// Validated configuration.
///
/// Only obtainable through `ConfigFile::try_from(RawConfigFile)`, so the
/// glob and regex strings inside are known to compile.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub root: Option<PathBuf>,
    pub watch: WatchSection,
    pub build: BuildSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        root: Option<PathBuf>,
        watch: WatchSection,
        build: BuildSection,
    ) -> Self {
        Self { root, watch, build }
    }

    /// Absolute project root for a config loaded from `config_dir`.
    pub fn resolve_root(&self, config_dir: &Path) -> PathBuf {
        match &self.root {
            Some(root) => normalize_path(root, config_dir),
            None => normalize_path(Path::new("."), config_dir),
        }
    }
}

/// `[watch]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchSection {
    /// Extra paths (files or directories) declared build-relevant, relative
    /// to the project root. Entries under the root are accepted here but
    /// filtered out by the watcher because the root watch already sees them.
    #[serde(default)]
    pub extra: Vec<String>,

    /// Globs (relative to the root) whose change events are dropped.
    #[serde(default)]
    pub ignored: Vec<String>,
}

/// `[build]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Shell command performing the incremental build.
    ///
    /// It receives the changed paths (newline separated) in
    /// `DEVWATCH_CHANGED` and `DEVWATCH_HMR=1` for watch-triggered builds.
    pub cmd: String,

    /// Globs (relative to the root) that make up the module set.
    #[serde(default)]
    pub modules: Vec<String>,

    /// Optional command run after each successful build to write output.
    #[serde(default)]
    pub emit_cmd: Option<String>,

    /// Regex matched against every stdout line of `cmd`; capture group 1 is
    /// a newly discovered dependency to watch.
    #[serde(default)]
    pub discover_on_stdout: Option<String>,
}
