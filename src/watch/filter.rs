// src/watch/filter.rs

//! Eligibility rules for adding a path to the watch set.

use std::fmt;
use std::path::Path;

use crate::fs::FileSystem;
use crate::watch::path_utils::{contains_nul, is_strictly_under};
use crate::watch::registry::WatchSet;

/// Why a candidate was not added to the watch set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Already reported through the recursive root watch.
    UnderRoot,
    ContainsNul,
    /// The path or one of its ancestors is already watched.
    AlreadyCovered,
    /// Missing, or its existence could not be determined.
    Missing,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rejection::UnderRoot => "under project root",
            Rejection::ContainsNul => "contains NUL byte",
            Rejection::AlreadyCovered => "already covered by a watched path",
            Rejection::Missing => "does not exist",
        };
        f.write_str(s)
    }
}

/// Borrowed view over the state the rules need.
///
/// Candidates are expected to be normalized already (see
/// [`normalize_path`](crate::watch::path_utils::normalize_path)).
#[derive(Debug, Clone, Copy)]
pub struct PathFilter<'a> {
    root: &'a Path,
    watched: &'a WatchSet,
    fs: &'a dyn FileSystem,
}

impl<'a> PathFilter<'a> {
    pub fn new(root: &'a Path, watched: &'a WatchSet, fs: &'a dyn FileSystem) -> Self {
        Self { root, watched, fs }
    }

    /// Apply the rules in order and report the first one that rejects.
    pub fn check(&self, path: &Path) -> Result<(), Rejection> {
        if is_strictly_under(path, self.root) {
            return Err(Rejection::UnderRoot);
        }
        if contains_nul(path) {
            return Err(Rejection::ContainsNul);
        }
        if self.watched.is_covered(path) {
            return Err(Rejection::AlreadyCovered);
        }
        if !self.fs.exists(path) {
            return Err(Rejection::Missing);
        }
        Ok(())
    }

    pub fn accepts(&self, path: &Path) -> bool {
        self.check(path).is_ok()
    }
}
