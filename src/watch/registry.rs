// src/watch/registry.rs

//! Set of paths currently handed to the watch backend.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Insertion-ordered set of watched paths.
///
/// There is no removal: during a session the set only grows,
/// and it is dropped as a whole when the session closes.
#[derive(Debug, Default, Clone)]
pub struct WatchSet {
    order: Vec<PathBuf>,
    members: HashSet<PathBuf>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `path` unless it is already present. Returns `true` if it was
    /// inserted.
    pub fn add_if_absent(&mut self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        if self.members.contains(&path) {
            return false;
        }
        self.members.insert(path.clone());
        self.order.push(path);
        true
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.members.contains(path)
    }

    /// True if `path` or one of its ancestors is in the set, i.e. an
    /// existing watch already reports changes for it.
    ///
    /// Matching is per path component: `/a/b` covers `/a/b/c` but not
    /// `/a/bc`, unlike a raw string-prefix test.
    ///
    /// Runs in O(depth of `path`) lookups instead of scanning every member.
    pub fn is_covered(&self, path: &Path) -> bool {
        path.ancestors()
            .filter(|a| !a.as_os_str().is_empty())
            .any(|a| self.members.contains(a))
    }

    /// Members in insertion order.
    pub fn snapshot(&self) -> Vec<PathBuf> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_if_absent_is_idempotent() {
        let mut once = WatchSet::new();
        once.add_if_absent("/proj");
        once.add_if_absent("/lib/x.css");

        let mut twice = WatchSet::new();
        assert!(twice.add_if_absent("/proj"));
        assert!(twice.add_if_absent("/lib/x.css"));
        assert!(!twice.add_if_absent("/lib/x.css"));
        assert!(!twice.add_if_absent("/proj"));

        assert_eq!(once.snapshot(), twice.snapshot());
        assert_eq!(twice.len(), 2);
    }

    #[test]
    fn snapshot_keeps_insertion_order() {
        let mut set = WatchSet::new();
        set.add_if_absent("/b");
        set.add_if_absent("/a");
        set.add_if_absent("/c");

        assert_eq!(
            set.snapshot(),
            vec![PathBuf::from("/b"), PathBuf::from("/a"), PathBuf::from("/c")]
        );
    }

    #[test]
    fn coverage_is_component_wise() {
        let mut set = WatchSet::new();
        set.add_if_absent("/a/b");

        assert!(set.is_covered(Path::new("/a/b")));
        assert!(set.is_covered(Path::new("/a/b/c.txt")));
        assert!(set.is_covered(Path::new("/a/b/deep/er/d.txt")));
        assert!(!set.is_covered(Path::new("/a/bc/d.txt")));
        assert!(!set.is_covered(Path::new("/a")));
    }
}
