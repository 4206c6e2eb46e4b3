// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Bootstrap sweep over files already present in a watched root

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::watcher::{should_process, FileEvent, WatchTarget};

/// Synthetic events for every file currently under the root
///
/// Only direct children are listed unless the target is recursive. Subtrees
/// under any `exclude` path are never entered. Entries that cannot be read
/// are logged and skipped.
pub fn scan(target: &WatchTarget, exclude: &[PathBuf]) -> Vec<FileEvent> {
    let mut walker = WalkDir::new(&target.root).min_depth(1).sort_by_file_name();
    if !target.recursive {
        walker = walker.max_depth(1);
    }

    let mut events = Vec::new();
    let entries = walker
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry.path(), exclude));

    for entry in entries {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                if should_process(entry.path()) {
                    events.push(FileEvent::new(entry.into_path()));
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Skipping unreadable entry under {:?}: {}", target.root, e),
        }
    }

    debug!("Swept {:?}: {} files", target.root, events.len());
    events
}

pub fn is_excluded(path: &Path, exclude: &[PathBuf]) -> bool {
    exclude.iter().any(|excluded| path.starts_with(excluded))
}

/// Subtrees a pipeline for `root` must leave alone
///
/// Normally the whole destination root. When the watched root itself lives
/// under the destination root, only the category directories are fenced
/// off, otherwise nothing in the root would ever be seen.
pub fn exclusions<I, S>(root: &Path, destination_root: &Path, categories: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    if !root.starts_with(destination_root) {
        return vec![destination_root.to_path_buf()];
    }
    let mut dirs: Vec<PathBuf> = Vec::new();
    for category in categories {
        let dir = destination_root.join(category.as_ref());
        if !dirs.contains(&dir) {
            dirs.push(dir);
        }
    }
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) -> PathBuf {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, rel).unwrap();
        path
    }

    fn paths(events: Vec<FileEvent>) -> Vec<PathBuf> {
        events.into_iter().map(|e| e.path).collect()
    }

    #[test]
    fn test_flat_scan() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.mkv");
        let b = touch(temp.path(), "b.mkv");
        touch(temp.path(), "sub/c.mkv");

        let found = paths(scan(&WatchTarget::new(temp.path(), false), &[]));
        assert_eq!(found, vec![a, b]);
    }

    #[test]
    fn test_recursive_scan_skips_excluded_and_partial() {
        let temp = TempDir::new().unwrap();
        let a = touch(temp.path(), "a.mkv");
        let c = touch(temp.path(), "sub/deeper/c.mkv");
        touch(temp.path(), "sub/d.mkv.part");
        touch(temp.path(), "sorted/TV/old.S01E01.mkv");

        let target = WatchTarget::new(temp.path(), true);
        let found = paths(scan(&target, &[temp.path().join("sorted")]));
        assert_eq!(found, vec![a, c]);
    }

    #[test]
    fn test_missing_root_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let target = WatchTarget::new(temp.path().join("missing"), true);
        assert!(scan(&target, &[]).is_empty());
    }

    #[test]
    fn test_exclusions_for_sibling_destination() {
        let excluded = exclusions(Path::new("/downloads"), Path::new("/media"), ["TV", "Movies"]);
        assert_eq!(excluded, vec![PathBuf::from("/media")]);
    }

    #[test]
    fn test_exclusions_for_root_inside_destination() {
        let excluded = exclusions(
            Path::new("/media/Downloads"),
            Path::new("/media"),
            ["TV", "Movies", "TV"],
        );
        assert_eq!(
            excluded,
            vec![PathBuf::from("/media/TV"), PathBuf::from("/media/Movies")]
        );
        assert!(!is_excluded(Path::new("/media/Downloads/Show.S01E01.mkv"), &excluded));
        assert!(is_excluded(Path::new("/media/TV/Show.S01E01.mkv"), &excluded));
    }

    #[test]
    fn test_scan_root_inside_destination() {
        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("media");
        let root = dest.join("Downloads");
        let wanted = touch(&root, "Show.S01E02.1080p.mkv");
        touch(&dest, "TV/Old.S01E01.mkv");

        let excluded = exclusions(&root, &dest, ["TV", "Movies"]);
        let found = paths(scan(&WatchTarget::new(&root, true), &excluded));
        assert_eq!(found, vec![wanted]);
    }
}
