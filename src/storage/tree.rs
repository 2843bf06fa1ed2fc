//! Recursive walk over the storage tree.
//!
//! Used for the flat listing, total size, and file count. The walk reads
//! directory entries as it goes, so concurrent uploads or deletes may be
//! missed or seen twice. That is accepted: results are a best-effort
//! snapshot, not a consistent view.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::entry::StoredEntry;
use super::path::StorageRoot;
use super::PARTIAL_PREFIX;
use crate::{Result, StorehouseError};

/// Options controlling a walk.
#[derive(Debug, Clone)]
pub struct WalkOptions {
    /// Emit directories as entries in addition to files.
    pub include_directories: bool,
    /// Directories deeper than this are not descended into.
    pub max_depth: usize,
    /// Set to `true` to stop the walk early.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            include_directories: false,
            max_depth: 64,
            cancel: None,
        }
    }
}

impl WalkOptions {
    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// A node skipped during the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkWarning {
    /// Absolute path of the skipped node.
    pub path: PathBuf,
    /// Why it was skipped.
    pub reason: String,
}

/// Result of a walk.
#[derive(Debug, Clone, Default)]
pub struct WalkReport {
    /// Entries in depth-first order, siblings sorted by name.
    pub entries: Vec<StoredEntry>,
    /// Nodes skipped because they could not be read.
    pub warnings: Vec<WalkWarning>,
    /// Whether some directories were not descended into because of the
    /// depth limit.
    pub truncated: bool,
}

impl WalkReport {
    /// Sum of file sizes.
    pub fn total_size(&self) -> u64 {
        self.entries
            .iter()
            .filter(|e| !e.is_directory)
            .map(|e| e.size)
            .sum()
    }

    /// Number of files (directories excluded).
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.is_directory).count()
    }
}

/// Walk everything below `start`, which must lie inside `root`.
///
/// Unreadable nodes are skipped and recorded as warnings. Only a failure to
/// read `start` itself is an error; a missing `start` yields an empty report.
pub fn walk(root: &StorageRoot, start: &Path, options: &WalkOptions) -> Result<WalkReport> {
    let mut report = WalkReport::default();

    let items = match read_sorted(start) {
        Ok(items) => items,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(report),
        Err(e) => return Err(e.into()),
    };

    walk_items(root, items, 0, options, &mut report)?;
    Ok(report)
}

fn walk_items(
    root: &StorageRoot,
    items: Vec<fs::DirEntry>,
    depth: usize,
    options: &WalkOptions,
    report: &mut WalkReport,
) -> Result<()> {
    for item in items {
        if options.cancelled() {
            return Err(StorehouseError::Cancelled);
        }

        let path = item.path();
        if item.file_name().to_string_lossy().starts_with(PARTIAL_PREFIX) {
            continue;
        }

        // DirEntry::metadata does not follow symlinks
        let metadata = match item.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                skip(report, path, e.to_string());
                continue;
            }
        };
        if metadata.file_type().is_symlink() {
            tracing::debug!(path = %path.display(), "Skipping symbolic link");
            continue;
        }

        let Some(relative) = root.relative_of(&path) else {
            skip(report, path, "outside the storage root".to_string());
            continue;
        };

        if !metadata.is_dir() {
            report
                .entries
                .push(StoredEntry::from_metadata(relative, path, &metadata));
            continue;
        }

        if options.include_directories {
            report
                .entries
                .push(StoredEntry::from_metadata(relative, path.clone(), &metadata));
        }

        if depth + 1 >= options.max_depth {
            tracing::warn!(path = %path.display(), max_depth = options.max_depth, "Walk depth limit reached");
            report.truncated = true;
            continue;
        }

        match read_sorted(&path) {
            Ok(children) => walk_items(root, children, depth + 1, options, report)?,
            Err(e) => skip(report, path, e.to_string()),
        }
    }

    Ok(())
}

fn read_sorted(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut items = fs::read_dir(dir)?
        .filter_map(|item| match item {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to read directory entry");
                None
            }
        })
        .collect::<Vec<_>>();
    items.sort_by_key(|item| item.file_name());
    Ok(items)
}

fn skip(report: &mut WalkReport, path: PathBuf, reason: String) {
    tracing::warn!(path = %path.display(), reason = %reason, "Skipping unreadable entry");
    report.warnings.push(WalkWarning { path, reason });
}

/// Aggregate disk usage of the storage tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskUsage {
    /// Total bytes used by files.
    pub used: u64,
    /// Number of files.
    pub files: usize,
    /// Modification time of the root directory.
    pub last_modified: Option<DateTime<Utc>>,
}

impl DiskUsage {
    /// Summarize a walk of the whole root.
    pub fn from_report(root: &StorageRoot, report: &WalkReport) -> Self {
        let last_modified = fs::metadata(root.path())
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Self {
            used: report.total_size(),
            files: report.file_count(),
            last_modified,
        }
    }
}

/// Render a byte count for humans, e.g. `1.5 KB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_tree() -> (TempDir, StorageRoot) {
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::new(temp_dir.path().join("storage")).unwrap();
        std::fs::write(root.path().join("a.txt"), vec![b'a'; 10]).unwrap();
        std::fs::create_dir_all(root.path().join("sub/deeper")).unwrap();
        std::fs::write(root.path().join("sub/b.txt"), vec![b'b'; 20]).unwrap();
        std::fs::write(root.path().join("sub/deeper/c.txt"), vec![b'c'; 5]).unwrap();
        (temp_dir, root)
    }

    fn relative_paths(report: &WalkReport) -> Vec<&str> {
        report
            .entries
            .iter()
            .map(|e| e.relative_path.as_str())
            .collect()
    }

    #[test]
    fn test_walk_lists_files_only_by_default() {
        let (_temp_dir, root) = setup_tree();

        let report = walk(&root, root.path(), &WalkOptions::default()).unwrap();

        assert_eq!(
            relative_paths(&report),
            vec!["a.txt", "sub/b.txt", "sub/deeper/c.txt"]
        );
        assert_eq!(report.total_size(), 35);
        assert_eq!(report.file_count(), 3);
        assert!(report.warnings.is_empty());
        assert!(!report.truncated);
    }

    #[test]
    fn test_walk_can_include_directories() {
        let (_temp_dir, root) = setup_tree();
        let options = WalkOptions {
            include_directories: true,
            ..Default::default()
        };

        let report = walk(&root, root.path(), &options).unwrap();

        assert_eq!(
            relative_paths(&report),
            vec!["a.txt", "sub", "sub/b.txt", "sub/deeper", "sub/deeper/c.txt"]
        );
        // Directories do not change the totals
        assert_eq!(report.total_size(), 35);
        assert_eq!(report.file_count(), 3);
    }

    #[test]
    fn test_walk_depth_limit() {
        let (_temp_dir, root) = setup_tree();
        let options = WalkOptions {
            max_depth: 1,
            ..Default::default()
        };

        let report = walk(&root, root.path(), &options).unwrap();

        assert_eq!(relative_paths(&report), vec!["a.txt"]);
        assert!(report.truncated);
    }

    #[test]
    fn test_walk_empty_and_missing() {
        let temp_dir = TempDir::new().unwrap();
        let root = StorageRoot::new(temp_dir.path().join("storage")).unwrap();

        let report = walk(&root, root.path(), &WalkOptions::default()).unwrap();
        assert!(report.entries.is_empty());

        let missing = root.path().join("nope");
        let report = walk(&root, &missing, &WalkOptions::default()).unwrap();
        assert!(report.entries.is_empty());
    }

    #[test]
    fn test_walk_skips_partial_uploads() {
        let (_temp_dir, root) = setup_tree();
        std::fs::write(
            root.path().join(format!("{PARTIAL_PREFIX}0000")),
            b"in flight",
        )
        .unwrap();

        let report = walk(&root, root.path(), &WalkOptions::default()).unwrap();
        assert_eq!(report.file_count(), 3);
    }

    #[test]
    fn test_walk_cancelled() {
        let (_temp_dir, root) = setup_tree();
        let flag = Arc::new(AtomicBool::new(true));
        let options = WalkOptions {
            cancel: Some(flag),
            ..Default::default()
        };

        let result = walk(&root, root.path(), &options);
        assert!(matches!(result, Err(StorehouseError::Cancelled)));
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_does_not_follow_symlinks() {
        use std::os::unix::fs::symlink;

        let (temp_dir, root) = setup_tree();
        let outside = temp_dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.txt"), b"secret").unwrap();
        symlink(&outside, root.path().join("escape")).unwrap();

        let report = walk(&root, root.path(), &WalkOptions::default()).unwrap();
        assert_eq!(report.file_count(), 3);
        assert!(!relative_paths(&report).iter().any(|p| p.contains("secret")));
    }

    #[test]
    fn test_disk_usage_from_report() {
        let (_temp_dir, root) = setup_tree();
        let report = walk(&root, root.path(), &WalkOptions::default()).unwrap();

        let usage = DiskUsage::from_report(&root, &report);

        assert_eq!(usage.used, 35);
        assert_eq!(usage.files, 3);
        assert!(usage.last_modified.is_some());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 Bytes");
        assert_eq!(format_bytes(512), "512 Bytes");
        assert_eq!(format_bytes(1024), "1 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5 MB");
        assert_eq!(format_bytes(1234567890), "1.15 GB");
        assert_eq!(format_bytes(3 * 1024u64.pow(5)), "3072 TB");
    }
}
