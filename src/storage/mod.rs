//! Storage management for Storehouse.
//!
//! All filesystem access goes through this module:
//! - [`StorageRoot`] confines client paths to the storage directory
//! - [`NameSanitizer`] names uploads that come without a path
//! - [`tree`] walks the tree for listings and disk usage
//! - [`lifecycle`] inspects, deletes, and creates entries
//! - [`upload`] streams uploads to disk
//!
//! The filesystem is the only source of truth. Every call re-reads it.

mod entry;
mod lifecycle;
mod name;
mod path;
pub mod tree;
pub mod upload;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use entry::StoredEntry;
pub use name::NameSanitizer;
pub use path::{normalize, StorageRoot, MAX_PATH_DEPTH, MAX_PATH_LENGTH};
pub use tree::{format_bytes, DiskUsage, WalkOptions, WalkReport, WalkWarning};
pub use upload::{
    BatchReport, BatchUpload, FailedFile, FileUpload, StoredFile, UploadLimits, UploadPipeline,
    UploadRequest,
};

use crate::config::StorageConfig;
use crate::{Result, StorehouseError};

/// File name prefix of uploads that are still being written.
pub const PARTIAL_PREFIX: &str = ".storehouse-partial-";

/// Storage service bound to one root directory.
#[derive(Debug)]
pub struct Storage {
    root: StorageRoot,
    names: NameSanitizer,
    walk_options: WalkOptions,
}

impl Storage {
    /// Create a storage service rooted at `root`.
    ///
    /// The directory is created if it doesn't exist.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            root: StorageRoot::new(root)?,
            names: NameSanitizer::new(),
            walk_options: WalkOptions::default(),
        })
    }

    /// Create a storage service from configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(&config.root)?.with_walk_options(WalkOptions {
            include_directories: config.list_directories,
            max_depth: config.max_walk_depth,
            cancel: None,
        }))
    }

    /// Replace the default walk options.
    pub fn with_walk_options(mut self, options: WalkOptions) -> Self {
        self.walk_options = options;
        self
    }

    /// The storage root.
    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Name generator for uploads without a declared path.
    pub fn names(&self) -> &NameSanitizer {
        &self.names
    }

    /// Walk the whole tree with the configured options.
    pub async fn list(&self) -> Result<WalkReport> {
        self.list_with(self.walk_options.clone()).await
    }

    /// Walk the whole tree with explicit options.
    ///
    /// The walk runs on the blocking pool. If this future is dropped the
    /// walk is told to stop.
    pub async fn list_with(&self, options: WalkOptions) -> Result<WalkReport> {
        self.walk_blocking(options, |_, report| report).await
    }

    /// Total size and file count of the tree.
    pub async fn disk_usage(&self) -> Result<DiskUsage> {
        let options = WalkOptions {
            include_directories: false,
            ..self.walk_options.clone()
        };
        self.walk_blocking(options, |root, report| DiskUsage::from_report(root, &report))
            .await
    }

    async fn walk_blocking<T, F>(&self, mut options: WalkOptions, summarize: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&StorageRoot, WalkReport) -> T + Send + 'static,
    {
        let flag = options
            .cancel
            .get_or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone();
        let _guard = CancelOnDrop(flag);

        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            let report = tree::walk(&root, root.path(), &options)?;
            Ok(summarize(&root, report))
        })
        .await
        .map_err(|e| StorehouseError::Io(std::io::Error::other(e)))?
    }
}

/// Raises a cancellation flag when dropped.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}
