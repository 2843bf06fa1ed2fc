//! Inspect, delete, and create entries under the storage root.
//!
//! Every operation re-resolves the client path through [`StorageRoot`]
//! before touching the filesystem.

use std::io;
use std::path::Path;

use tokio::fs;

use super::{Storage, StoredEntry};
use crate::{Result, StorehouseError};

impl Storage {
    /// Metadata for one file or directory.
    pub async fn info(&self, relative: &str) -> Result<StoredEntry> {
        let target = self.root.resolve_checked(relative, false).await?;
        self.entry_at(&target).await
    }

    /// Delete a file, or a directory with everything below it.
    ///
    /// Returns the entry as it was just before removal.
    pub async fn delete(&self, relative: &str) -> Result<StoredEntry> {
        let target = self.root.resolve_checked(relative, false).await?;
        let entry = self.entry_at(&target).await?;

        let removed = if entry.is_directory {
            fs::remove_dir_all(&target).await
        } else {
            fs::remove_file(&target).await
        };

        match removed {
            Ok(()) => {
                tracing::info!(path = %entry.relative_path, directory = entry.is_directory, "Entry deleted");
                Ok(entry)
            }
            // Someone else removed it first
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StorehouseError::NotFound(entry.relative_path))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a directory, including missing parents.
    ///
    /// Fails with `AlreadyExists` when anything already occupies the path.
    pub async fn create_directory(&self, relative: &str) -> Result<StoredEntry> {
        let target = self.root.resolve_checked(relative, true).await?;
        self.root.ensure_parent_dirs(&target).await?;

        match fs::create_dir(&target).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                let relative = self.root.relative_of(&target).unwrap_or_default();
                return Err(StorehouseError::AlreadyExists(relative));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(path = %target.display(), "Directory created");
        self.entry_at(&target).await
    }

    async fn entry_at(&self, target: &Path) -> Result<StoredEntry> {
        let relative = self
            .root
            .relative_of(target)
            .ok_or_else(|| StorehouseError::InvalidPath(target.display().to_string()))?;

        match fs::symlink_metadata(target).await {
            Ok(metadata) => Ok(StoredEntry::from_metadata(
                relative,
                target.to_path_buf(),
                &metadata,
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StorehouseError::NotFound(relative)),
            Err(e) => Err(e.into()),
        }
    }
}
