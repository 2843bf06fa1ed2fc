//! Sandboxed path resolution under the storage root.
//!
//! Client-supplied paths are untrusted. They are normalized lexically
//! (`.` dropped, `..` popped) and rejected when they would climb above the
//! root, carry an absolute prefix, contain control characters, or nest too
//! deeply. Existing components are then checked on disk so a symlink inside
//! the root cannot redirect a request outside of it.

use std::io;
use std::path::{Component, Path, PathBuf};

use tokio::fs;

use super::name::NameSanitizer;
use super::PARTIAL_PREFIX;
use crate::{Result, StorehouseError};

/// Maximum number of segments in a client-supplied path.
pub const MAX_PATH_DEPTH: usize = 32;

/// Maximum length of a client-supplied path in bytes.
pub const MAX_PATH_LENGTH: usize = 4096;

/// The single directory every storage operation is confined to.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    /// Open a storage root, creating the directory if it doesn't exist.
    ///
    /// The stored path is canonical so prefix checks are not fooled by a
    /// symlinked or relative root.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        let root = std::fs::canonicalize(&root)?;
        Ok(Self { root })
    }

    /// Absolute path of the root directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Normalize a relative path and join it onto the root.
    ///
    /// The result is always a strict descendant of the root. Nothing is
    /// touched on disk.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        Ok(self.root.join(normalize(relative)?))
    }

    /// Resolve a path and verify that no existing component is a symlink
    /// and that every intermediate component is a directory.
    ///
    /// With `allow_missing_leaf`, components that don't exist yet are
    /// accepted, so the result can be used as a creation target.
    pub async fn resolve_checked(&self, relative: &str, allow_missing_leaf: bool) -> Result<PathBuf> {
        let target = self.resolve(relative)?;
        self.ensure_no_symlink_components(&target, allow_missing_leaf)
            .await?;
        Ok(target)
    }

    async fn ensure_no_symlink_components(&self, target: &Path, allow_missing_leaf: bool) -> Result<()> {
        let relative = target
            .strip_prefix(&self.root)
            .map_err(|_| StorehouseError::InvalidPath(target.display().to_string()))?;
        let mut current = self.root.clone();
        let mut components = relative.components().peekable();

        while let Some(component) = components.next() {
            current.push(component.as_os_str());
            match fs::symlink_metadata(&current).await {
                Ok(metadata) => {
                    if metadata.file_type().is_symlink() {
                        return Err(StorehouseError::InvalidPath(format!(
                            "{} is a symbolic link",
                            relative.display()
                        )));
                    }
                    if components.peek().is_some() && !metadata.is_dir() {
                        return Err(StorehouseError::InvalidPath(format!(
                            "{} passes through a file",
                            relative.display()
                        )));
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    if allow_missing_leaf {
                        return Ok(());
                    }
                    return Err(StorehouseError::NotFound(relative_display(relative)));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Create every missing directory above `path`.
    ///
    /// Safe under concurrent callers: a directory that already exists, or
    /// that another request creates first, counts as success.
    pub async fn ensure_parent_dirs(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.starts_with(&self.root) {
                return Err(StorehouseError::InvalidPath(path.display().to_string()));
            }
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Determine where an upload should be written.
    ///
    /// A declared path is resolved and its parent directories are created.
    /// Without one, the file lands directly in the root under a unique
    /// sanitized name.
    pub async fn upload_destination(
        &self,
        declared_path: Option<&str>,
        original_name: &str,
        names: &NameSanitizer,
    ) -> Result<PathBuf> {
        match declared_path.filter(|p| !p.trim().is_empty()) {
            Some(declared) => {
                let target = self.resolve_checked(declared, true).await?;
                self.ensure_parent_dirs(&target).await?;
                Ok(target)
            }
            None => Ok(self.root.join(names.unique_name(original_name))),
        }
    }

    /// Express an absolute path under the root with `/` separators.
    ///
    /// Returns `None` for paths outside the root and for the root itself.
    pub fn relative_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        if relative.as_os_str().is_empty() {
            return None;
        }
        Some(relative_display(relative))
    }
}

fn relative_display(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexically normalize an untrusted relative path.
///
/// Backslashes are treated as separators. The result is non-empty and
/// contains only normal components.
pub fn normalize(relative: &str) -> Result<PathBuf> {
    let invalid = |reason: &str| StorehouseError::InvalidPath(format!("{relative:?}: {reason}"));

    if relative.len() > MAX_PATH_LENGTH {
        return Err(invalid("path too long"));
    }
    if relative.chars().any(char::is_control) {
        return Err(invalid("contains control characters"));
    }

    let unified = relative.replace('\\', "/");
    let mut segments: Vec<&std::ffi::OsStr> = Vec::new();

    for component in Path::new(&unified).components() {
        match component {
            Component::Normal(segment) => {
                if segment.to_string_lossy().starts_with(PARTIAL_PREFIX) {
                    return Err(invalid("uses a reserved name"));
                }
                segments.push(segment);
                if segments.len() > MAX_PATH_DEPTH {
                    return Err(invalid("nested too deeply"));
                }
            }
            Component::CurDir => continue,
            Component::ParentDir => {
                if segments.pop().is_none() {
                    return Err(invalid("escapes the storage root"));
                }
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid("absolute paths are not allowed"));
            }
        }
    }

    if segments.is_empty() {
        return Err(invalid("does not name an entry below the storage root"));
    }

    Ok(segments.into_iter().collect())
}
