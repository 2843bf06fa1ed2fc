//! Filesystem node metadata.

use std::fs::Metadata;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::{DateTime, Utc};

/// One file or directory under the storage root.
///
/// Built fresh from the filesystem on every call; the service keeps no
/// separate index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Final path component.
    pub name: String,
    /// Path relative to the storage root, `/`-separated.
    pub relative_path: String,
    /// Absolute on-disk path.
    pub absolute_path: PathBuf,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Creation time, when the platform reports it.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified_at: Option<DateTime<Utc>>,
    /// Last access time.
    pub accessed_at: Option<DateTime<Utc>>,
    /// Unix permission bits (`mode & 0o777`).
    pub permissions: Option<u32>,
}

impl StoredEntry {
    /// Build an entry from already-fetched metadata.
    pub fn from_metadata(relative_path: String, absolute_path: PathBuf, metadata: &Metadata) -> Self {
        let name = absolute_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| relative_path.clone());
        let is_directory = metadata.is_dir();

        Self {
            name,
            relative_path,
            absolute_path,
            size: if is_directory { 0 } else { metadata.len() },
            is_directory,
            created_at: to_utc(metadata.created()),
            modified_at: to_utc(metadata.modified()),
            accessed_at: to_utc(metadata.accessed()),
            permissions: permission_bits(metadata),
        }
    }

    /// The public URL path under which static serving exposes this entry.
    ///
    /// Each segment is percent-encoded.
    pub fn url_path(&self) -> String {
        let encoded = self
            .relative_path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("/storage/{encoded}")
    }

    /// Permission bits as an octal string (e.g. `644`).
    pub fn permissions_octal(&self) -> Option<String> {
        self.permissions.map(|mode| format!("{mode:o}"))
    }
}

fn to_utc(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn permission_bits(_metadata: &Metadata) -> Option<u32> {
    None
}
