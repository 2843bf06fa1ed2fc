//! Response DTOs for the HTTP API.
//!
//! Field names are camelCase on the wire.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::{BatchReport, DiskUsage, FailedFile, StoredEntry, StoredFile};
use crate::web::error::ErrorCode;

// ============================================================================
// Generic Response Wrapper
// ============================================================================

/// Successful response envelope: `success` plus the payload's fields.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Always `true` for this wrapper.
    pub success: bool,
    /// Response data, flattened into the envelope.
    #[serde(flatten)]
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Always `ok` while the process serves requests.
    pub status: &'static str,
    /// Time of the check.
    pub timestamp: DateTime<Utc>,
    /// Absolute path of the storage root.
    pub storage_dir: String,
    /// Usage snapshot.
    pub disk_usage: DiskUsageResponse,
}

/// Disk usage summary.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsageResponse {
    /// Bytes used by files.
    pub used: u64,
    /// `used` for humans, e.g. `1.5 MB`.
    pub used_formatted: String,
    /// Number of files.
    pub files: usize,
    /// Modification time of the storage root.
    pub last_modified: Option<DateTime<Utc>>,
}

impl From<DiskUsage> for DiskUsageResponse {
    fn from(usage: DiskUsage) -> Self {
        Self {
            used: usage.used,
            used_formatted: crate::storage::format_bytes(usage.used),
            files: usage.files,
            last_modified: usage.last_modified,
        }
    }
}

// ============================================================================
// Uploads
// ============================================================================

/// A stored upload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredFileResponse {
    /// File name as sent by the client.
    pub name: String,
    /// Path relative to the storage root.
    pub filename: String,
    /// Public URL path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Effective content type.
    pub mimetype: String,
    /// Completion time.
    pub uploaded_at: DateTime<Utc>,
}

impl From<StoredFile> for StoredFileResponse {
    fn from(file: StoredFile) -> Self {
        Self {
            path: file.entry.url_path(),
            name: file.original_name,
            filename: file.entry.relative_path,
            size: file.entry.size,
            mimetype: file.mime_type,
            uploaded_at: file.uploaded_at,
        }
    }
}

/// Single upload response.
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    /// Summary message.
    pub message: String,
    /// The stored file.
    pub file: StoredFileResponse,
}

/// A refused file of a batch.
#[derive(Debug, Serialize)]
pub struct FailedFileResponse {
    /// File name as sent by the client.
    pub name: String,
    /// Why it was refused.
    pub error: String,
    /// Error code.
    pub code: ErrorCode,
}

impl From<FailedFile> for FailedFileResponse {
    fn from(failed: FailedFile) -> Self {
        let code = ErrorCode::of(&failed.error);
        let error = if code.status_code().is_server_error() {
            "An internal error occurred".to_string()
        } else {
            failed.error.to_string()
        };
        Self {
            name: failed.original_name,
            error,
            code,
        }
    }
}

/// Batch upload response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUploadResponse {
    /// Whether at least one file was stored.
    pub success: bool,
    /// Summary message.
    pub message: String,
    /// Stored files, in request order.
    pub files: Vec<StoredFileResponse>,
    /// Refused files, in request order.
    pub failures: Vec<FailedFileResponse>,
    /// Total bytes stored.
    pub total_size: u64,
    /// Message of the first failure when nothing was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Code of the first failure when nothing was stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl From<BatchReport> for BatchUploadResponse {
    fn from(report: BatchReport) -> Self {
        let success = report.success();
        let total_size = report.total_bytes();
        let message = if report.failures.is_empty() {
            format!("{} files uploaded successfully", report.stored.len())
        } else {
            format!(
                "{} files uploaded, {} failed",
                report.stored.len(),
                report.failures.len()
            )
        };

        let files: Vec<StoredFileResponse> = report.stored.into_iter().map(Into::into).collect();
        let failures: Vec<FailedFileResponse> =
            report.failures.into_iter().map(Into::into).collect();

        let (error, code) = match failures.first() {
            Some(first) if !success => (Some(first.error.clone()), Some(first.code)),
            _ => (None, None),
        };

        Self {
            success,
            message,
            files,
            failures,
            total_size,
            error,
            code,
        }
    }
}

// ============================================================================
// Entries
// ============================================================================

/// One entry of the listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListItem {
    /// Final path component.
    pub name: String,
    /// Path relative to the storage root.
    pub filename: String,
    /// Public URL path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub uploaded_at: Option<DateTime<Utc>>,
    /// Whether this entry is a directory.
    pub is_directory: bool,
}

impl From<StoredEntry> for FileListItem {
    fn from(entry: StoredEntry) -> Self {
        Self {
            path: entry.url_path(),
            name: entry.name,
            filename: entry.relative_path,
            size: entry.size,
            uploaded_at: entry.modified_at,
            is_directory: entry.is_directory,
        }
    }
}

/// Listing response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListResponse {
    /// Entries in depth-first order.
    pub files: Vec<FileListItem>,
    /// Sum of file sizes.
    pub total_size: u64,
    /// Number of files.
    pub total_files: usize,
    /// Whether the walk stopped at the depth limit somewhere.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// Detailed metadata for one entry.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    /// Final path component.
    pub name: String,
    /// Path relative to the storage root.
    pub filename: String,
    /// Public URL path.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Whether this entry is a directory.
    pub is_directory: bool,
    /// Creation time, when the platform reports it.
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    pub modified_at: Option<DateTime<Utc>>,
    /// Last access time.
    pub accessed_at: Option<DateTime<Utc>>,
    /// Permission bits in octal, e.g. `644`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<String>,
}

impl From<StoredEntry> for FileInfo {
    fn from(entry: StoredEntry) -> Self {
        Self {
            path: entry.url_path(),
            permissions: entry.permissions_octal(),
            name: entry.name,
            filename: entry.relative_path,
            size: entry.size,
            is_directory: entry.is_directory,
            created_at: entry.created_at,
            modified_at: entry.modified_at,
            accessed_at: entry.accessed_at,
        }
    }
}

/// Info response.
#[derive(Debug, Serialize)]
pub struct FileInfoResponse {
    /// The entry.
    pub file: FileInfo,
}

/// Delete response.
#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    /// Summary message.
    pub message: String,
    /// Path relative to the storage root that was removed.
    pub deleted: String,
}

/// Directory creation response.
#[derive(Debug, Serialize)]
pub struct DirectoryResponse {
    /// Summary message.
    pub message: String,
    /// Path relative to the storage root of the new directory.
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorehouseError;
    use std::path::PathBuf;

    fn entry(relative: &str, size: u64) -> StoredEntry {
        StoredEntry {
            name: relative.rsplit('/').next().unwrap().to_string(),
            relative_path: relative.to_string(),
            absolute_path: PathBuf::from("/srv/storage").join(relative),
            size,
            is_directory: false,
            created_at: None,
            modified_at: None,
            accessed_at: None,
            permissions: Some(0o644),
        }
    }

    fn stored(relative: &str, size: u64) -> StoredFile {
        StoredFile {
            entry: entry(relative, size),
            original_name: "original.txt".to_string(),
            mime_type: "text/plain".to_string(),
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_api_response_flattens_payload() {
        let response = ApiResponse::new(DirectoryResponse {
            message: "Directory created successfully".to_string(),
            path: "docs".to_string(),
        });

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["path"], "docs");
    }

    #[test]
    fn test_stored_file_fields() {
        let json = serde_json::to_value(StoredFileResponse::from(stored("sub/a.txt", 10))).unwrap();

        assert_eq!(json["name"], "original.txt");
        assert_eq!(json["filename"], "sub/a.txt");
        assert_eq!(json["path"], "/storage/sub/a.txt");
        assert_eq!(json["size"], 10);
        assert_eq!(json["mimetype"], "text/plain");
        assert!(json["uploadedAt"].is_string());
    }

    #[test]
    fn test_file_info_does_not_leak_absolute_path() {
        let json = serde_json::to_value(FileInfo::from(entry("a.txt", 1))).unwrap();

        assert_eq!(json["permissions"], "644");
        assert!(!json.to_string().contains("/srv/storage"));
    }

    #[test]
    fn test_batch_response_partial() {
        let report = BatchReport {
            stored: vec![stored("a.txt", 3), stored("b.txt", 4)],
            failures: vec![FailedFile {
                original_name: "big.bin".to_string(),
                error: StorehouseError::PayloadTooLarge { limit: 1 },
            }],
        };

        let response = BatchUploadResponse::from(report);

        assert!(response.success);
        assert_eq!(response.total_size, 7);
        assert_eq!(response.failures[0].code, ErrorCode::PayloadTooLarge);
        assert!(response.error.is_none());
    }

    #[test]
    fn test_batch_response_all_failed() {
        let report = BatchReport {
            stored: vec![],
            failures: vec![
                FailedFile {
                    original_name: "x.sh".to_string(),
                    error: StorehouseError::ForbiddenType("application/x-sh".into()),
                },
                FailedFile {
                    original_name: "y".to_string(),
                    error: StorehouseError::Io(std::io::Error::other("secret detail")),
                },
            ],
        };

        let response = BatchUploadResponse::from(report);

        assert!(!response.success);
        assert_eq!(response.code, Some(ErrorCode::ForbiddenType));
        assert!(!response.failures[1].error.contains("secret detail"));
    }
}
