//! Upload pipeline: quota admission, destination resolution, type check,
//! and streaming the body to disk.
//!
//! Bytes are written to a hidden partial file next to the destination and
//! renamed into place only once the whole body has arrived within the size
//! limit. The partial file is removed on every other outcome, including the
//! upload future being dropped when a client disconnects.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use super::{Storage, StoredEntry, PARTIAL_PREFIX};
use crate::config::LimitsConfig;
use crate::rate_limit::{RateLimitResult, UploadRateLimiter};
use crate::{Result, StorehouseError};

/// Limits applied to every upload.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    /// Maximum size of one file in bytes.
    pub max_file_size: u64,
    /// Maximum number of files in one batch.
    pub max_files_per_batch: usize,
    /// Content types that are refused, compared case-insensitively.
    pub blocked_mime_types: Vec<String>,
}

impl UploadLimits {
    /// Build limits from configuration.
    pub fn from_config(config: &LimitsConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            max_files_per_batch: config.max_files_per_batch,
            blocked_mime_types: config.blocked_mime_types.clone(),
        }
    }

    /// Whether a content type is on the blocklist. Parameters such as
    /// `; charset=...` are ignored.
    pub fn is_blocked(&self, mime_type: &str) -> bool {
        let essence = mime_type.split(';').next().unwrap_or("").trim();
        self.blocked_mime_types
            .iter()
            .any(|blocked| blocked.eq_ignore_ascii_case(essence))
    }
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self::from_config(&LimitsConfig::default())
    }
}

/// One file of an upload request.
#[derive(Debug)]
pub struct FileUpload<S> {
    /// File name as sent by the client.
    pub original_name: String,
    /// Optional destination relative to the storage root.
    pub declared_path: Option<String>,
    /// Content type as sent by the client.
    pub content_type: Option<String>,
    /// File content.
    pub body: S,
}

/// A single-file upload from one client.
#[derive(Debug)]
pub struct UploadRequest<S> {
    /// Identifier the quota is charged to.
    pub client_id: String,
    /// The file to store.
    pub file: FileUpload<S>,
}

/// A file that was written successfully.
#[derive(Debug, Clone)]
pub struct StoredFile {
    /// The entry on disk.
    pub entry: StoredEntry,
    /// File name as sent by the client.
    pub original_name: String,
    /// Effective content type.
    pub mime_type: String,
    /// When the upload finished.
    pub uploaded_at: DateTime<Utc>,
}

/// A file of a batch that was not stored.
#[derive(Debug)]
pub struct FailedFile {
    /// File name as sent by the client.
    pub original_name: String,
    /// Why it was refused.
    pub error: StorehouseError,
}

/// Per-file outcome of a batch upload.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Files that were stored, in request order.
    pub stored: Vec<StoredFile>,
    /// Files that were refused, in request order.
    pub failures: Vec<FailedFile>,
}

impl BatchReport {
    /// Whether at least one file was stored.
    pub fn success(&self) -> bool {
        !self.stored.is_empty()
    }

    /// Total bytes stored.
    pub fn total_bytes(&self) -> u64 {
        self.stored.iter().map(|f| f.entry.size).sum()
    }
}

/// Orchestrates uploads against one storage root and one quota tracker.
#[derive(Debug, Clone)]
pub struct UploadPipeline {
    storage: Arc<Storage>,
    limiter: Arc<UploadRateLimiter>,
    limits: Arc<UploadLimits>,
}

impl UploadPipeline {
    /// Create a new pipeline.
    pub fn new(storage: Arc<Storage>, limiter: Arc<UploadRateLimiter>, limits: UploadLimits) -> Self {
        Self {
            storage,
            limiter,
            limits: Arc::new(limits),
        }
    }

    /// The limits this pipeline enforces.
    pub fn limits(&self) -> &UploadLimits {
        &self.limits
    }

    /// Store one file after charging the client's quota.
    pub async fn store<S, B>(&self, request: UploadRequest<S>) -> Result<StoredFile>
    where
        S: Stream<Item = io::Result<B>>,
        B: AsRef<[u8]>,
    {
        self.admit(&request.client_id)?;
        let result = self.write(request.file).await;
        log_outcome(&request.client_id, &result);
        result
    }

    /// Start a batch. The quota is charged once for the whole batch.
    pub fn begin_batch(&self, client_id: &str) -> Result<BatchUpload<'_>> {
        self.admit(client_id)?;
        Ok(BatchUpload {
            pipeline: self,
            client_id: client_id.to_string(),
            seen: 0,
            report: BatchReport::default(),
        })
    }

    fn admit(&self, client_id: &str) -> Result<()> {
        match self.limiter.admit(client_id) {
            RateLimitResult::Allowed { remaining } => {
                tracing::debug!(client = %client_id, remaining, "Upload admitted");
                Ok(())
            }
            RateLimitResult::Denied { retry_after } => {
                tracing::warn!(client = %client_id, "Upload quota exceeded");
                Err(StorehouseError::QuotaExceeded {
                    retry_after_secs: retry_after.as_secs().max(1),
                })
            }
        }
    }

    async fn write<S, B>(&self, file: FileUpload<S>) -> Result<StoredFile>
    where
        S: Stream<Item = io::Result<B>>,
        B: AsRef<[u8]>,
    {
        let root = self.storage.root();
        let destination = root
            .upload_destination(
                file.declared_path.as_deref(),
                &file.original_name,
                self.storage.names(),
            )
            .await?;

        let mime_type = effective_mime_type(file.content_type.as_deref(), &file.original_name);
        if self.limits.is_blocked(&mime_type) {
            return Err(StorehouseError::ForbiddenType(mime_type));
        }

        if let Ok(existing) = fs::symlink_metadata(&destination).await {
            if existing.is_dir() {
                return Err(StorehouseError::InvalidPath(format!(
                    "{} is a directory",
                    root.relative_of(&destination).unwrap_or_default()
                )));
            }
        }

        let directory = destination
            .parent()
            .ok_or_else(|| StorehouseError::InvalidPath(destination.display().to_string()))?;
        let mut partial = PartialFile::create(directory).await?;
        let written = match partial.write_stream(file.body, self.limits.max_file_size).await {
            Ok(_) => partial.persist(&destination).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            partial.discard().await;
            return Err(e);
        }

        let metadata = fs::metadata(&destination).await?;
        let relative = root
            .relative_of(&destination)
            .ok_or_else(|| StorehouseError::InvalidPath(destination.display().to_string()))?;

        Ok(StoredFile {
            entry: StoredEntry::from_metadata(relative, destination, &metadata),
            original_name: file.original_name,
            mime_type,
            uploaded_at: Utc::now(),
        })
    }
}

/// An admitted batch in progress.
///
/// Files are processed one by one; a refused file never affects the others.
#[derive(Debug)]
pub struct BatchUpload<'a> {
    pipeline: &'a UploadPipeline,
    client_id: String,
    seen: usize,
    report: BatchReport,
}

impl BatchUpload<'_> {
    /// Store the next file of the batch. Returns whether it was stored.
    ///
    /// Files beyond the batch limit are refused without reading their body.
    pub async fn push<S, B>(&mut self, file: FileUpload<S>) -> bool
    where
        S: Stream<Item = io::Result<B>>,
        B: AsRef<[u8]>,
    {
        self.seen += 1;
        let limit = self.pipeline.limits.max_files_per_batch;
        if self.seen > limit {
            self.reject(file.original_name, StorehouseError::TooManyFiles { limit });
            return false;
        }

        let original_name = file.original_name.clone();
        let result = self.pipeline.write(file).await;
        log_outcome(&self.client_id, &result);
        match result {
            Ok(stored) => {
                self.report.stored.push(stored);
                true
            }
            Err(error) => {
                self.report.failures.push(FailedFile {
                    original_name,
                    error,
                });
                false
            }
        }
    }

    /// Record a file that could not even be handed to [`push`](Self::push).
    pub fn reject(&mut self, original_name: String, error: StorehouseError) {
        tracing::warn!(client = %self.client_id, name = %original_name, error = %error, "Batch item refused");
        self.report.failures.push(FailedFile {
            original_name,
            error,
        });
    }

    /// Number of files offered so far.
    pub fn len(&self) -> usize {
        self.seen
    }

    /// Whether no file has been offered yet.
    pub fn is_empty(&self) -> bool {
        self.seen == 0
    }

    /// Finish the batch and return the per-file outcomes.
    pub fn finish(self) -> BatchReport {
        tracing::info!(
            client = %self.client_id,
            stored = self.report.stored.len(),
            failed = self.report.failures.len(),
            total_bytes = self.report.total_bytes(),
            "Batch upload finished"
        );
        self.report
    }
}

fn log_outcome(client_id: &str, result: &Result<StoredFile>) {
    match result {
        Ok(stored) => tracing::info!(
            client = %client_id,
            path = %stored.entry.relative_path,
            size = stored.entry.size,
            "File uploaded"
        ),
        Err(e) => tracing::warn!(client = %client_id, error = %e, "Upload failed"),
    }
}

/// The declared content type, or one guessed from the file name.
fn effective_mime_type(declared: Option<&str>, original_name: &str) -> String {
    declared
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| {
            mime_guess::from_path(original_name)
                .first_or_octet_stream()
                .essence_str()
                .to_string()
        })
}

/// A hidden file receiving upload bytes.
///
/// Failed writes are removed with [`discard`](Self::discard). If the upload
/// future is dropped first, `Drop` removes the file on the blocking pool.
struct PartialFile {
    path: PathBuf,
    file: Option<fs::File>,
    settled: bool,
}

impl PartialFile {
    async fn create(directory: &Path) -> Result<Self> {
        let path = directory.join(format!("{PARTIAL_PREFIX}{}", Uuid::new_v4()));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Some(file),
            settled: false,
        })
    }

    async fn write_stream<S, B>(&mut self, body: S, limit: u64) -> Result<u64>
    where
        S: Stream<Item = io::Result<B>>,
        B: AsRef<[u8]>,
    {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::other("partial file already closed"))?;
        let mut body = std::pin::pin!(body);
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            let bytes = chunk.as_ref();
            written += bytes.len() as u64;
            if written > limit {
                return Err(StorehouseError::PayloadTooLarge { limit });
            }
            file.write_all(bytes).await?;
        }

        file.flush().await?;
        Ok(written)
    }

    async fn persist(&mut self, destination: &Path) -> Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush().await?;
        }
        fs::rename(&self.path, destination).await?;
        self.settled = true;
        Ok(())
    }

    async fn discard(&mut self) {
        self.file.take();
        self.settled = true;
        log_removal(&self.path, fs::remove_file(&self.path).await);
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        self.file.take();
        let path = std::mem::take(&mut self.path);
        let remove = move || log_removal(&path, std::fs::remove_file(&path));
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(remove);
            }
            Err(_) => remove(),
        }
    }
}

fn log_removal(path: &Path, result: io::Result<()>) {
    match result {
        Ok(()) => tracing::debug!(path = %path.display(), "Removed partial upload"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove partial upload")
        }
    }
}
