//! Storehouse - a sandboxed file storage service.
//!
//! Clients upload, list, inspect, and delete files below a single storage
//! root over HTTP. Every client-supplied path is confined to that root, and
//! uploads are subject to a per-client quota over a sliding time window.

pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod storage;
pub mod web;

pub use config::Config;
pub use error::{Result, StorehouseError};
pub use rate_limit::{RateLimitConfig, RateLimitResult, UploadRateLimiter};
pub use storage::{
    format_bytes, normalize, BatchReport, DiskUsage, FileUpload, NameSanitizer, Storage,
    StorageRoot, StoredEntry, StoredFile, UploadLimits, UploadPipeline, UploadRequest,
};
pub use web::{create_router, AppState, WebServer};
