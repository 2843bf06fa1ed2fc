//! API handlers for the HTTP surface.

pub mod files;
pub mod health;
pub mod upload;

pub use files::*;
pub use health::*;
pub use upload::*;

use std::sync::Arc;

use axum::{
    extract::OriginalUri,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::config::Config;
use crate::rate_limit::{RateLimitConfig, UploadRateLimiter};
use crate::storage::{Storage, UploadLimits, UploadPipeline};
use crate::web::error::ApiError;
use crate::{Result, StorehouseError};

/// Shared state for all handlers.
#[derive(Debug)]
pub struct AppState {
    /// Storage service.
    pub storage: Arc<Storage>,
    /// Upload quota tracker, shared with the pipeline.
    pub limiter: Arc<UploadRateLimiter>,
    /// Upload pipeline.
    pub pipeline: UploadPipeline,
    /// Include internal error text in error responses.
    pub diagnostic_errors: bool,
    /// Identify clients by forwarding headers instead of the socket peer.
    pub trust_proxy_headers: bool,
}

impl AppState {
    /// Create a new application state.
    pub fn new(storage: Arc<Storage>, limiter: Arc<UploadRateLimiter>, limits: UploadLimits) -> Self {
        let pipeline = UploadPipeline::new(storage.clone(), limiter.clone(), limits);
        Self {
            storage,
            limiter,
            pipeline,
            diagnostic_errors: false,
            trust_proxy_headers: false,
        }
    }

    /// Build the state from configuration, creating the storage root.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::from_config(&config.storage)?);
        let limiter = Arc::new(UploadRateLimiter::new(RateLimitConfig::new(
            config.limits.max_uploads_per_window,
            config.limits.window_secs,
        )));
        let limits = UploadLimits::from_config(&config.limits);

        Ok(Self::new(storage, limiter, limits)
            .with_diagnostic_errors(config.web.diagnostic_errors)
            .with_trust_proxy_headers(config.web.trust_proxy_headers))
    }

    /// Enable or disable internal error text in responses.
    pub fn with_diagnostic_errors(mut self, enabled: bool) -> Self {
        self.diagnostic_errors = enabled;
        self
    }

    /// Enable or disable client identification by proxy headers.
    pub fn with_trust_proxy_headers(mut self, enabled: bool) -> Self {
        self.trust_proxy_headers = enabled;
        self
    }

    /// Convert a storage error, honoring diagnostic mode.
    pub fn error(&self, err: StorehouseError) -> ApiError {
        ApiError::from_storage(err, self.diagnostic_errors)
    }
}

/// Fallback for unknown routes. Reports the full request path, even from
/// inside a nested router.
pub async fn route_not_found(OriginalUri(uri): OriginalUri) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "success": false,
            "error": "Route not found",
            "path": uri.path(),
        })),
    )
        .into_response()
}
