//! Router configuration for the HTTP API.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::handlers::{
    create_directory, delete_entry, file_info, health, list_files, route_not_found, upload_file,
    upload_files, AppState,
};
use super::middleware::{create_cors_layer, security_headers};

/// Room for multipart boundaries and text fields on top of file content.
const MULTIPART_OVERHEAD: u64 = 1024 * 1024;

/// Create the main router.
pub fn create_router(app_state: Arc<AppState>, cors_origins: &[String]) -> Router {
    let limits = app_state.pipeline.limits();
    let single_limit = body_limit(limits.max_file_size, 1);
    let batch_limit = body_limit(limits.max_file_size, limits.max_files_per_batch);

    let api_routes = Router::new()
        .route(
            "/upload",
            post(upload_file).layer(DefaultBodyLimit::max(single_limit)),
        )
        .route(
            "/upload-multiple",
            post(upload_files).layer(DefaultBodyLimit::max(batch_limit)),
        )
        .route("/files", get(list_files))
        .route("/files/*path", get(file_info).delete(delete_entry))
        .route("/directory", post(create_directory));

    let static_files = ServeDir::new(app_state.storage.root().path());

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .nest_service("/storage", static_files)
        .fallback(route_not_found)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(create_cors_layer(cors_origins))
                .layer(middleware::from_fn(security_headers)),
        )
        .with_state(app_state)
}

/// Request body limit for `files` uploads of at most `max_file_size` each.
fn body_limit(max_file_size: u64, files: usize) -> usize {
    let total = max_file_size
        .saturating_mul(files as u64)
        .saturating_add(MULTIPART_OVERHEAD);
    usize::try_from(total).unwrap_or(usize::MAX)
}
