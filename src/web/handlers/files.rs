//! Listing, inspection, deletion, and directory creation.

use std::sync::Arc;

use axum::{
    extract::{OriginalUri, Path, State},
    response::{IntoResponse, Response},
    Json,
};

use super::{route_not_found, AppState};
use crate::web::dto::{
    ApiResponse, CreateDirectoryRequest, DeleteResponse, DirectoryResponse, FileInfoResponse,
    FileListResponse, ValidatedJson,
};
use crate::web::error::ApiError;

/// Prefix of the info route below `/api/files/`.
const INFO_PREFIX: &str = "info/";

/// GET /api/files - Recursive listing with totals.
pub async fn list_files(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<FileListResponse>>, ApiError> {
    let report = state.storage.list().await.map_err(|e| state.error(e))?;

    let total_size = report.total_size();
    let total_files = report.file_count();
    Ok(Json(ApiResponse::new(FileListResponse {
        files: report.entries.into_iter().map(Into::into).collect(),
        total_size,
        total_files,
        truncated: report.truncated,
    })))
}

/// GET /api/files/info/*path - Metadata for one entry.
///
/// Shares its route with deletion, so any other GET below `/api/files/`
/// is answered like an unknown route.
pub async fn file_info(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
    uri: OriginalUri,
) -> Result<Response, ApiError> {
    let Some(relative) = path.strip_prefix(INFO_PREFIX) else {
        return Ok(route_not_found(uri).await);
    };

    let entry = state
        .storage
        .info(relative)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(ApiResponse::new(FileInfoResponse { file: entry.into() })).into_response())
}

/// DELETE /api/files/*path - Delete a file, or a directory recursively.
pub async fn delete_entry(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Json<ApiResponse<DeleteResponse>>, ApiError> {
    let removed = state.storage.delete(&path).await.map_err(|e| state.error(e))?;

    Ok(Json(ApiResponse::new(DeleteResponse {
        message: "Deleted successfully".to_string(),
        deleted: removed.relative_path,
    })))
}

/// POST /api/directory - Create a directory (JSON body `{"path": ...}`).
pub async fn create_directory(
    State(state): State<Arc<AppState>>,
    ValidatedJson(req): ValidatedJson<CreateDirectoryRequest>,
) -> Result<Json<ApiResponse<DirectoryResponse>>, ApiError> {
    let entry = state
        .storage
        .create_directory(&req.path)
        .await
        .map_err(|e| state.error(e))?;

    Ok(Json(ApiResponse::new(DirectoryResponse {
        message: "Directory created successfully".to_string(),
        path: entry.relative_path,
    })))
}
