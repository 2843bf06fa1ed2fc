//! Upload handlers.
//!
//! Request body: multipart/form-data. A `path` text field applies to the
//! next file field and names its destination relative to the storage root.
//! Files without one are stored under a generated unique name.

use std::io;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{
        multipart::{Field, MultipartError},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use futures::{Stream, StreamExt};

use super::AppState;
use crate::storage::{FileUpload, UploadRequest};
use crate::web::dto::{ApiResponse, BatchUploadResponse, UploadResponse};
use crate::web::error::ApiError;
use crate::web::middleware::ClientId;
use crate::StorehouseError;

/// POST /api/upload - Store a single file (form field `file`).
pub async fn upload_file(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    mut multipart: Multipart,
) -> Result<Json<ApiResponse<UploadResponse>>, ApiError> {
    let mut declared_path: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(invalid_multipart)? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "path" => declared_path = Some(read_path(field).await?),
            "file" => {
                let file = file_upload(field, declared_path.take());
                let stored = state
                    .pipeline
                    .store(UploadRequest { client_id, file })
                    .await
                    .map_err(|e| state.error(e))?;

                return Ok(Json(ApiResponse::new(UploadResponse {
                    message: "File uploaded successfully".to_string(),
                    file: stored.into(),
                })));
            }
            _ => {}
        }
    }

    Err(ApiError::bad_request("No file uploaded"))
}

/// POST /api/upload-multiple - Store several files (form fields `files`).
///
/// Every file succeeds or fails on its own. The response is 200 when at
/// least one file was stored, otherwise it carries the status of the first
/// failure.
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    ClientId(client_id): ClientId,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut batch = state
        .pipeline
        .begin_batch(&client_id)
        .map_err(|e| state.error(e))?;
    let mut declared_path: Option<String> = None;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) if batch.is_empty() => return Err(invalid_multipart(e)),
            Err(e) => {
                // Whatever arrived before the broken part is kept
                batch.reject(
                    "(unreadable part)".to_string(),
                    StorehouseError::Validation(e.body_text()),
                );
                break;
            }
        };
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "path" => declared_path = Some(read_path(field).await?),
            "files" | "file" => {
                batch.push(file_upload(field, declared_path.take())).await;
            }
            _ => {}
        }
    }

    if batch.is_empty() {
        return Err(ApiError::bad_request("No files uploaded"));
    }

    let response = BatchUploadResponse::from(batch.finish());
    let status = response
        .code
        .map(|code| code.status_code())
        .unwrap_or(StatusCode::OK);
    Ok((status, Json(response)).into_response())
}

fn file_upload<'a>(
    field: Field<'a>,
    declared_path: Option<String>,
) -> FileUpload<impl Stream<Item = io::Result<Bytes>> + Send + 'a> {
    FileUpload {
        original_name: field.file_name().unwrap_or("upload").to_string(),
        declared_path,
        content_type: field.content_type().map(str::to_string),
        body: field.map(|chunk| chunk.map_err(io::Error::other)),
    }
}

async fn read_path(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(invalid_multipart)
}

fn invalid_multipart(e: MultipartError) -> ApiError {
    tracing::warn!(error = %e, "Failed to read multipart field");
    ApiError::bad_request(format!("Invalid multipart data: {}", e.body_text()))
}
