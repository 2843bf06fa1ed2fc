//! API error handling for the HTTP surface.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::collections::HashMap;

use crate::StorehouseError;

/// API error codes.
///
/// Serialized names match [`StorehouseError::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed request (400).
    BadRequest,
    /// Path escapes the storage root or is malformed (400).
    InvalidPath,
    /// Not found (404).
    NotFound,
    /// Target already exists (400).
    AlreadyExists,
    /// Upload quota used up (429).
    QuotaExceeded,
    /// Content type on the blocklist (400).
    ForbiddenType,
    /// File larger than the limit (400).
    PayloadTooLarge,
    /// Batch larger than the limit (400).
    TooManyFiles,
    /// Field-level validation error (400).
    ValidationError,
    /// Filesystem failure (500).
    IoFailure,
    /// Internal server error (500).
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest
            | ErrorCode::InvalidPath
            | ErrorCode::AlreadyExists
            | ErrorCode::ForbiddenType
            | ErrorCode::PayloadTooLarge
            | ErrorCode::TooManyFiles
            | ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::QuotaExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::IoFailure | ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The code for a storage error.
    pub fn of(err: &StorehouseError) -> Self {
        match err {
            StorehouseError::InvalidPath(_) => ErrorCode::InvalidPath,
            StorehouseError::NotFound(_) => ErrorCode::NotFound,
            StorehouseError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            StorehouseError::QuotaExceeded { .. } => ErrorCode::QuotaExceeded,
            StorehouseError::ForbiddenType(_) => ErrorCode::ForbiddenType,
            StorehouseError::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
            StorehouseError::TooManyFiles { .. } => ErrorCode::TooManyFiles,
            StorehouseError::Validation(_) => ErrorCode::ValidationError,
            StorehouseError::Io(_) => ErrorCode::IoFailure,
            StorehouseError::Config(_) | StorehouseError::Cancelled => ErrorCode::InternalError,
        }
    }
}

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Always `false`.
    pub success: bool,
    /// Human-readable message.
    pub error: String,
    /// Error code.
    pub code: ErrorCode,
    /// Field-level validation errors or, in diagnostic mode, internal error text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<serde_json::Value>,
    retry_after_secs: Option<u64>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            retry_after_secs: None,
        }
    }

    /// Attach details to the error body.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// The error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The human-readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Convert a storage error.
    ///
    /// Client errors carry their own message. Server-side failures get a
    /// generic message; the underlying text is only attached as `details`
    /// when `diagnostic` is set.
    pub fn from_storage(err: StorehouseError, diagnostic: bool) -> Self {
        let code = ErrorCode::of(&err);

        let mut api_error = if code.status_code().is_server_error() {
            tracing::error!(error = %err, "Storage operation failed");
            let api_error = Self::new(code, "An internal error occurred");
            if diagnostic {
                api_error.with_details(serde_json::Value::String(err.to_string()))
            } else {
                api_error
            }
        } else {
            Self::new(code, err.to_string())
        };

        if let StorehouseError::QuotaExceeded { retry_after_secs } = err {
            api_error.retry_after_secs = Some(retry_after_secs);
            api_error.details = Some(serde_json::json!({ "retryAfter": retry_after_secs }));
        }
        api_error
    }

    /// Create a validation error from validator::ValidationErrors.
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let mut details: HashMap<String, Vec<String>> = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field))
                })
                .collect();
            details.insert(field.to_string(), messages);
        }

        Self::new(ErrorCode::ValidationError, "Validation failed")
            .with_details(serde_json::json!(details))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
            details: self.details,
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after_secs {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<StorehouseError> for ApiError {
    fn from(err: StorehouseError) -> Self {
        Self::from_storage(err, false)
    }
}
