//! Validation utilities for request DTOs.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::web::error::ApiError;

/// A JSON extractor that validates the request body.
///
/// Deserializes the body as JSON, then runs the `validator` rules. A body
/// that fails either step is answered with a 400 and field-level details.
///
/// # Example
///
/// ```ignore
/// use storehouse::web::dto::{CreateDirectoryRequest, ValidatedJson};
///
/// async fn create_directory(
///     ValidatedJson(payload): ValidatedJson<CreateDirectoryRequest>,
/// ) -> Result<Json<ApiResponse<DirectoryResponse>>, ApiError> {
///     // payload.path is non-empty here
/// }
/// ```
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e.body_text())))?;

        value.validate().map_err(ApiError::from_validation_errors)?;

        Ok(ValidatedJson(value))
    }
}

/// Validate that a string does not contain control characters or NULL bytes.
pub fn no_control_chars(value: &str) -> Result<(), validator::ValidationError> {
    if value.chars().any(char::is_control) {
        return Err(validator::ValidationError::new("no_control_chars")
            .with_message("Must not contain control characters".into()));
    }
    Ok(())
}

/// Validate that a string is not empty after trimming whitespace.
pub fn not_empty_trimmed(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("not_empty_trimmed")
            .with_message("Must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_control_chars_valid() {
        assert!(no_control_chars("docs/reports").is_ok());
        assert!(no_control_chars("names with spaces").is_ok());
    }

    #[test]
    fn test_no_control_chars_invalid() {
        assert!(no_control_chars("a\x00b").is_err()); // NULL byte
        assert!(no_control_chars("a\nb").is_err());
        assert!(no_control_chars("a\x1bb").is_err()); // Escape
    }

    #[test]
    fn test_not_empty_trimmed() {
        assert!(not_empty_trimmed("docs").is_ok());
        assert!(not_empty_trimmed("  docs  ").is_ok());
        assert!(not_empty_trimmed("").is_err());
        assert!(not_empty_trimmed(" \t ").is_err());
    }
}
