//! Request DTOs for the HTTP API.

use serde::Deserialize;
use validator::Validate;

use super::validation::{no_control_chars, not_empty_trimmed};

/// Directory creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateDirectoryRequest {
    /// Path of the new directory, relative to the storage root.
    #[serde(default)]
    #[validate(
        custom(function = "not_empty_trimmed"),
        custom(function = "no_control_chars")
    )]
    pub path: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> CreateDirectoryRequest {
        CreateDirectoryRequest {
            path: path.to_string(),
        }
    }

    #[test]
    fn test_create_directory_request_valid() {
        assert!(request("docs").validate().is_ok());
        assert!(request("docs/2024/reports").validate().is_ok());
    }

    #[test]
    fn test_create_directory_request_invalid() {
        assert!(request("").validate().is_err());
        assert!(request("   ").validate().is_err());
        assert!(request("bad\u{7}name").validate().is_err());
    }

    #[test]
    fn test_missing_path_deserializes_empty() {
        let request: CreateDirectoryRequest = serde_json::from_str("{}").unwrap();
        assert!(request.path.is_empty());
        assert!(request.validate().is_err());
    }
}
