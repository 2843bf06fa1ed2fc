//! Collision-resistant file names for uploads without a declared path.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

/// Longest sanitized stem kept from the original name.
const MAX_SANITIZED_LENGTH: usize = 180;

/// Generates unique, filesystem-safe names.
///
/// Names have the form `{unix_millis}-{sequence}_{sanitized}`. The timestamp
/// keeps names unique across restarts; the sequence keeps them unique
/// between uploads that land in the same millisecond.
#[derive(Debug, Default)]
pub struct NameSanitizer {
    sequence: AtomicU64,
}

impl NameSanitizer {
    /// Create a new sanitizer with its sequence at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every character outside `[A-Za-z0-9._-]` with `_`.
    ///
    /// Never returns an empty string, `.` or `..`.
    pub fn sanitize(original: &str) -> String {
        let mut safe: String = original
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();

        // Keep the tail so the extension survives truncation
        if safe.len() > MAX_SANITIZED_LENGTH {
            safe = safe.split_off(safe.len() - MAX_SANITIZED_LENGTH);
        }

        match safe.as_str() {
            "" => "file".to_string(),
            "." | ".." => safe.replace('.', "_"),
            _ => safe,
        }
    }

    /// Produce a unique name derived from `original`.
    pub fn unique_name(&self, original: &str) -> String {
        let millis = Utc::now().timestamp_millis();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{millis}-{sequence}_{}", Self::sanitize(original))
    }
}
