//! Shared HTTP utilities for the link shortener workspace.
//!
//! Provides framework-agnostic response envelopes and time formatting used
//! by the HTTP surface.

use chrono::{DateTime, SecondsFormat, Utc};
use std::time::SystemTime;

// ============================================================================
// JSON Response Helpers (framework-agnostic)
// ============================================================================

/// Create a structured error JSON with a default message based on the code.
///
/// Returns: `{"error": {"code": "<code>", "message": "<default message>"}}`
pub fn json_err(code: &str) -> serde_json::Value {
    let message = match code {
        "not_found" => "Resource not found",
        "bad_request" | "invalid_request" => "Bad request",
        "unauthorized" => "Authentication required",
        "forbidden" => "Access denied",
        "invalid_credentials" => "Invalid credentials",
        "conflict" => "Resource already exists",
        "error" | "internal" => "Internal server error",
        _ => code, // Fallback to code as message for unknown codes
    };
    serde_json::json!({"error": {"code": code, "message": message}})
}

/// Create a structured error JSON with a custom message.
///
/// Returns: `{"error": {"code": "<code>", "message": "<message>"}}`
pub fn json_error_with_message(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({"error": {"code": code, "message": message}})
}

// ============================================================================
// Time Utilities
// ============================================================================

/// Convert SystemTime to RFC3339 string (seconds precision, UTC).
pub fn system_time_to_rfc3339(t: SystemTime) -> String {
    let dt: DateTime<Utc> = t.into();
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[test]
    fn test_json_err() {
        let err = json_err("not_found");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "not_found", "message": "Resource not found"}})
        );

        // Unknown code falls back to code as message
        let err = json_err("custom_error");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "custom_error", "message": "custom_error"}})
        );
    }

    #[test]
    fn test_json_error_with_message() {
        let err = json_error_with_message("bad_request", "Invalid input");
        assert_eq!(
            err,
            serde_json::json!({"error": {"code": "bad_request", "message": "Invalid input"}})
        );
    }

    #[test]
    fn test_system_time_to_rfc3339() {
        let t = UNIX_EPOCH + Duration::from_secs(1_000_000_000);
        assert_eq!(system_time_to_rfc3339(t), "2001-09-09T01:46:40Z");
    }
}
