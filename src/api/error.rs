//! Mapping of non-2xx API responses.

use serde_json::Value;

use crate::error::PortalError;

/// Canonical reason phrase for an HTTP status code.
pub fn status_text(status: u16) -> String {
    reqwest::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown Status")
        .to_string()
}

/// Build the error for a non-2xx response.
///
/// The body is parsed as JSON and a string `message` field (or `detail`, which
/// the API uses for its own errors) becomes the error message. Anything else
/// degrades to the status text.
pub(crate) fn error_from_response(status: u16, body: &str) -> PortalError {
    let message = serde_json::from_str::<Value>(body).ok().and_then(|json| {
        ["message", "detail"]
            .iter()
            .find_map(|key| json.get(*key).and_then(|v| v.as_str()).map(str::to_string))
    });

    match message {
        Some(message) => PortalError::Api { status, message },
        None => PortalError::ApiStatus {
            status,
            status_text: status_text(status),
        },
    }
}
