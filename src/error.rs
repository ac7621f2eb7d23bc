//! Error types for the nomadlib library.

use std::sync::Arc;

use thiserror::Error;

use crate::uploads::UploadRecord;

/// Main error type for nomadlib operations.
#[derive(Error, Debug)]
pub enum PortalError {
    /// The server could not be reached or did not answer in time.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response carrying a server message.
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Non-2xx response whose body could not be parsed.
    #[error("API error {status}: {status_text}")]
    ApiStatus { status: u16, status_text: String },

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid or unexpected response from server.
    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),

    /// Caller passed an argument the API would reject.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration could not be loaded or is inconsistent.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Local I/O error (reading an upload payload).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The owning view cancelled the operation.
    #[error("Operation cancelled")]
    Cancelled,

    /// A polling loop gave up waiting.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Error produced by a request that several callers were waiting on.
    #[error(transparent)]
    Shared(Arc<PortalError>),
}

impl PortalError {
    /// Unwrap an error coming out of a shared in-flight request.
    pub(crate) fn from_shared(error: Arc<PortalError>) -> Self {
        Arc::try_unwrap(error).unwrap_or_else(PortalError::Shared)
    }

    /// HTTP status of an API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            PortalError::Api { status, .. } | PortalError::ApiStatus { status, .. } => Some(*status),
            PortalError::Network(e) => e.status().map(|s| s.as_u16()),
            PortalError::Shared(inner) => inner.status(),
            _ => None,
        }
    }

    /// Check if the server reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Check if this error means the operation was cancelled.
    pub fn is_cancelled(&self) -> bool {
        match self {
            PortalError::Cancelled => true,
            PortalError::Shared(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

/// Reason a payload transfer did not complete.
#[derive(Error, Debug)]
pub enum TransferError {
    /// The record has no pre-signed destination yet; refresh it first.
    #[error("Upload has no pre-signed destination URL")]
    MissingPresignedUrl,

    /// The user cancelled the transfer.
    #[error("Transfer cancelled by user")]
    Aborted,

    /// Reading the payload or sending it failed.
    #[error("Transfer failed: {0}")]
    Failed(#[source] PortalError),
}

impl TransferError {
    /// Check if the transfer was cancelled rather than failed.
    ///
    /// Aborted transfers are not errors from the user's point of view and
    /// should not be reported as such.
    pub fn is_aborted(&self) -> bool {
        matches!(self, TransferError::Aborted)
    }
}

/// A failed transfer together with the record it was started for.
///
/// The record is returned unmodified so the caller can offer a retry.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct TransferFailure {
    pub record: UploadRecord,
    #[source]
    pub error: TransferError,
}

impl TransferFailure {
    pub(crate) fn new(record: UploadRecord, error: TransferError) -> Self {
        Self { record, error }
    }
}

/// Result type alias for nomadlib operations.
pub type Result<T> = std::result::Result<T, PortalError>;
