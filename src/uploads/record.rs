//! Upload records and their processing status.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Processing status of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum UploadStatus {
    /// Record exists, no payload yet
    #[default]
    Created,
    /// Payload received, processing not started
    Uploaded,
    /// Parsers are running
    Processing,
    /// Processing finished successfully
    Ready,
    /// Processing failed
    Failed,
    /// Status string this client does not know
    Unknown,
}

impl UploadStatus {
    /// Parse a server status string, including the server's own status names.
    pub fn parse(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "CREATED" | "PENDING" => UploadStatus::Created,
            "UPLOADED" => UploadStatus::Uploaded,
            "PROCESSING" | "RUNNING" | "WAITING_FOR_RESULT" => UploadStatus::Processing,
            "READY" | "SUCCESS" => UploadStatus::Ready,
            "FAILED" | "FAILURE" => UploadStatus::Failed,
            _ => UploadStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Created => "CREATED",
            UploadStatus::Uploaded => "UPLOADED",
            UploadStatus::Processing => "PROCESSING",
            UploadStatus::Ready => "READY",
            UploadStatus::Failed => "FAILED",
            UploadStatus::Unknown => "UNKNOWN",
        }
    }

    /// Check if no further status change is expected.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Ready | UploadStatus::Failed)
    }
}

impl From<String> for UploadStatus {
    fn from(status: String) -> Self {
        UploadStatus::parse(&status)
    }
}

impl From<UploadStatus> for String {
    fn from(status: UploadStatus) -> Self {
        status.as_str().to_string()
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Server-side record of one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    /// Upload identifier (never changes)
    pub upload_id: String,
    /// Display name
    #[serde(default, alias = "upload_name")]
    pub name: Option<String>,
    /// Pre-signed destination for the payload; absent once the transfer is done
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presigned_url: Option<String>,
    /// Processing status
    #[serde(default, alias = "process_status")]
    pub status: UploadStatus,
    #[serde(default, alias = "upload_create_time", deserialize_with = "timestamp")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "timestamp")]
    pub complete_time: Option<DateTime<Utc>>,
    /// Number of entries found by processing
    #[serde(default)]
    pub entries: Option<u64>,
}

impl UploadRecord {
    /// Create a bare record; every other field is filled by the server.
    pub fn new(upload_id: impl Into<String>) -> Self {
        Self {
            upload_id: upload_id.into(),
            name: None,
            presigned_url: None,
            status: UploadStatus::default(),
            create_time: None,
            complete_time: None,
            entries: None,
        }
    }

    /// Check if the server is ready to accept the payload.
    pub fn accepts_payload(&self) -> bool {
        self.presigned_url.is_some()
    }

    /// Merge a refresh response into this record.
    ///
    /// Every field present in `patch` overwrites the local value, absent
    /// fields are kept. A field present as `null` clears the local value.
    /// The upload id is never replaced.
    pub fn apply(&mut self, patch: UploadPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(url) = patch.presigned_url {
            self.presigned_url = url;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(time) = patch.create_time {
            self.create_time = time;
        }
        if let Some(time) = patch.complete_time {
            self.complete_time = time;
        }
        if let Some(entries) = patch.entries {
            self.entries = entries;
        }
    }
}

/// Partial upload record, as returned by a refresh.
///
/// The outer `Option` of a clearable field tells whether the field was in the
/// response at all; `Some(None)` means the server sent `null`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UploadPatch {
    #[serde(default)]
    pub upload_id: Option<String>,
    #[serde(default, alias = "upload_name", deserialize_with = "present")]
    pub name: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub presigned_url: Option<Option<String>>,
    #[serde(default, alias = "process_status")]
    pub status: Option<UploadStatus>,
    #[serde(default, alias = "upload_create_time", deserialize_with = "present_timestamp")]
    pub create_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present_timestamp")]
    pub complete_time: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub entries: Option<Option<u64>>,
}

/// Mark a field as present, keeping an explicit `null` as `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn present_timestamp<'de, D>(deserializer: D) -> Result<Option<Option<DateTime<Utc>>>, D::Error>
where
    D: Deserializer<'de>,
{
    timestamp(deserializer).map(Some)
}

/// Accept RFC 3339 timestamps as well as the server's naive ISO timestamps (UTC).
fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if let Ok(time) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(time.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
