//! Represents a multipart upload session tracked by this service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use super::part::UploadPart;

/// Advisory part size handed to clients when none is configured (5 MiB).
pub const DEFAULT_PART_SIZE: i64 = 5 * 1024 * 1024;

/// Content type recorded when the client does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Lifecycle state of an upload session.
///
/// Sessions are persisted directly in `Uploading`; `Completed` and `Aborted`
/// are terminal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum UploadStatus {
    Created,
    Uploading,
    Completed,
    Aborted,
}

impl UploadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Uploading => "uploading",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One multipart transfer, from creation to completion or abort.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct UploadSession {
    /// Session identifier handed to clients.
    pub id: Uuid,

    /// Actor that requested the upload, if known.
    pub owner_id: Option<String>,

    /// Original filename as declared by the client.
    pub filename: String,

    /// Declared MIME type.
    pub content_type: String,

    /// Declared total size in bytes. Advisory only.
    #[serde(rename = "size")]
    pub size_bytes: Option<i64>,

    /// Key of the final object in the bucket. Assigned once, never reused.
    pub object_key: String,

    /// Handle the object store assigned to the in-progress multipart upload.
    #[serde(skip_serializing)]
    pub remote_upload_id: Option<String>,

    /// Advisory part size in bytes.
    pub part_size: i64,

    pub status: UploadStatus,

    pub created_at: DateTime<Utc>,
}

/// A session together with its registered parts, ordered by part number.
#[derive(Serialize, Clone, Debug)]
pub struct SessionView {
    #[serde(flatten)]
    pub session: UploadSession,
    pub parts: Vec<UploadPart>,
}
