//! Represents parts registered against an upload session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Completion record for one transferred part.
#[derive(Serialize, Clone, FromRow, Debug)]
pub struct UploadPart {
    /// Owning session.
    #[serde(skip_serializing)]
    pub session_id: Uuid,

    /// Part number (1-based).
    pub part_number: i32,

    /// ETag the object store returned for this part.
    pub etag: String,

    /// Part size in bytes, if the client reported it.
    #[serde(rename = "size", skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,

    /// When this part was last registered.
    #[serde(skip_serializing)]
    pub uploaded_at: DateTime<Utc>,
}

/// A `(part number, etag)` pair as sent to the object store on completion.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PartRef {
    pub part_number: i32,
    #[serde(alias = "content_identifier")]
    pub etag: String,
}

impl From<&UploadPart> for PartRef {
    fn from(part: &UploadPart) -> Self {
        Self {
            part_number: part.part_number,
            etag: part.etag.clone(),
        }
    }
}
