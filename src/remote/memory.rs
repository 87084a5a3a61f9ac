//! In-process remote store.
//!
//! Tracks multipart handles in memory and enforces the same bookkeeping rules
//! S3 does (unknown handles, ascending part numbers, no reuse after
//! completion or abort). Presigned URLs use a `memory://` scheme and cannot
//! actually receive bytes. Intended for local development and tests.

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::models::part::PartRef;
use async_trait::async_trait;
use std::{collections::HashMap, time::Duration};
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// State of one multipart upload held by [`MemoryRemoteStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryUploadState {
    InProgress,
    Completed,
    Aborted,
}

#[derive(Debug, Clone)]
struct MemoryUpload {
    key: String,
    state: MemoryUploadState,
    parts: Vec<PartRef>,
}

#[derive(Debug)]
pub struct MemoryRemoteStore {
    bucket: String,
    uploads: Mutex<HashMap<String, MemoryUpload>>,
}

impl MemoryRemoteStore {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            uploads: Mutex::new(HashMap::new()),
        }
    }

    /// Current state of an upload handle, if the store has seen it.
    pub async fn upload_state(&self, upload_id: &str) -> Option<MemoryUploadState> {
        self.uploads.lock().await.get(upload_id).map(|u| u.state)
    }

    /// Parts the upload was assembled from, once completed.
    pub async fn completed_parts(&self, upload_id: &str) -> Option<Vec<PartRef>> {
        let uploads = self.uploads.lock().await;
        uploads
            .get(upload_id)
            .filter(|u| u.state == MemoryUploadState::Completed)
            .map(|u| u.parts.clone())
    }

    fn object_location(&self, key: &str) -> String {
        format!("memory://{}/{}", self.bucket, key)
    }
}

/// Look up an in-progress upload, rejecting finished or mismatched handles.
fn in_progress<'a>(
    uploads: &'a mut HashMap<String, MemoryUpload>,
    key: &str,
    upload_id: &str,
) -> RemoteResult<&'a mut MemoryUpload> {
    match uploads.get_mut(upload_id) {
        Some(upload) if upload.key == key && upload.state == MemoryUploadState::InProgress => {
            Ok(upload)
        }
        _ => Err(RemoteError::UnknownUpload(upload_id.to_string())),
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn initiate_multipart(&self, key: &str, _content_type: &str) -> RemoteResult<String> {
        if key.is_empty() {
            return Err(RemoteError::Rejected("object key is empty".into()));
        }
        let upload_id = Uuid::new_v4().simple().to_string();
        self.uploads.lock().await.insert(
            upload_id.clone(),
            MemoryUpload {
                key: key.to_string(),
                state: MemoryUploadState::InProgress,
                parts: Vec::new(),
            },
        );
        debug!(key, upload_id = %upload_id, "memory multipart upload opened");
        Ok(upload_id)
    }

    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> RemoteResult<String> {
        let mut uploads = self.uploads.lock().await;
        in_progress(&mut uploads, key, upload_id)?;
        Ok(format!(
            "{}?uploadId={}&partNumber={}&expires={}",
            self.object_location(key),
            upload_id,
            part_number,
            expires_in.as_secs()
        ))
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> RemoteResult<Option<String>> {
        if parts.is_empty() {
            return Err(RemoteError::Rejected(
                "at least one part is required".into(),
            ));
        }
        if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
            return Err(RemoteError::Rejected(
                "parts must be listed in ascending part number order".into(),
            ));
        }

        let mut uploads = self.uploads.lock().await;
        let upload = in_progress(&mut uploads, key, upload_id)?;
        upload.state = MemoryUploadState::Completed;
        upload.parts = parts.to_vec();
        Ok(Some(self.object_location(key)))
    }

    async fn abort_multipart(&self, key: &str, upload_id: &str) -> RemoteResult<()> {
        let mut uploads = self.uploads.lock().await;
        let upload = in_progress(&mut uploads, key, upload_id)?;
        upload.state = MemoryUploadState::Aborted;
        Ok(())
    }
}
