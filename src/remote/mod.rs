//! Remote object store collaborator.
//!
//! The upload service never touches object bytes. It only asks the store to
//! open, authorize, assemble and abort multipart uploads; clients move the
//! bytes themselves using the presigned part URLs.

pub mod memory;
pub mod s3;

use crate::models::part::PartRef;
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use memory::MemoryRemoteStore;
pub use s3::S3RemoteStore;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("object store request failed: {0}")]
    Sdk(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("multipart upload `{0}` does not exist")]
    UnknownUpload(String),

    #[error("object store rejected request: {0}")]
    Rejected(String),

    #[error("object store configuration error: {0}")]
    Config(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Multipart operations of an S3-style object store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Bucket every key is resolved against.
    fn bucket(&self) -> &str;

    /// Open a multipart upload for `key` and return its upload handle.
    async fn initiate_multipart(&self, key: &str, content_type: &str) -> RemoteResult<String>;

    /// Produce a time-limited URL permitting a direct PUT of one part.
    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> RemoteResult<String>;

    /// Assemble the final object from `parts`, in the order given.
    ///
    /// Returns the object location when the store reports one.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> RemoteResult<Option<String>>;

    /// Discard an in-progress multipart upload and its uploaded parts.
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> RemoteResult<()>;
}
