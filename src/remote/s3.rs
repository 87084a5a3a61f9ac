//! S3-compatible remote store using the AWS SDK.

use super::{RemoteError, RemoteResult, RemoteStore};
use crate::{config::ObjectStoreConfig, models::part::PartRef};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client,
    error::{DisplayErrorContext, SdkError},
    presigning::PresigningConfig,
    types::{CompletedMultipartUpload, CompletedPart},
};
use std::time::Duration;
use tracing::instrument;

fn map_sdk_error<E>(err: SdkError<E>, upload_id: Option<&str>) -> RemoteError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if let (SdkError::ServiceError(service_err), Some(upload_id)) = (&err, upload_id) {
        if service_err.raw().status().as_u16() == 404 {
            return RemoteError::UnknownUpload(upload_id.to_string());
        }
    }
    RemoteError::Sdk(DisplayErrorContext(err).to_string().into())
}

/// Multipart uploads against one bucket of an S3-compatible service.
pub struct S3RemoteStore {
    client: Client,
    bucket: String,
}

impl std::fmt::Debug for S3RemoteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3RemoteStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl S3RemoteStore {
    /// Build a client from explicit configuration.
    ///
    /// Explicit credentials win; otherwise the ambient AWS credential chain
    /// (environment, profile, instance metadata) is used.
    pub async fn new(cfg: &ObjectStoreConfig) -> RemoteResult<Self> {
        if cfg.bucket.is_empty() {
            return Err(RemoteError::Config("bucket name is empty".into()));
        }

        let region = Region::new(cfg.region.clone());
        let mut builder = match (&cfg.access_key_id, &cfg.secret_access_key) {
            (Some(key_id), Some(secret)) => aws_sdk_s3::config::Builder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(aws_sdk_s3::config::Credentials::new(
                    key_id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "upload-sessions-config",
                )),
            (None, None) => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
            _ => {
                return Err(RemoteError::Config(
                    "access key id and secret access key must be set together".into(),
                ));
            }
        };

        if let Some(endpoint) = cfg.normalized_endpoint() {
            builder = builder.endpoint_url(endpoint);
        }
        if cfg.force_path_style {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.bucket.clone(),
        })
    }
}

#[async_trait]
impl RemoteStore for S3RemoteStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn initiate_multipart(&self, key: &str, content_type: &str) -> RemoteResult<String> {
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, None))?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| RemoteError::Rejected("response carried no upload id".into()))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn presign_upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        expires_in: Duration,
    ) -> RemoteResult<String> {
        let presigning = PresigningConfig::expires_in(expires_in)
            .map_err(|err| RemoteError::Config(err.to_string()))?;

        let request = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .part_number(part_number)
            .presigned(presigning)
            .await
            .map_err(|err| map_sdk_error(err, Some(upload_id)))?;

        Ok(request.uri().to_string())
    }

    #[instrument(skip(self, parts), fields(backend = "s3", parts = parts.len()))]
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[PartRef],
    ) -> RemoteResult<Option<String>> {
        let completed = parts
            .iter()
            .map(|part| {
                CompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect::<Vec<_>>();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed))
                    .build(),
            )
            .send()
            .await
            .map_err(|err| map_sdk_error(err, Some(upload_id)))?;

        Ok(output.location().map(str::to_string))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn abort_multipart(&self, key: &str, upload_id: &str) -> RemoteResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
            .map_err(|err| map_sdk_error(err, Some(upload_id)))?;
        Ok(())
    }
}
