//! src/services/upload_service.rs
//!
//! UploadService — the multipart upload session state machine. Creates
//! sessions, hands out presigned part URLs, records part completions, and
//! finalizes or aborts the remote multipart upload.
//!
//! Sessions move `uploading -> completed | aborted`. There is no in-process
//! locking: part registration is a last-write-wins upsert, presigning is
//! stateless, and a finalize racing an abort resolves at the object store
//! (the loser's remote call fails; both local writes set a terminal status).

use crate::{
    models::{
        part::{PartRef, UploadPart},
        session::{DEFAULT_CONTENT_TYPE, SessionView, UploadSession, UploadStatus},
    },
    remote::{RemoteError, RemoteStore},
    services::session_store::{SessionStore, StoreError},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Validity of every presigned part URL.
pub const PART_URL_TTL: Duration = Duration::from_secs(3600);

/// Highest part number S3-compatible stores accept.
pub const MAX_PART_NUMBER: i32 = 10_000;

const MAX_FILENAME_LEN: usize = 255;
const MAX_CONTENT_TYPE_LEN: usize = 100;
const MAX_OWNER_LEN: usize = 100;
const MAX_ETAG_LEN: usize = 512;

/// Stable, client-facing error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    UpstreamError,
    InternalError,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::UpstreamError => "upstream_error",
            Self::InternalError => "internal_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload session `{0}` not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("object store failed to {operation}")]
    Upstream {
        operation: &'static str,
        #[source]
        source: RemoteError,
    },
    #[error("upload session `{0}` has no remote upload handle")]
    MissingRemoteHandle(Uuid),
    #[error(transparent)]
    Store(StoreError),
}

impl UploadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Upstream { .. } => ErrorKind::UpstreamError,
            Self::MissingRemoteHandle(_) | Self::Store(_) => ErrorKind::InternalError,
        }
    }

    /// Underlying provider or database error text, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::Upstream { source, .. } => Some(source.to_string()),
            Self::Store(err) => Some(err.to_string()),
            _ => None,
        }
    }

    fn upstream(operation: &'static str) -> impl FnOnce(RemoteError) -> Self {
        move |source| Self::Upstream { operation, source }
    }
}

impl From<StoreError> for UploadError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SessionNotFound(id) => Self::NotFound(id.to_string()),
            other => Self::Store(other),
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;

/// Input for [`UploadService::create_session`].
#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub filename: String,
    pub content_type: Option<String>,
    pub size: Option<i64>,
    #[serde(alias = "user_id")]
    pub owner_id: Option<String>,
}

/// A freshly created session plus what a client needs to start uploading.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedSession {
    #[serde(flatten)]
    pub view: SessionView,
    pub bucket: String,
    pub remote_handle: String,
}

/// Presigned authorization for one part.
#[derive(Debug, Clone, Serialize)]
pub struct PartAuthorization {
    pub presigned_url: String,
    pub expires_in: u64,
}

/// Non-secret settings the state machine needs.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Leading path segment of generated object keys (may be empty).
    pub key_prefix: String,
    /// Advisory part size recorded on new sessions.
    pub part_size: i64,
    /// Base used to build the canonical object URL when the store
    /// reports no location, e.g. `https://bucket.s3.amazonaws.com`.
    pub public_base_url: String,
}

impl UploadSettings {
    fn object_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url.trim_end_matches('/'), key)
    }
}

#[derive(Clone)]
pub struct UploadService {
    store: SessionStore,
    remote: Arc<dyn RemoteStore>,
    settings: UploadSettings,
}

impl UploadService {
    pub fn new(store: SessionStore, remote: Arc<dyn RemoteStore>, settings: UploadSettings) -> Self {
        Self {
            store,
            remote,
            settings,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Key for a new object: `{prefix}/{random token}/{basename}`.
    ///
    /// The token makes keys unique even for identical filenames; only the
    /// last real path segment of the client filename is kept, never `.` or `..`.
    fn object_key_for(&self, filename: &str) -> UploadResult<String> {
        let basename = filename
            .rsplit(['/', '\\'])
            .map(str::trim)
            .find(|s| !s.is_empty() && *s != "." && *s != "..")
            .ok_or_else(|| {
                UploadError::InvalidArgument(format!(
                    "filename `{}` has no usable file name segment",
                    filename
                ))
            })?;
        let token = Uuid::new_v4().simple();
        Ok(if self.settings.key_prefix.is_empty() {
            format!("{}/{}", token, basename)
        } else {
            format!("{}/{}/{}", self.settings.key_prefix, token, basename)
        })
    }

    /// Fail with NotFound unless the session exists.
    pub async fn ensure_session(&self, id: Uuid) -> UploadResult<()> {
        self.store.fetch_session(id).await?;
        Ok(())
    }

    /// Fetch a session and its remote handle.
    async fn session_with_handle(&self, id: Uuid) -> UploadResult<(UploadSession, String)> {
        let session = self.store.fetch_session(id).await?;
        let handle = session
            .remote_upload_id
            .clone()
            .ok_or(UploadError::MissingRemoteHandle(id))?;
        Ok((session, handle))
    }

    /// Open a remote multipart upload and record the session as `uploading`.
    #[instrument(skip(self, req), fields(filename = %req.filename))]
    pub async fn create_session(&self, req: NewSession) -> UploadResult<CreatedSession> {
        let NewSession {
            filename,
            content_type,
            size,
            owner_id,
        } = req;

        if filename.trim().is_empty() {
            return Err(UploadError::InvalidArgument("filename is required".into()));
        }
        if filename.chars().count() > MAX_FILENAME_LEN {
            return Err(UploadError::InvalidArgument(format!(
                "filename exceeds {} characters",
                MAX_FILENAME_LEN
            )));
        }
        let content_type = content_type
            .map(|ct| ct.trim().to_string())
            .filter(|ct| !ct.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        if content_type.chars().count() > MAX_CONTENT_TYPE_LEN {
            return Err(UploadError::InvalidArgument(format!(
                "content_type exceeds {} characters",
                MAX_CONTENT_TYPE_LEN
            )));
        }
        if owner_id.as_ref().is_some_and(|o| o.chars().count() > MAX_OWNER_LEN) {
            return Err(UploadError::InvalidArgument(format!(
                "owner_id exceeds {} characters",
                MAX_OWNER_LEN
            )));
        }
        if size.is_some_and(|s| s < 0) {
            return Err(UploadError::InvalidArgument("size must not be negative".into()));
        }

        let object_key = self.object_key_for(&filename)?;
        let remote_handle = self
            .remote
            .initiate_multipart(&object_key, &content_type)
            .await
            .map_err(UploadError::upstream("initiate multipart upload"))?;

        let session = UploadSession {
            id: Uuid::new_v4(),
            owner_id,
            filename,
            content_type,
            size_bytes: size,
            object_key,
            remote_upload_id: Some(remote_handle.clone()),
            part_size: self.settings.part_size,
            status: UploadStatus::Uploading,
            created_at: Utc::now(),
        };

        if let Err(err) = self.store.create_session(&session).await {
            if let Err(abort_err) = self
                .remote
                .abort_multipart(&session.object_key, &remote_handle)
                .await
            {
                warn!(
                    key = %session.object_key,
                    upload_id = %remote_handle,
                    error = %abort_err,
                    "failed to abort multipart upload after session insert failed, orphaned upload may remain"
                );
            }
            return Err(err.into());
        }

        info!(session_id = %session.id, key = %session.object_key, "upload session created");

        Ok(CreatedSession {
            view: SessionView {
                session,
                parts: Vec::new(),
            },
            bucket: self.remote.bucket().to_string(),
            remote_handle,
        })
    }

    /// Presign a PUT for one part. Never touches session or part records.
    ///
    /// Callable any number of times, for any part, in any session state.
    #[instrument(skip(self))]
    pub async fn authorize_part(
        &self,
        id: Uuid,
        part_number: i32,
    ) -> UploadResult<PartAuthorization> {
        let (session, handle) = self.session_with_handle(id).await?;
        validate_part_number(part_number)?;

        let presigned_url = self
            .remote
            .presign_upload_part(&session.object_key, &handle, part_number, PART_URL_TTL)
            .await
            .map_err(UploadError::upstream("presign part upload"))?;

        debug!(session_id = %id, part_number, "issued part authorization");
        Ok(PartAuthorization {
            presigned_url,
            expires_in: PART_URL_TTL.as_secs(),
        })
    }

    /// Record the ETag of a transferred part. Re-registering overwrites.
    ///
    /// Terminal sessions still accept registrations.
    #[instrument(skip(self, etag))]
    pub async fn register_part(
        &self,
        id: Uuid,
        part_number: i32,
        etag: String,
        size: Option<i64>,
    ) -> UploadResult<()> {
        let session = self.store.fetch_session(id).await?;
        validate_part_number(part_number)?;
        validate_etag(&etag)?;
        if size.is_some_and(|s| s < 0) {
            return Err(UploadError::InvalidArgument("size must not be negative".into()));
        }

        if session.status.is_terminal() {
            debug!(session_id = %id, status = %session.status, "registering part on terminal session");
        }

        self.store
            .upsert_part(&UploadPart {
                session_id: id,
                part_number,
                etag,
                size_bytes: size,
                uploaded_at: Utc::now(),
            })
            .await?;

        debug!(session_id = %id, part_number, "part registered");
        Ok(())
    }

    /// Ask the store to assemble the object from `parts` and mark the
    /// session completed.
    ///
    /// `parts` is sent exactly as given. Registered parts are only consulted
    /// to log divergence. A remote failure leaves the session `uploading`,
    /// so the call can be retried.
    #[instrument(skip(self, parts), fields(parts = parts.len()))]
    pub async fn finalize(&self, id: Uuid, parts: Vec<PartRef>) -> UploadResult<String> {
        let (session, handle) = self.session_with_handle(id).await?;
        if parts.is_empty() {
            return Err(UploadError::InvalidArgument("parts list required".into()));
        }
        for part in &parts {
            if part.part_number < 1 {
                return Err(UploadError::InvalidArgument(format!(
                    "part_number must be at least 1, got {}",
                    part.part_number
                )));
            }
        }

        match self.store.list_parts(id).await {
            Ok(registered) => warn_on_divergence(id, &parts, &registered),
            Err(err) => warn!(
                session_id = %id,
                error = %err,
                "could not read registered parts, skipping divergence check"
            ),
        }

        let location = self
            .remote
            .complete_multipart(&session.object_key, &handle, &parts)
            .await
            .map_err(UploadError::upstream("complete multipart upload"))?;

        self.store.update_status(id, UploadStatus::Completed).await?;
        info!(session_id = %id, key = %session.object_key, "upload session completed");

        Ok(location
            .filter(|loc| !loc.is_empty())
            .unwrap_or_else(|| self.settings.object_url(&session.object_key)))
    }

    /// Release the remote upload (best effort) and mark the session aborted.
    ///
    /// Remote failures are logged and ignored; the object store's lifecycle
    /// rules eventually reap abandoned uploads. Repeating an abort is harmless.
    #[instrument(skip(self))]
    pub async fn abort(&self, id: Uuid) -> UploadResult<UploadStatus> {
        let session = self.store.fetch_session(id).await?;

        match session.remote_upload_id.as_deref() {
            Some(handle) => {
                if let Err(err) = self.remote.abort_multipart(&session.object_key, handle).await {
                    warn!(
                        session_id = %id,
                        upload_id = %handle,
                        error = %err,
                        "remote abort failed, continuing"
                    );
                }
            }
            None => debug!(session_id = %id, "session has no remote handle to abort"),
        }

        self.store.update_status(id, UploadStatus::Aborted).await?;
        info!(session_id = %id, previous = %session.status, "upload session aborted");
        Ok(UploadStatus::Aborted)
    }

    /// Session plus registered parts, ascending by part number.
    pub async fn get_status(&self, id: Uuid) -> UploadResult<SessionView> {
        let session = self.store.fetch_session(id).await?;
        let parts = self.store.list_parts(id).await?;
        Ok(SessionView { session, parts })
    }
}

fn validate_part_number(part_number: i32) -> UploadResult<()> {
    if !(1..=MAX_PART_NUMBER).contains(&part_number) {
        return Err(UploadError::InvalidArgument(format!(
            "part_number must be between 1 and {}, got {}",
            MAX_PART_NUMBER, part_number
        )));
    }
    Ok(())
}

fn validate_etag(etag: &str) -> UploadResult<()> {
    if etag.trim().is_empty() {
        return Err(UploadError::InvalidArgument("etag is required".into()));
    }
    if etag.chars().count() > MAX_ETAG_LEN {
        return Err(UploadError::InvalidArgument(format!(
            "etag exceeds {} characters",
            MAX_ETAG_LEN
        )));
    }
    Ok(())
}

/// Log where the caller's finalize list disagrees with registered parts.
fn warn_on_divergence(id: Uuid, parts: &[PartRef], registered: &[UploadPart]) {
    if parts.windows(2).any(|w| w[0].part_number >= w[1].part_number) {
        warn!(session_id = %id, "finalize parts are not in ascending part number order");
    }

    let unmatched = parts
        .iter()
        .filter(|p| {
            !registered
                .iter()
                .any(|r| r.part_number == p.part_number && r.etag == p.etag)
        })
        .count();
    if unmatched > 0 {
        warn!(
            session_id = %id,
            unmatched,
            registered = registered.len(),
            "finalize parts differ from registered parts"
        );
    }
}
