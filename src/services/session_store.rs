//! src/services/session_store.rs
//!
//! SessionStore — durable records of upload sessions and their parts, backed
//! by SQLite. Pure data access: every method is a single statement and no
//! policy lives here.

use crate::models::{
    part::UploadPart,
    session::{UploadSession, UploadStatus},
};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

const INIT_MIGRATION: &str = include_str!("../../migrations/0001_init.sql");

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upload session `{0}` not found")]
    SessionNotFound(Uuid),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone)]
pub struct SessionStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SessionStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Apply the embedded schema. Statements are idempotent.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = INIT_MIGRATION
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        tracing::info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }

        Ok(())
    }

    /// Cheap connectivity check used by the readiness probe.
    pub async fn ping(&self) -> StoreResult<()> {
        sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        Ok(())
    }

    /// Insert a new session row.
    pub async fn create_session(&self, session: &UploadSession) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO upload_sessions (
                id, owner_id, filename, content_type, size_bytes, object_key,
                remote_upload_id, part_size, status, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(session.id)
        .bind(&session.owner_id)
        .bind(&session.filename)
        .bind(&session.content_type)
        .bind(session.size_bytes)
        .bind(&session.object_key)
        .bind(&session.remote_upload_id)
        .bind(session.part_size)
        .bind(session.status)
        .bind(session.created_at)
        .execute(&*self.db)
        .await?;

        debug!(session_id = %session.id, key = %session.object_key, "stored upload session");
        Ok(())
    }

    /// Fetch a session by id.
    ///
    /// Returns SessionNotFound if missing.
    pub async fn fetch_session(&self, id: Uuid) -> StoreResult<UploadSession> {
        sqlx::query_as::<_, UploadSession>(
            "SELECT id, owner_id, filename, content_type, size_bytes, object_key,
                    remote_upload_id, part_size, status, created_at
             FROM upload_sessions WHERE id = ?",
        )
        .bind(id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StoreError::SessionNotFound(id),
            other => StoreError::Sqlx(other),
        })
    }

    /// All parts registered for a session, ascending by part number.
    pub async fn list_parts(&self, session_id: Uuid) -> StoreResult<Vec<UploadPart>> {
        let parts = sqlx::query_as::<_, UploadPart>(
            "SELECT session_id, part_number, etag, size_bytes, uploaded_at
             FROM upload_parts
             WHERE session_id = ?
             ORDER BY part_number ASC",
        )
        .bind(session_id)
        .fetch_all(&*self.db)
        .await?;
        Ok(parts)
    }

    /// Insert or overwrite the record for `(session_id, part_number)`.
    ///
    /// Last write wins.
    pub async fn upsert_part(&self, part: &UploadPart) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO upload_parts (session_id, part_number, etag, size_bytes, uploaded_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(session_id, part_number) DO UPDATE SET
                etag = excluded.etag,
                size_bytes = excluded.size_bytes,
                uploaded_at = excluded.uploaded_at",
        )
        .bind(part.session_id)
        .bind(part.part_number)
        .bind(&part.etag)
        .bind(part.size_bytes)
        .bind(part.uploaded_at)
        .execute(&*self.db)
        .await?;
        Ok(())
    }

    /// Overwrite a session's status.
    ///
    /// Returns SessionNotFound if no row was touched.
    pub async fn update_status(&self, id: Uuid, status: UploadStatus) -> StoreResult<()> {
        let result = sqlx::query("UPDATE upload_sessions SET status = ? WHERE id = ?")
            .bind(status)
            .bind(id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(id));
        }
        Ok(())
    }
}
