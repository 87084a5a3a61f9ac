//! Defines routes for the upload session API.
//!
//! ## Structure
//! - **Session endpoints**
//!   - `POST /uploads` — create a session
//!   - `GET  /uploads/{id}` — session status with registered parts
//!   - `POST /uploads/{id}/complete` — finalize
//!   - `POST /uploads/{id}/abort` — abort
//!
//! - **Part endpoints**
//!   - `POST /uploads/{id}/parts/{part_number}/presign` — presigned part URL
//!   - `PUT  /uploads/{id}/parts/{part_number}` — register a part's ETag

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        upload_handlers::{
            abort_upload, complete_upload, create_upload, get_upload, presign_part,
            register_part,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Build and return the router for all upload session routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Session-level routes
        .route("/uploads", post(create_upload))
        .route("/uploads/{id}", get(get_upload))
        .route("/uploads/{id}/complete", post(complete_upload))
        .route("/uploads/{id}/abort", post(abort_upload))
        // Part-level routes
        .route("/uploads/{id}/parts/{part_number}", put(register_part))
        .route(
            "/uploads/{id}/parts/{part_number}/presign",
            post(presign_part),
        )
}
