//! Core data models for the upload session service.
//!
//! These entities map to database tables via `sqlx::FromRow` and serialize
//! as JSON via `serde`.

pub mod part;
pub mod session;
