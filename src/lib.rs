//! Coordinates client-driven multipart uploads to an S3-compatible object
//! store: sessions, presigned part URLs, part registration, finalize, abort.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod remote;
pub mod routes;
pub mod services;
pub mod state;
