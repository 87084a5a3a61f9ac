//! Shared state handed to every request handler.

use crate::{errors::AppError, services::upload_service::{UploadError, UploadService}};

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    /// Include underlying error text in error responses (non-production only).
    pub expose_error_detail: bool,
}

impl AppState {
    pub fn new(uploads: UploadService, expose_error_detail: bool) -> Self {
        Self {
            uploads,
            expose_error_detail,
        }
    }

    /// Turn a service error into a response error under this deployment's
    /// detail policy.
    pub fn fail(&self, err: UploadError) -> AppError {
        AppError::from_upload(err, self.expose_error_detail)
    }
}
