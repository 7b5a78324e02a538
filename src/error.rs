use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VfsError {
    // Pre-dispatch errors, raised before any adapter call
    #[error("Mountpoint not found for '{0}'")]
    MountpointNotFound(String),

    #[error("Mountpoint '{0}' is read-only")]
    ReadOnly(String),

    #[error("Permission was denied for '{method}' in '{mount}'")]
    PermissionDenied { method: String, mount: String },

    #[error("VFS operation '{0}' is not valid for this mountpoint")]
    InvalidOperation(String),

    // Malformed input (missing required field, bad options payload, ...)
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthenticated(String),

    // Native I/O errors surfaced by an adapter
    #[error("{0}")]
    Adapter(#[from] io::Error),
}

impl VfsError {
    /// Maps the error tag to an HTTP status. Adapter errors go through the
    /// code table: ENOENT -> 404, EACCES -> 401, anything else -> 400.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MountpointNotFound(_)
            | Self::ReadOnly(_)
            | Self::PermissionDenied { .. }
            | Self::Unauthenticated(_) => StatusCode::FORBIDDEN,
            Self::InvalidOperation(_) => StatusCode::UNAUTHORIZED,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Adapter(err) => match err.kind() {
                io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
                io::ErrorKind::PermissionDenied => StatusCode::UNAUTHORIZED,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for VfsError {
    fn into_response(self) -> Response {
        tracing::error!("Generating response for VfsError: {:?}", self);

        let body = json!({ "error": self.to_string() });
        (self.status(), Json(body)).into_response()
    }
}
