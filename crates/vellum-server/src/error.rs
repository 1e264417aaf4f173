//! Server and API error types.
//!
//! Every API failure is rendered as `{"error": "..."}` with a status
//! code derived from the underlying extension system error: validation
//! problems map to 400, missing or inactive extensions to 404 and
//! everything else to 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use vellum_core::extension_system::{ExtensionSystemError, StoreError};
use vellum_core::KernelError;

/// Fatal startup errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Kernel(#[from] KernelError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An error rendered to an API client.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ExtensionSystemError> for ApiError {
    fn from(err: ExtensionSystemError) -> Self {
        let status = match &err {
            ExtensionSystemError::MissingSlug { .. }
            | ExtensionSystemError::InvalidSlug { .. }
            | ExtensionSystemError::Archive { .. }
            | ExtensionSystemError::Manifest { .. }
            | ExtensionSystemError::NotSupported { .. } => StatusCode::BAD_REQUEST,
            ExtensionSystemError::NotFound { .. } | ExtensionSystemError::RouteNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            ExtensionSystemError::Inactive { kind, .. } => {
                // Kept terse for API compatibility with older clients.
                return Self {
                    status: StatusCode::NOT_FOUND,
                    message: match kind {
                        vellum_core::ExtensionKind::Plugin => "Plugin inactive".to_string(),
                        vellum_core::ExtensionKind::Theme => "Theme inactive".to_string(),
                    },
                };
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::internal(err.to_string())
    }
}

impl From<KernelError> for ApiError {
    fn from(err: KernelError) -> Self {
        match err {
            KernelError::ExtensionSystem(e) => e.into(),
            other => Self::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("request failed: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
