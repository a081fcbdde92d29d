//! Response envelope and error-to-HTTP conversion.
//!
//! Every JSON body the API returns has the shape
//! `{success, data?, error?: {code, message}, timestamp}`. Route handlers
//! return `Result<ApiResponse<T>, AppError>`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

/// Machine-readable code and message for a failed request.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

/// The JSON envelope shared by all API responses.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiErrorBody>,
    pub timestamp: String,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, data)
    }

    pub fn with_status(status: StatusCode, data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
            status,
        }
    }
}

impl ApiResponse<()> {
    /// A failure envelope with the given code and message.
    pub fn failure(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiErrorBody {
                code: code.to_string(),
                message: message.into(),
            }),
            timestamp: Utc::now().to_rfc3339(),
            status,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, axum::Json(&self)).into_response()
    }
}

/// Wrapper so we can implement `IntoResponse` for the core error type.
pub struct AppError {
    inner: streamforge_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: streamforge_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }
}

impl From<streamforge_core::Error> for AppError {
    fn from(e: streamforge_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let message = if self.inner.is_internal() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                request_id = ?self.request_id,
                "Unhandled error in API handler"
            );
            "An internal server error occurred".to_string()
        } else {
            if status.is_server_error() {
                tracing::error!(status = %status, error = %self.inner, "Server error in API handler");
            } else {
                tracing::warn!(code = self.inner.code(), error = %self.inner, "Application error");
            }
            self.inner.to_string()
        };

        ApiResponse::failure(status, self.inner.code(), message).into_response()
    }
}
