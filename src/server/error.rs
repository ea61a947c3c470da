//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`cadenza_core::Error`] so that route
//! handlers can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
pub struct AppError {
    inner: cadenza_core::Error,
}

impl AppError {
    pub fn new(inner: cadenza_core::Error) -> Self {
        Self { inner }
    }
}

impl From<cadenza_core::Error> for AppError {
    fn from(e: cadenza_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() && !self.inner.is_retryable() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                "Server error in handler"
            );
        }

        let code = match &self.inner {
            cadenza_core::Error::NotFound { .. } => "not_found",
            cadenza_core::Error::Forbidden(_) => "forbidden",
            cadenza_core::Error::Validation(_) => "validation_error",
            cadenza_core::Error::Unavailable(_) => "not_ready",
            cadenza_core::Error::Tool { .. } => "tool_error",
            cadenza_core::Error::Chain { .. } => "chain_error",
            cadenza_core::Error::Io { .. } => "io_error",
            cadenza_core::Error::Internal(_) => "internal_error",
        };

        let body = json!({
            "error": self.inner.to_string(),
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_produces_404() {
        let err = AppError::new(cadenza_core::Error::not_found("media", "abc"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn unavailable_produces_503() {
        let err = AppError::new(cadenza_core::Error::Unavailable("segment 3".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn forbidden_produces_403() {
        let err = AppError::new(cadenza_core::Error::Forbidden("bad token".into()));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
