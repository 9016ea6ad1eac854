//! Error types for web handlers.
//!
//! Bridges [`iam_core::error::Error`]'s taxonomy to HTTP responses,
//! implementing axum's `IntoResponse` (spec §7, §4.8: "translating typed
//! errors into wire status codes").

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use iam_core::error::{Error as CoreError, Kind};
use serde::Serialize;
use std::fmt;

/// Application error type for web handlers: an HTTP status plus the
/// [`Kind`]/`stable_code`/message triple every internal error already
/// carries.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    stable_code: String,
    message: String,
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Build an error directly, bypassing [`Kind`] mapping.
    #[must_use]
    pub fn new(status: StatusCode, stable_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            stable_code: stable_code.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Attach an underlying cause, logged but never exposed to the client.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Map a [`Kind`] to its wire status code (spec §7).
    #[must_use]
    pub const fn status_for(kind: Kind) -> StatusCode {
        match kind {
            Kind::InvalidArgument => StatusCode::BAD_REQUEST,
            Kind::NotFound => StatusCode::NOT_FOUND,
            Kind::AlreadyExists => StatusCode::CONFLICT,
            Kind::FailedPrecondition => StatusCode::CONFLICT,
            Kind::PermissionDenied => StatusCode::FORBIDDEN,
            Kind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Kind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoreError> for AppError {
    fn from(error: CoreError) -> Self {
        let status = Self::status_for(error.kind);
        Self {
            status,
            stable_code: error.stable_code.to_string(),
            message: error.message.clone(),
            source: error.source.map(|source| anyhow::anyhow!(source.to_string())),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stable_code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON wire shape, spec §6).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(rename = "stableCode")]
    stable_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = %self.status,
                stable_code = %self.stable_code,
                message = %self.message,
                error = self.source.as_ref().map(ToString::to_string),
                "internal server error"
            );
        }

        let body = ErrorResponse {
            code: self.status.as_str().to_string(),
            message: self.message,
            stable_code: self.stable_code,
        };

        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_maps_to_404() {
        let error = AppError::from(CoreError::not_found("COMMAND-Org2", "organization not found"));
        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.stable_code, "COMMAND-Org2");
    }

    #[test]
    fn already_exists_maps_to_409() {
        let error = AppError::from(CoreError::already_exists("COMMAND-Org1", "exists"));
        assert_eq!(error.status, StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_argument_maps_to_400() {
        let error = AppError::from(CoreError::invalid_argument("COMMAND-Org1", "bad input"));
        assert_eq!(error.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unavailable_maps_to_503() {
        let error = AppError::from(CoreError::unavailable("EVENTSTORE-Push1", "db down"));
        assert_eq!(error.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn display_includes_stable_code() {
        let error = AppError::from(CoreError::invalid_argument("COMMAND-Org1", "bad input"));
        assert_eq!(error.to_string(), "[COMMAND-Org1] bad input");
    }
}
