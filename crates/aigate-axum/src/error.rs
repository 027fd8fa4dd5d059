//! Axum-specific error types and mappings.
//!
//! Maps [`GatewayError`] to HTTP status codes and JSON bodies of the form
//! `{ "error": "...", "code"?: "...", "details"?: { field: reason } }`.
//! Only validation failures carry details; upstream failures always answer
//! with the same generic message.

use std::collections::BTreeMap;

use aigate_core::GatewayError;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Generic 500 message. The underlying cause is only logged.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Axum-specific error type.
#[derive(Debug, Error)]
pub enum HttpError {
    /// A pipeline stage rejected or failed the request.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// No route matched.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure inside the adapter itself.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a BTreeMap<String, String>>,
}

impl HttpError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Gateway(err) => StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            Self::Gateway(GatewayError::MethodNotAllowed) => ErrorBody {
                error: "Method not allowed",
                code: Some("method_not_allowed"),
                details: None,
            },
            Self::Gateway(GatewayError::Unauthorized) => ErrorBody {
                error: "Unauthorized",
                code: Some("unauthorized"),
                details: None,
            },
            Self::Gateway(GatewayError::RateLimited { .. }) => ErrorBody {
                error: "Too many requests",
                code: Some("rate_limited"),
                details: None,
            },
            Self::Gateway(GatewayError::ValidationFailed(err)) => ErrorBody {
                error: "Invalid request",
                code: Some(err.code()),
                details: Some(err.details()),
            },
            Self::Gateway(GatewayError::PayloadTooLarge { .. }) => ErrorBody {
                error: "Request body too large",
                code: Some("payload_too_large"),
                details: None,
            },
            Self::NotFound(_) => ErrorBody {
                error: "Not found",
                code: Some("not_found"),
                details: None,
            },
            Self::Gateway(GatewayError::UpstreamFailure(_)) | Self::Internal(_) => ErrorBody {
                error: INTERNAL_ERROR_MESSAGE,
                code: None,
                details: None,
            },
        };

        let mut response = (status, axum::Json(body)).into_response();

        match &self {
            Self::Gateway(GatewayError::Unauthorized) => {
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
            }
            Self::Gateway(err @ GatewayError::RateLimited { .. }) => {
                if let Some(secs) = err.retry_after_secs() {
                    response
                        .headers_mut()
                        .insert(header::RETRY_AFTER, HeaderValue::from(secs));
                }
            }
            _ => {}
        }

        response
    }
}
