//! Bridge error types.

use crate::vault::VaultError;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::time::Duration;
use thiserror::Error;
use vaultlink_core::BridgeReply;

/// Bridge server error types mapped to HTTP status codes.
///
/// Every variant renders as a [`BridgeReply`] carrying `error` and, when
/// known, the `requestId` it answers.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Forbidden(String),

    #[error("Too many requests")]
    RateLimited { wait: Duration },

    #[error("{message}")]
    BadRequest {
        request_id: Option<String>,
        message: String,
    },

    #[error("Not found")]
    NotFound,

    #[error("Vault did not respond in time")]
    Timeout { request_id: String },

    #[error("Payload too large")]
    PayloadTooLarge,

    #[error("Desktop app not ready")]
    NotReady { request_id: Option<String> },
}

impl ApiError {
    pub fn bad_request(request_id: Option<String>, message: impl Into<String>) -> Self {
        Self::BadRequest {
            request_id,
            message: message.into(),
        }
    }

    /// Map a vault correlation failure for `request_id`.
    pub fn from_vault(request_id: String, error: VaultError) -> Self {
        match error {
            VaultError::NotReady => Self::NotReady {
                request_id: Some(request_id),
            },
            VaultError::Timeout => Self::Timeout { request_id },
            VaultError::Duplicate => Self::bad_request(Some(request_id), "Duplicate requestId"),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Timeout { .. } => StatusCode::REQUEST_TIMEOUT,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn request_id(&self) -> Option<String> {
        match self {
            Self::BadRequest { request_id, .. } | Self::NotReady { request_id } => {
                request_id.clone()
            }
            Self::Timeout { request_id } => Some(request_id.clone()),
            _ => None,
        }
    }
}

/// Whole seconds until retry, rounded up.
fn wait_secs(wait: Duration) -> u64 {
    wait.as_secs() + u64::from(wait.subsec_nanos() > 0)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = BridgeReply::error(self.request_id(), self.to_string());

        let retry_after = match &self {
            Self::RateLimited { wait } => Some(wait_secs(*wait)),
            _ => None,
        };
        body.wait_time = retry_after;

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
