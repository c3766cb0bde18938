use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::client::ClientError;
use crate::manifest::FlagType;
use crate::metrics_consts::FLAG_REQUEST_ERROR_COUNTER;
use crate::metrics_utils::parse_exception_for_prometheus_label;

/// Response header advertising what this proxy lets callers do with the manifest.
pub const CAPABILITIES_HEADER: &str = "x-manifest-capabilities";
pub const CAPABILITIES: &str = "read,write,delete";

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[derive(Error, Debug)]
pub enum FlagError {
    #[error("invalid variant configuration: {0}")]
    InvalidVariants(String),
    #[error("defaultValue does not match flag type {0}")]
    InvalidDefaultValue(FlagType),
    #[error("flag not found: {0}")]
    FlagNotFound(String),
    #[error("flag with key \"{0}\" already exists")]
    FlagAlreadyExists(String),
    #[error("PostHog request failed: {0}")]
    PostHogError(#[from] ClientError),
}

impl FlagError {
    fn status_code(&self) -> StatusCode {
        match self {
            FlagError::InvalidVariants(_) | FlagError::InvalidDefaultValue(_) => {
                StatusCode::BAD_REQUEST
            }
            FlagError::FlagNotFound(_) => StatusCode::NOT_FOUND,
            FlagError::FlagAlreadyExists(_) => StatusCode::CONFLICT,
            FlagError::PostHogError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Vendor errors are logged and surfaced in `details`; the message stays generic.
    fn message(&self) -> String {
        match self {
            FlagError::PostHogError(_) => "PostHog request failed".to_string(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            FlagError::PostHogError(e) => Some(e.to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for FlagError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        metrics::counter!(
            FLAG_REQUEST_ERROR_COUNTER,
            "reason" => parse_exception_for_prometheus_label(&self)
        )
        .increment(1);

        let body = ErrorResponse {
            code: status.as_u16(),
            message: self.message(),
            details: self.details(),
        };

        (status, Json(body)).into_response()
    }
}
