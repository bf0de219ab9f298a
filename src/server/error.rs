use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::{ErrorKind, GatewayError};

/// JSON error envelope returned for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

pub(super) fn error_response(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    details: Option<String>,
) -> Response {
    (
        status,
        Json(ErrorResponse {
            code: code.to_string(),
            message: message.into(),
            details,
        }),
    )
        .into_response()
}

pub(super) fn status_and_code(err: &GatewayError) -> (StatusCode, &'static str) {
    match err.kind() {
        ErrorKind::Validation => (StatusCode::BAD_REQUEST, "invalid_argument"),
        ErrorKind::Configuration => match err {
            GatewayError::ProviderNotConfigured { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "provider_not_configured")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error"),
        },
        ErrorKind::Upstream => (StatusCode::BAD_GATEWAY, "upstream_error"),
        ErrorKind::Timeout => (StatusCode::GATEWAY_TIMEOUT, "upstream_timeout"),
        ErrorKind::Download => (StatusCode::BAD_GATEWAY, "download_error"),
        ErrorKind::Parse => (StatusCode::INTERNAL_SERVER_ERROR, "parse_error"),
    }
}

fn summary(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "invalid request",
        ErrorKind::Configuration => "provider unavailable",
        ErrorKind::Upstream | ErrorKind::Timeout => "failed to generate image",
        ErrorKind::Download => "failed to download generated svg",
        ErrorKind::Parse => "failed to parse data url",
    }
}

pub(super) fn gateway_error_response(err: &GatewayError) -> Response {
    let (status, code) = status_and_code(err);
    if status.is_server_error() {
        tracing::warn!(%status, code, error = %err, "request failed");
    } else {
        tracing::debug!(%status, code, error = %err, "request rejected");
    }
    // Validation messages are already user-facing.
    let message = match err {
        GatewayError::InvalidRequest { reason } => reason.clone(),
        other => summary(other.kind()).to_string(),
    };
    error_response(status, code, message, Some(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn kinds_map_to_statuses() {
        let cases = [
            (
                GatewayError::invalid_request("prompt too short"),
                StatusCode::BAD_REQUEST,
                "invalid_argument",
            ),
            (
                GatewayError::ProviderNotConfigured {
                    provider: "claude".to_string(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
                "provider_not_configured",
            ),
            (
                GatewayError::Config("bad".to_string()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "configuration_error",
            ),
            (
                GatewayError::invalid_response("svgio", "upstream no data"),
                StatusCode::BAD_GATEWAY,
                "upstream_error",
            ),
            (
                GatewayError::Timeout {
                    stage: "generation",
                    after: Duration::from_secs(60),
                },
                StatusCode::GATEWAY_TIMEOUT,
                "upstream_timeout",
            ),
            (
                GatewayError::Download {
                    message: "fetch status: 404".to_string(),
                },
                StatusCode::BAD_GATEWAY,
                "download_error",
            ),
            (
                GatewayError::DataUrl {
                    message: "missing comma".to_string(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
                "parse_error",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(status_and_code(&err), (status, code), "{err}");
        }
    }
}
