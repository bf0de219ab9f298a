use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },
    #[error("provider not configured: {provider}")]
    ProviderNotConfigured { provider: String },
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{provider} api error ({status}): {body}")]
    Api {
        provider: String,
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse { provider: String, message: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{stage} timed out after {}ms", .after.as_millis())]
    Timeout { stage: &'static str, after: Duration },
    #[error("download failed: {message}")]
    Download { message: String },
    #[error("malformed data url: {message}")]
    DataUrl { message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outward classification of a [`GatewayError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Configuration,
    Upstream,
    Timeout,
    Download,
    Parse,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Upstream => "upstream",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Download => "download",
            ErrorKind::Parse => "parse",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl GatewayError {
    pub(crate) fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_response(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::InvalidRequest { .. } => ErrorKind::Validation,
            GatewayError::ProviderNotConfigured { .. }
            | GatewayError::Config(_)
            | GatewayError::Io(_) => ErrorKind::Configuration,
            GatewayError::Http(err) if err.is_timeout() => ErrorKind::Timeout,
            GatewayError::Api { .. }
            | GatewayError::InvalidResponse { .. }
            | GatewayError::Http(_)
            | GatewayError::Json(_) => ErrorKind::Upstream,
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::Download { .. } => ErrorKind::Download,
            GatewayError::DataUrl { .. } => ErrorKind::Parse,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Folds transport-level deadline errors into [`GatewayError::Timeout`]
    /// so callers see one variant regardless of which layer gave up first.
    pub(crate) fn reclassify_timeout(self, stage: &'static str, after: Duration) -> Self {
        match self {
            GatewayError::Http(err) if err.is_timeout() => {
                tracing::debug!(stage, error = %err, "transport deadline exceeded");
                GatewayError::Timeout { stage, after }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_variants() {
        assert_eq!(
            GatewayError::invalid_request("short").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            GatewayError::ProviderNotConfigured {
                provider: "recraft".to_string()
            }
            .kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            GatewayError::invalid_response("svgio", "upstream no data").kind(),
            ErrorKind::Upstream
        );
        assert_eq!(
            GatewayError::Timeout {
                stage: "generation",
                after: Duration::from_secs(1)
            }
            .kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            GatewayError::Download {
                message: "fetch status: 404".to_string()
            }
            .kind(),
            ErrorKind::Download
        );
        assert_eq!(
            GatewayError::DataUrl {
                message: "missing comma".to_string()
            }
            .kind(),
            ErrorKind::Parse
        );
    }

    #[test]
    fn timeout_message_includes_stage() {
        let err = GatewayError::Timeout {
            stage: "translation",
            after: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "translation timed out after 250ms");
    }
}
