use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;

use crate::types::ImageRef;
use crate::utils::http::{MAX_RESPONSE_BODY_BYTES, response_bytes_capped};
use crate::{GatewayError, Result};

/// Raw image bytes plus the media type they were served with, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub bytes: Bytes,
    pub media_type: Option<String>,
}

impl ResolvedContent {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Turns an [`ImageRef`] into bytes: inline `data:` URLs are decoded in
/// place, remote URLs are fetched with a bounded GET.
#[derive(Clone)]
pub struct ContentResolver {
    http: reqwest::Client,
    timeout: Duration,
    max_bytes: usize,
}

impl std::fmt::Debug for ContentResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentResolver")
            .field("timeout", &self.timeout)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

impl ContentResolver {
    pub fn new(http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            http,
            timeout,
            max_bytes: MAX_RESPONSE_BODY_BYTES,
        }
    }

    /// Downloads larger than `max_bytes` are abandoned mid-stream.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn resolve(&self, reference: &ImageRef) -> Result<ResolvedContent> {
        match reference {
            ImageRef::Inline(data_url) => parse_data_url(data_url),
            ImageRef::Remote(url) => self.download(url.clone()).await,
        }
    }

    /// Parses `raw` as an [`ImageRef`] first; a malformed data URL is a
    /// parse error rather than a download error.
    pub async fn resolve_str(&self, raw: &str) -> Result<ResolvedContent> {
        let reference = ImageRef::parse(raw)?;
        self.resolve(&reference).await
    }

    async fn download(&self, url: reqwest::Url) -> Result<ResolvedContent> {
        tracing::debug!(url = %url, "downloading image content");
        let response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| download_error(&url, err))?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %url, status = status.as_u16(), "image download failed");
            return Err(GatewayError::Download {
                message: format!("fetch status: {}", status.as_u16()),
            });
        }

        let media_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let Some(bytes) = response_bytes_capped(response, self.max_bytes)
            .await
            .map_err(|err| download_error(&url, err))?
        else {
            tracing::warn!(url = %url, max_bytes = self.max_bytes, "image download too large");
            return Err(GatewayError::Download {
                message: format!("content exceeded max bytes ({})", self.max_bytes),
            });
        };
        tracing::debug!(url = %url, bytes = bytes.len(), "image content downloaded");
        Ok(ResolvedContent { bytes, media_type })
    }
}

fn download_error(url: &reqwest::Url, err: reqwest::Error) -> GatewayError {
    let message = if err.is_timeout() {
        format!("fetch of {url} timed out")
    } else {
        format!("fetch of {url} failed: {err}")
    };
    tracing::warn!(url = %url, error = %err, "image download failed");
    GatewayError::Download { message }
}

/// Decodes `data:<descriptor>,<payload>`.
///
/// A descriptor mentioning `base64` selects standard base64 decoding;
/// otherwise the payload bytes are taken literally.
pub fn parse_data_url(raw: &str) -> Result<ResolvedContent> {
    let rest = raw.strip_prefix("data:").ok_or_else(|| GatewayError::DataUrl {
        message: "missing data: prefix".to_string(),
    })?;
    let (descriptor, payload) = rest.split_once(',').ok_or_else(|| GatewayError::DataUrl {
        message: "missing comma separator".to_string(),
    })?;

    let bytes = if descriptor.contains("base64") {
        BASE64
            .decode(payload.trim())
            .map(Bytes::from)
            .map_err(|err| GatewayError::DataUrl {
                message: format!("invalid base64 payload: {err}"),
            })?
    } else {
        Bytes::copy_from_slice(payload.as_bytes())
    };

    let media_type = descriptor
        .split(';')
        .next()
        .map(str::trim)
        .filter(|media_type| !media_type.is_empty())
        .map(str::to_string);

    Ok(ResolvedContent { bytes, media_type })
}
