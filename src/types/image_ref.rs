use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use crate::{GatewayError, Result};

/// Reference to generated image content.
///
/// Either an absolute `http(s)` URL or a `data:` URL; nothing else can be
/// constructed, so every stage downstream of an adapter can hand it to
/// [`ContentResolver`](crate::content::ContentResolver) without re-checking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ImageRef {
    Remote(reqwest::Url),
    Inline(String),
}

impl ImageRef {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if let Some(rest) = raw.strip_prefix("data:") {
            if !rest.contains(',') {
                return Err(GatewayError::DataUrl {
                    message: "missing comma separator".to_string(),
                });
            }
            return Ok(ImageRef::Inline(raw.to_string()));
        }

        let url = reqwest::Url::parse(raw).map_err(|err| {
            GatewayError::invalid_request(format!("invalid image reference {raw:?}: {err}"))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(ImageRef::Remote(url)),
            other => Err(GatewayError::invalid_request(format!(
                "unsupported image reference scheme {other:?}"
            ))),
        }
    }

    pub fn inline(media_type: &str, bytes: &[u8]) -> Self {
        ImageRef::Inline(format!("data:{media_type};base64,{}", BASE64.encode(bytes)))
    }

    pub fn svg(svg: &str) -> Self {
        Self::inline("image/svg+xml", svg.as_bytes())
    }

    pub fn as_str(&self) -> &str {
        match self {
            ImageRef::Remote(url) => url.as_str(),
            ImageRef::Inline(data) => data.as_str(),
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, ImageRef::Inline(_))
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ImageRef {
    type Error = GatewayError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<ImageRef> for String {
    fn from(value: ImageRef) -> Self {
        match value {
            ImageRef::Remote(url) => url.into(),
            ImageRef::Inline(data) => data,
        }
    }
}
