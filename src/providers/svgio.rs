use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::client::ProviderClient;
use super::generate_image_id;
use crate::image::ImageProvider;
use crate::profile::{DEFAULT_PROVIDER_TIMEOUT, ProviderSettings};
use crate::types::{GenerationRequest, GenerationResult, ImageRef, ProviderId};
use crate::{GatewayError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.svg.io";
pub const DEFAULT_GENERATE_ENDPOINT: &str = "/v1/generate";

/// Sentinels the API expects in place of absent fields.
const NO_NEGATIVE_PROMPT: &str = "NULL";
const DEFAULT_STYLE: &str = "FLAT_VECTOR";

/// Structured vector-graphics API returning hosted SVG and PNG renditions.
#[derive(Clone, Debug)]
pub struct SvgIo {
    client: ProviderClient,
    generate_endpoint: String,
    default_style: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    style: &'a str,
    // Must serialize as explicit nulls; an empty string is rejected upstream.
    initial_image: Option<()>,
    initial_image_type: Option<()>,
}

#[derive(Debug, Deserialize)]
struct GenerateEnvelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<GeneratedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeneratedItem {
    #[serde(default)]
    id: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    negative_prompt: String,
    #[serde(default)]
    style: String,
    #[serde(default)]
    svg_url: String,
    #[serde(default)]
    png_url: String,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    created_at: String,
}

impl SvgIo {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: ProviderClient::new(
                reqwest::Client::new(),
                ProviderId::Svgio.as_str(),
                DEFAULT_BASE_URL,
                api_key,
                DEFAULT_PROVIDER_TIMEOUT,
            ),
            generate_endpoint: DEFAULT_GENERATE_ENDPOINT.to_string(),
            default_style: DEFAULT_STYLE.to_string(),
        }
    }

    pub fn from_settings(
        settings: &ProviderSettings,
        api_key: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let mut adapter = Self::new(api_key)
            .with_http_client(http)
            .with_base_url(&settings.base_url)
            .with_timeout(settings.timeout)
            .with_generate_endpoint(&settings.generate_endpoint);
        if !settings.default_style.trim().is_empty() {
            adapter.default_style = settings.default_style.clone();
        }
        adapter
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.client.http = http;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.client = self.client.with_base_url(base_url);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }

    pub fn with_generate_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.generate_endpoint = endpoint.into();
        self
    }
}

#[async_trait]
impl ImageProvider for SvgIo {
    fn provider(&self) -> ProviderId {
        ProviderId::Svgio
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let body = GenerateBody {
            prompt: &request.prompt,
            negative_prompt: request.negative_prompt().unwrap_or(NO_NEGATIVE_PROMPT),
            style: request.style().unwrap_or(&self.default_style),
            initial_image: None,
            initial_image_type: None,
        };
        let envelope: GenerateEnvelope = self
            .client
            .post_json(&self.generate_endpoint, &body)
            .await?;

        if !envelope.success || envelope.data.is_empty() {
            tracing::warn!(
                provider = "svgio",
                success = envelope.success,
                data_count = envelope.data.len(),
                "upstream returned no data"
            );
            return Err(GatewayError::invalid_response("svgio", "upstream no data"));
        }
        let Some(item) = envelope.data.into_iter().next() else {
            return Err(GatewayError::invalid_response("svgio", "upstream no data"));
        };
        tracing::info!(provider = "svgio", id = %item.id, "image generated");
        into_result(item, request)
    }
}

fn into_result(item: GeneratedItem, request: &GenerationRequest) -> Result<GenerationResult> {
    let svg_url = ImageRef::parse(&item.svg_url).map_err(|err| {
        GatewayError::invalid_response("svgio", format!("invalid svgUrl: {err}"))
    })?;
    let png_url = if item.png_url.trim().is_empty() {
        svg_url.clone()
    } else {
        ImageRef::parse(&item.png_url).map_err(|err| {
            GatewayError::invalid_response("svgio", format!("invalid pngUrl: {err}"))
        })?
    };
    let created_at = OffsetDateTime::parse(&item.created_at, &Rfc3339).unwrap_or_else(|err| {
        tracing::debug!(provider = "svgio", created_at = %item.created_at, error = %err, "unparseable createdAt");
        OffsetDateTime::UNIX_EPOCH
    });

    Ok(GenerationResult {
        id: if item.id.is_empty() {
            generate_image_id(ProviderId::Svgio)
        } else {
            item.id
        },
        prompt: if item.prompt.is_empty() {
            request.prompt.clone()
        } else {
            item.prompt
        },
        negative_prompt: item.negative_prompt,
        style: item.style,
        svg_url,
        png_url,
        width: item.width,
        height: item.height,
        created_at,
        provider: ProviderId::Svgio,
        translation: None,
    })
}
