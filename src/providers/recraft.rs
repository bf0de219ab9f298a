use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::client::ProviderClient;
use super::{DEFAULT_IMAGE_SIZE, generate_image_id};
use crate::content::ContentResolver;
use crate::image::ImageProvider;
use crate::outcome::BestEffort;
use crate::profile::{DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_PROVIDER_TIMEOUT, ProviderSettings};
use crate::types::{
    GenerationRequest, GenerationResult, ImageRef, ImageResponseFormat, OutputFormat, ProviderId,
};
use crate::utils::http::send_checked_json;
use crate::{GatewayError, Result};

pub const DEFAULT_BASE_URL: &str = "https://external.api.recraft.ai";
pub const DEFAULT_GENERATE_ENDPOINT: &str = "/v1/images/generations";
pub const DEFAULT_VECTORIZE_ENDPOINT: &str = "/v1/images/vectorize";
pub const DEFAULT_MODEL: &str = "recraftv3";
pub const DEFAULT_SIZE: &str = "1024x1024";
pub const DEFAULT_STYLE: &str = "vector_illustration";

// Appended verbatim to every raster prompt: transparent background, no border.
const TRANSPARENT_BACKGROUND_DIRECTIVE: &str = ", 背景色为透明色，不要背景边框";

/// Part of the provider budget that vectorization never spends.
const VECTORIZE_RESERVE_DIVISOR: u32 = 10;
const MAX_VECTORIZE_RESERVE: Duration = Duration::from_secs(2);

/// Parses `"<W>x<H>"`; each axis falls back to 1024 independently when it
/// is missing, unparseable or zero.
pub fn parse_size(size: &str) -> (u32, u32) {
    let mut parts = size.trim().split('x');
    let (Some(width), Some(height), None) = (parts.next(), parts.next(), parts.next()) else {
        return (DEFAULT_IMAGE_SIZE, DEFAULT_IMAGE_SIZE);
    };
    let axis = |raw: &str| {
        raw.trim()
            .parse::<u32>()
            .ok()
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_IMAGE_SIZE)
    };
    (axis(width), axis(height))
}

/// Raster generation with an optional vectorization pass.
#[derive(Clone, Debug)]
pub struct Recraft {
    client: ProviderClient,
    resolver: ContentResolver,
    generate_endpoint: String,
    vectorize_endpoint: String,
    default_model: String,
    default_size: String,
    default_style: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    negative_prompt: Option<String>,
    style: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    substyle: Option<&'a str>,
    model: &'a str,
    size: &'a str,
    n: u32,
    response_format: ImageResponseFormat,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    created: Option<i64>,
    #[serde(default)]
    data: Vec<GeneratedImage>,
}

#[derive(Debug, Deserialize)]
struct GeneratedImage {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VectorizeResponse {
    image: VectorizedImage,
}

#[derive(Debug, Deserialize)]
struct VectorizedImage {
    url: String,
}

impl Recraft {
    pub fn new(api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::new();
        Self {
            client: ProviderClient::new(
                http.clone(),
                ProviderId::Recraft.as_str(),
                DEFAULT_BASE_URL,
                api_key,
                DEFAULT_PROVIDER_TIMEOUT,
            ),
            resolver: ContentResolver::new(http, DEFAULT_DOWNLOAD_TIMEOUT),
            generate_endpoint: DEFAULT_GENERATE_ENDPOINT.to_string(),
            vectorize_endpoint: DEFAULT_VECTORIZE_ENDPOINT.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            default_size: DEFAULT_SIZE.to_string(),
            default_style: DEFAULT_STYLE.to_string(),
        }
    }

    pub fn from_settings(
        settings: &ProviderSettings,
        api_key: impl Into<String>,
        resolver: ContentResolver,
        http: reqwest::Client,
    ) -> Self {
        let mut adapter = Self::new(api_key)
            .with_http_client(http)
            .with_resolver(resolver)
            .with_base_url(&settings.base_url)
            .with_timeout(settings.timeout);
        adapter.generate_endpoint = settings.generate_endpoint.clone();
        adapter.vectorize_endpoint = settings.vectorize_endpoint.clone();
        if let Some(model) = settings.default_model.as_deref().filter(|m| !m.trim().is_empty()) {
            adapter.default_model = model.to_string();
        }
        if !settings.default_size.trim().is_empty() {
            adapter.default_size = settings.default_size.clone();
        }
        if !settings.default_style.trim().is_empty() {
            adapter.default_style = settings.default_style.clone();
        }
        adapter
    }

    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.client.http = http;
        self
    }

    pub fn with_resolver(mut self, resolver: ContentResolver) -> Self {
        self.resolver = resolver;
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

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    async fn generate_raster(
        &self,
        request: &GenerationRequest,
        style: &str,
        size: &str,
    ) -> Result<(ImageRef, Option<i64>)> {
        let body = GenerateBody {
            prompt: format!("{}{TRANSPARENT_BACKGROUND_DIRECTIVE}", request.prompt),
            negative_prompt: request
                .negative_prompt()
                .map(|negative| format!("{negative}, ")),
            style,
            substyle: request.substyle(),
            model: request.model().unwrap_or(&self.default_model),
            size,
            n: request.n.unwrap_or(1),
            response_format: ImageResponseFormat::Url,
        };
        let response: GenerateResponse = self
            .client
            .post_json(&self.generate_endpoint, &body)
            .await?;

        let Some(image) = response.data.into_iter().next() else {
            tracing::warn!(provider = "recraft", "no images in response");
            return Err(GatewayError::invalid_response("recraft", "no images generated"));
        };
        let raster = match (image.url.as_deref(), image.b64_json.as_deref()) {
            (Some(url), _) if !url.trim().is_empty() => ImageRef::parse(url).map_err(|err| {
                GatewayError::invalid_response("recraft", format!("invalid image url: {err}"))
            })?,
            (_, Some(data)) if !data.trim().is_empty() => {
                ImageRef::Inline(format!("data:image/png;base64,{}", data.trim()))
            }
            _ => {
                return Err(GatewayError::invalid_response(
                    "recraft",
                    "image item is missing both url and b64_json",
                ));
            }
        };
        Ok((raster, response.created))
    }

    /// Time left for vectorization once phase 1 has used `elapsed`, keeping
    /// a reserve inside the provider budget.
    fn vectorize_budget(&self, elapsed: Duration) -> Duration {
        let budget = self.client.timeout();
        let reserve = (budget / VECTORIZE_RESERVE_DIVISOR).min(MAX_VECTORIZE_RESERVE);
        budget.saturating_sub(reserve).saturating_sub(elapsed)
    }

    /// Converts the raster into SVG; any failure, including running out of
    /// `budget`, keeps the raster reference.
    async fn vectorize(&self, raster: &ImageRef, budget: Duration) -> BestEffort<ImageRef> {
        let outcome = match tokio::time::timeout(budget, self.try_vectorize(raster)).await {
            Ok(outcome) => outcome.map_err(|err| err.reclassify_timeout("vectorize", budget)),
            Err(_) => Err(GatewayError::Timeout {
                stage: "vectorize",
                after: budget,
            }),
        };
        match outcome {
            Ok(svg) => BestEffort::ok(svg),
            Err(err) => {
                tracing::warn!(provider = "recraft", error = %err, "vectorization failed, keeping raster");
                BestEffort::degraded(raster.clone(), err)
            }
        }
    }

    async fn try_vectorize(&self, raster: &ImageRef) -> Result<ImageRef> {
        let content = self.resolver.resolve(raster).await?;
        let file = Part::bytes(content.bytes.to_vec())
            .file_name("image.png")
            .mime_str("image/png")?;
        let form = Form::new().part("file", file).text("response_format", "url");

        let response: VectorizeResponse = send_checked_json(
            self.client.label(),
            self.client.post(&self.vectorize_endpoint).multipart(form),
        )
        .await?;
        let svg = ImageRef::parse(&response.image.url)?;
        tracing::info!(provider = "recraft", svg_url = %svg, "image vectorized");
        Ok(svg)
    }
}

#[async_trait]
impl ImageProvider for Recraft {
    fn provider(&self) -> ProviderId {
        ProviderId::Recraft
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let style = request.style().unwrap_or(&self.default_style).to_string();
        let size = request.size().unwrap_or(&self.default_size).to_string();

        let started = Instant::now();
        let (raster, created) = self.generate_raster(request, &style, &size).await?;
        tracing::info!(provider = "recraft", png_url = %raster, "raster generated");

        let svg_url = if request.format == OutputFormat::Svg || style.contains("vector") {
            let budget = self.vectorize_budget(started.elapsed());
            self.vectorize(&raster, budget).await.into_value()
        } else {
            raster.clone()
        };

        let (width, height) = parse_size(&size);
        let created_at = created
            .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
            .unwrap_or_else(OffsetDateTime::now_utc);

        Ok(GenerationResult {
            id: generate_image_id(ProviderId::Recraft),
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt().unwrap_or_default().to_string(),
            style,
            svg_url,
            png_url: raster,
            width,
            height,
            created_at,
            provider: ProviderId::Recraft,
            translation: None,
        })
    }
}
