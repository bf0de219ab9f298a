use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use super::client::ProviderClient;
use super::{DEFAULT_IMAGE_SIZE, generate_image_id};
use crate::image::ImageProvider;
use crate::profile::{DEFAULT_PROVIDER_TIMEOUT, ProviderSettings};
use crate::svg::extract_svg;
use crate::types::{GenerationRequest, GenerationResult, ImageRef, ProviderId};
use crate::utils::http::send_checked_bytes;
use crate::{GatewayError, Result};

pub const DEFAULT_ENDPOINT: &str = "/chat/completions";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

const SYSTEM_PROMPT: &str = "You are an expert SVG illustration designer and vector artist. \
You produce valid, optimized SVG markup that renders identically in every browser, with strong \
composition, colour and visual hierarchy. You adapt to any requested style, from minimal line \
art to detailed illustration, and you structure documents with meaningful element ids and \
logical grouping.

When drawing you follow the requested subject, style and mood exactly, keep proportions and \
perspective correct, add details that lift the result, and keep the artwork crisp at any scale.

Respond with the SVG markup only: no explanations, no code fences, nothing before <svg> or \
after </svg>.";

const TECHNICAL_REQUIREMENTS: &str = "Technical requirements:
- Use viewBox=\"0 0 1024 1024\".
- The document must be self-contained and valid.
- Give elements semantic, descriptive ids (for example id=\"main-character\" or id=\"background-sky\").
- Group related elements with <g>.
- Choose colours that fit the subject and style; use gradients or shadows where they help.
- Center the illustration and keep it well composed inside the viewBox.

Output format:
Return only the complete SVG document, starting with <svg> and ending with </svg>.";

const PATH_ONLY_REQUIREMENT: &str =
    "Do not use primitive shape elements such as rect; draw everything with path elements.";

/// Backend flavour of the text-completion family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatVariant {
    /// System prompt as the first message; reply in `choices[].message.content`.
    OpenAi,
    /// Top-level `system` field and `anthropic-version` header; reply in `content[].text`.
    Claude,
}

impl ChatVariant {
    pub fn provider(self) -> ProviderId {
        match self {
            ChatVariant::OpenAi => ProviderId::Openai,
            ChatVariant::Claude => ProviderId::Claude,
        }
    }
}

/// Asks a chat model to author SVG markup and extracts it from the reply.
#[derive(Clone, Debug)]
pub struct ChatSvg {
    variant: ChatVariant,
    client: ProviderClient,
    endpoint: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatBody<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    #[serde(default)]
    content: Vec<ClaudeBlock>,
}

#[derive(Debug, Deserialize)]
struct ClaudeBlock {
    #[serde(default)]
    text: Option<String>,
}

impl ChatSvg {
    pub fn new(variant: ChatVariant, api_key: impl Into<String>) -> Self {
        let (base_url, model) = match variant {
            ChatVariant::OpenAi => ("https://api.openai.com/v1", "gpt-4o"),
            ChatVariant::Claude => ("https://api.anthropic.com/v1", "claude-sonnet-4-20250514"),
        };
        Self {
            variant,
            client: ProviderClient::new(
                reqwest::Client::new(),
                variant.provider().as_str(),
                base_url,
                api_key,
                DEFAULT_PROVIDER_TIMEOUT,
            ),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: model.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn openai(api_key: impl Into<String>) -> Self {
        Self::new(ChatVariant::OpenAi, api_key)
    }

    pub fn claude(api_key: impl Into<String>) -> Self {
        Self::new(ChatVariant::Claude, api_key)
    }

    pub fn from_settings(
        variant: ChatVariant,
        settings: &ProviderSettings,
        api_key: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let mut adapter = Self::new(variant, api_key)
            .with_http_client(http)
            .with_base_url(&settings.base_url)
            .with_timeout(settings.timeout)
            .with_sampling(settings.max_tokens, settings.temperature);
        if !settings.generate_endpoint.trim().is_empty() {
            adapter.endpoint = settings.generate_endpoint.clone();
        }
        if let Some(model) = settings.default_model.as_deref().filter(|m| !m.trim().is_empty()) {
            adapter.model = model.to_string();
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

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f64) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    fn user_prompt(&self, request: &GenerationRequest) -> String {
        let mut prompt = format!("Create a high-quality SVG illustration of: {}", request.prompt);
        if let Some(style) = request.style() {
            prompt.push_str(&format!("\n\nArtistic style and visual requirements: {style}"));
        }
        if let Some(negative) = request.negative_prompt() {
            prompt.push_str(&format!(
                "\n\nIMPORTANT - do NOT include these elements: {negative}"
            ));
        }
        prompt.push_str("\n\n");
        prompt.push_str(TECHNICAL_REQUIREMENTS);
        if self.variant == ChatVariant::OpenAi {
            prompt.push('\n');
            prompt.push_str(PATH_ONLY_REQUIREMENT);
        }
        prompt
    }

    async fn complete(&self, request: &GenerationRequest) -> Result<String> {
        let user_prompt = self.user_prompt(request);
        let model = request.model().unwrap_or(&self.model);
        let body = match self.variant {
            ChatVariant::OpenAi => ChatBody {
                model,
                system: None,
                messages: vec![
                    Message {
                        role: "system",
                        content: SYSTEM_PROMPT,
                    },
                    Message {
                        role: "user",
                        content: &user_prompt,
                    },
                ],
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
            ChatVariant::Claude => ChatBody {
                model,
                system: Some(SYSTEM_PROMPT),
                messages: vec![Message {
                    role: "user",
                    content: &user_prompt,
                }],
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };

        let mut req = self.client.post(&self.endpoint).json(&body);
        if self.variant == ChatVariant::Claude {
            req = req.header("anthropic-version", ANTHROPIC_VERSION);
        }
        let bytes = send_checked_bytes(self.client.label(), req).await?;

        completion_text(self.variant, &bytes).ok_or_else(|| {
            tracing::warn!(provider = %self.client.label(), "no text content in completion");
            GatewayError::invalid_response(self.client.label(), "no content in completion response")
        })
    }
}

/// Structured decode for the variant first, then a schema-agnostic search.
fn completion_text(variant: ChatVariant, body: &[u8]) -> Option<String> {
    let structured = match variant {
        ChatVariant::OpenAi => serde_json::from_slice::<OpenAiResponse>(body)
            .ok()
            .and_then(|response| response.choices.into_iter().next())
            .and_then(|choice| choice.message.content),
        ChatVariant::Claude => serde_json::from_slice::<ClaudeResponse>(body)
            .ok()
            .and_then(|response| response.content.into_iter().find_map(|block| block.text)),
    };
    if let Some(text) = structured.filter(|text| !text.trim().is_empty()) {
        return Some(text);
    }

    let value = serde_json::from_slice::<Value>(body).ok()?;
    tracing::debug!(?variant, "structured decode failed, trying generic completion shape");
    [
        value.pointer("/choices/0/message/content"),
        value.get("content"),
        value.get("text"),
    ]
    .into_iter()
    .flatten()
    .filter_map(Value::as_str)
    .find(|text| !text.trim().is_empty())
    .map(str::to_string)
}

#[async_trait]
impl ImageProvider for ChatSvg {
    fn provider(&self) -> ProviderId {
        self.variant.provider()
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        let provider = self.variant.provider();
        let completion = self.complete(request).await?;
        let Some(svg) = extract_svg(&completion) else {
            tracing::warn!(provider = %provider, chars = completion.len(), "completion held no svg");
            return Err(GatewayError::invalid_response(
                provider.as_str(),
                "no valid SVG generated",
            ));
        };

        let id = generate_image_id(provider);
        tracing::info!(provider = %provider, id = %id, bytes = svg.len(), "svg generated");
        let svg_url = ImageRef::svg(&svg);
        Ok(GenerationResult {
            id,
            prompt: request.prompt.clone(),
            negative_prompt: request.negative_prompt().unwrap_or_default().to_string(),
            style: request.style().unwrap_or_default().to_string(),
            png_url: svg_url.clone(),
            svg_url,
            width: DEFAULT_IMAGE_SIZE,
            height: DEFAULT_IMAGE_SIZE,
            created_at: OffsetDateTime::now_utc(),
            provider,
            translation: None,
        })
    }
}
