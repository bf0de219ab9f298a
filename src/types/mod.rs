use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::{GatewayError, Result};

mod image_ref;

pub use image_ref::ImageRef;

pub const MIN_PROMPT_CHARS: usize = 3;

/// Upstream provider identifiers accepted by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    #[serde(alias = "svg.io", alias = "svg_io")]
    Svgio,
    Recraft,
    #[serde(alias = "open_ai")]
    Openai,
    Claude,
}

/// Wire-protocol family a provider belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// Structured vector-graphics generation API (returns hosted SVG/PNG URLs).
    StructuredImage,
    /// Raster generation followed by optional vectorization.
    Vectorize,
    /// Chat completion model that authors SVG markup directly.
    TextCompletion,
}

impl ProviderId {
    pub const ALL: [ProviderId; 4] = [
        ProviderId::Svgio,
        ProviderId::Recraft,
        ProviderId::Openai,
        ProviderId::Claude,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::Svgio => "svgio",
            ProviderId::Recraft => "recraft",
            ProviderId::Openai => "openai",
            ProviderId::Claude => "claude",
        }
    }

    pub fn family(self) -> ProviderFamily {
        match self {
            ProviderId::Svgio => ProviderFamily::StructuredImage,
            ProviderId::Recraft => ProviderFamily::Vectorize,
            ProviderId::Openai | ProviderId::Claude => ProviderFamily::TextCompletion,
        }
    }

    /// Only the structured image API expects English prompts; the others
    /// accept the source language unmodified.
    pub fn requires_translation(self) -> bool {
        self.family() == ProviderFamily::StructuredImage
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderId {
    type Err = GatewayError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "svgio" | "svg.io" | "svg_io" => Ok(ProviderId::Svgio),
            "recraft" => Ok(ProviderId::Recraft),
            "openai" | "open_ai" => Ok(ProviderId::Openai),
            "claude" => Ok(ProviderId::Claude),
            _ => Err(GatewayError::ProviderNotConfigured {
                provider: raw.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    /// Raw SVG bytes are wanted; providers that can vectorize should do so.
    #[serde(alias = "svg_inline")]
    Svg,
    #[default]
    #[serde(alias = "json", alias = "png")]
    Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageResponseFormat {
    #[serde(rename = "url")]
    Url,
    #[serde(rename = "b64_json")]
    Base64Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substyle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default)]
    pub skip_translate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "num_images")]
    pub n: Option<u32>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: None,
            style: None,
            substyle: None,
            provider: None,
            format: OutputFormat::default(),
            skip_translate: false,
            model: None,
            size: None,
            n: None,
        }
    }

    pub fn with_provider(mut self, provider: ProviderId) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        self.style = Some(style.into());
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = Some(negative_prompt.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let chars = self.prompt.trim().chars().count();
        if chars < MIN_PROMPT_CHARS {
            return Err(GatewayError::invalid_request(format!(
                "prompt must be at least {MIN_PROMPT_CHARS} characters"
            )));
        }
        if self.n == Some(0) {
            return Err(GatewayError::invalid_request("n must be at least 1"));
        }
        Ok(())
    }

    /// Copy of this request carrying a different prompt; the original stays
    /// untouched so provenance can still refer to it.
    pub fn with_prompt(&self, prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..self.clone()
        }
    }

    pub(crate) fn negative_prompt(&self) -> Option<&str> {
        non_blank(self.negative_prompt.as_deref())
    }

    pub(crate) fn style(&self) -> Option<&str> {
        non_blank(self.style.as_deref())
    }

    pub(crate) fn substyle(&self) -> Option<&str> {
        non_blank(self.substyle.as_deref())
    }

    pub(crate) fn model(&self) -> Option<&str> {
        non_blank(self.model.as_deref())
    }

    pub(crate) fn size(&self) -> Option<&str> {
        non_blank(self.size.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslationProvenance {
    pub original_prompt: String,
    pub translated_prompt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub style: String,
    pub svg_url: ImageRef,
    pub png_url: ImageRef,
    pub width: u32,
    pub height: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub provider: ProviderId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationProvenance>,
}

impl GenerationResult {
    pub fn with_translation(mut self, translation: Option<TranslationProvenance>) -> Self {
        self.translation = translation;
        self
    }

    pub fn was_translated(&self) -> bool {
        self.translation.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_length_counts_trimmed_chars() {
        assert!(GenerationRequest::new("  ab  ").validate().is_err());
        assert!(GenerationRequest::new("cat").validate().is_ok());
        assert!(GenerationRequest::new("小猫咪").validate().is_ok());

        let err = GenerationRequest::new("  ").validate().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn request_decodes_with_defaults() {
        let request: GenerationRequest = serde_json::from_value(serde_json::json!({
            "prompt": "a red fox",
            "provider": "recraft",
            "format": "svg",
            "num_images": 2
        }))
        .unwrap();

        assert_eq!(request.provider, Some(ProviderId::Recraft));
        assert_eq!(request.format, OutputFormat::Svg);
        assert_eq!(request.n, Some(2));
        assert!(!request.skip_translate);
        assert_eq!(request.style(), None);
    }

    #[test]
    fn unknown_provider_name_is_a_configuration_error() {
        let err = "midjourney".parse::<ProviderId>().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
        assert_eq!("SVG.IO".parse::<ProviderId>().unwrap(), ProviderId::Svgio);
    }

    #[test]
    fn only_structured_family_requires_translation() {
        let needing: Vec<_> = ProviderId::ALL
            .into_iter()
            .filter(|provider| provider.requires_translation())
            .collect();
        assert_eq!(needing, vec![ProviderId::Svgio]);
    }

    #[test]
    fn with_prompt_leaves_original_untouched() {
        let original = GenerationRequest::new("一只猫").with_style("FLAT_VECTOR");
        let translated = original.with_prompt("a cat");
        assert_eq!(original.prompt, "一只猫");
        assert_eq!(translated.prompt, "a cat");
        assert_eq!(translated.style(), Some("FLAT_VECTOR"));
    }
}
