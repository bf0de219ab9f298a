//! Prompt translation ahead of providers that only understand English.
//!
//! Translation is best effort: every failure hands back the original prompt
//! together with the error, and generation proceeds.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::outcome::BestEffort;
use crate::profile::{DEFAULT_TRANSLATION_TIMEOUT, Env, TranslationConfig};
use crate::providers::client::ProviderClient;
use crate::types::{ProviderId, TranslationProvenance};
use crate::{GatewayError, Result};

const TRANSLATION_MAX_TOKENS: u32 = 150;
const TRANSLATION_TEMPERATURE: f32 = 0.3;

const TRANSLATION_INSTRUCTION: &str = "Translate the following text into English. Preserve its \
original meaning and make it suitable as a prompt for AI image generation. Return only the \
translation, with no explanation:";

/// True when `text` has a code point in the CJK Unified Ideographs block.
pub fn contains_cjk(text: &str) -> bool {
    text.chars().any(|c| ('\u{4e00}'..='\u{9fff}').contains(&c))
}

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str) -> Result<String>;
}

/// Translation backend speaking the chat-completions wire format.
#[derive(Clone, Debug)]
pub struct ChatTranslator {
    client: ProviderClient,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    error: Option<ChatError>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: ChatChoiceMessage,
}

#[derive(Debug, Default, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatError {
    #[serde(default)]
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl ChatTranslator {
    pub fn new(
        http: reqwest::Client,
        service_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client: ProviderClient::new(
                http,
                "translation",
                service_url,
                api_key,
                DEFAULT_TRANSLATION_TIMEOUT,
            ),
            model: model.into(),
        }
    }

    /// `None` when translation is disabled or no credential is available.
    pub fn from_config(
        config: &TranslationConfig,
        env: &Env,
        http: reqwest::Client,
    ) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let Some(api_key) = env.get(&config.api_key_env) else {
            tracing::info!(
                key = %config.api_key_env,
                "translation disabled: no credential configured"
            );
            return None;
        };
        Some(
            Self::new(http, &config.service_url, api_key, &config.default_model)
                .with_timeout(config.timeout),
        )
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = self.client.with_timeout(timeout);
        self
    }
}

#[async_trait]
impl Translator for ChatTranslator {
    async fn translate(&self, text: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: format!("{TRANSLATION_INSTRUCTION}\n\n{text}"),
            }],
            max_tokens: TRANSLATION_MAX_TOKENS,
            temperature: TRANSLATION_TEMPERATURE,
        };
        let response: ChatResponse = self.client.post_json("", &request).await?;

        if let Some(error) = response.error {
            let kind = error.kind.as_deref().unwrap_or("unknown");
            return Err(GatewayError::invalid_response(
                self.client.label(),
                format!("translation api error ({kind}): {}", error.message),
            ));
        }
        let choice = response.choices.into_iter().next().ok_or_else(|| {
            GatewayError::invalid_response(self.client.label(), "no translation choices returned")
        })?;
        let translated = choice.message.content.trim().to_string();
        if translated.is_empty() {
            return Err(GatewayError::invalid_response(
                self.client.label(),
                "empty translation returned",
            ));
        }
        Ok(translated)
    }
}

/// Prompt text after the gate, and whether it differs from the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPrompt {
    pub text: String,
    pub translated: bool,
}

impl TranslatedPrompt {
    fn unchanged(prompt: &str) -> Self {
        Self {
            text: prompt.to_string(),
            translated: false,
        }
    }

    pub fn provenance(&self, original: &str) -> Option<TranslationProvenance> {
        self.translated.then(|| TranslationProvenance {
            original_prompt: original.to_string(),
            translated_prompt: self.text.clone(),
        })
    }
}

#[derive(Clone)]
pub struct TranslationGate {
    translator: Option<Arc<dyn Translator>>,
    timeout: Duration,
}

impl std::fmt::Debug for TranslationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslationGate")
            .field("enabled", &self.translator.is_some())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl TranslationGate {
    pub fn new(translator: Option<Arc<dyn Translator>>, timeout: Duration) -> Self {
        Self {
            translator,
            timeout,
        }
    }

    pub fn disabled() -> Self {
        Self::new(None, Duration::ZERO)
    }

    pub fn is_enabled(&self) -> bool {
        self.translator.is_some()
    }

    pub async fn translate(
        &self,
        prompt: &str,
        provider: ProviderId,
        skip_translate: bool,
    ) -> BestEffort<TranslatedPrompt> {
        let Some(translator) = self.translator.as_ref() else {
            return BestEffort::ok(TranslatedPrompt::unchanged(prompt));
        };
        if skip_translate || !provider.requires_translation() || !contains_cjk(prompt) {
            return BestEffort::ok(TranslatedPrompt::unchanged(prompt));
        }

        tracing::debug!(provider = %provider, prompt, "translating prompt");
        let outcome = match tokio::time::timeout(self.timeout, translator.translate(prompt)).await
        {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(err)) => Err(err.reclassify_timeout("translation", self.timeout)),
            Err(_) => Err(GatewayError::Timeout {
                stage: "translation",
                after: self.timeout,
            }),
        };

        match outcome {
            Ok(text) if text == prompt => BestEffort::ok(TranslatedPrompt::unchanged(prompt)),
            Ok(text) => {
                tracing::debug!(provider = %provider, translated = %text, "prompt translated");
                BestEffort::ok(TranslatedPrompt {
                    text,
                    translated: true,
                })
            }
            Err(err) => BestEffort::degraded(TranslatedPrompt::unchanged(prompt), err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use httpmock::{Method::POST, MockServer};

    use super::*;
    use crate::ErrorKind;
    use crate::utils::test_support::loopback_unavailable;

    struct StubTranslator {
        reply: std::result::Result<&'static str, &'static str>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl StubTranslator {
        fn replying(reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(message: &'static str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err(message),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Translator for StubTranslator {
        async fn translate(&self, _text: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            match self.reply {
                Ok(text) => Ok(text.to_string()),
                Err(message) => Err(GatewayError::invalid_response("translation", message)),
            }
        }
    }

    fn gate(translator: Arc<StubTranslator>) -> TranslationGate {
        TranslationGate::new(Some(translator), Duration::from_secs(5))
    }

    #[test]
    fn cjk_detection_uses_unified_ideographs() {
        assert!(contains_cjk("一只猫"));
        assert!(contains_cjk("a cat 猫"));
        assert!(!contains_cjk("a cat"));
        assert!(!contains_cjk("ねこ"));
    }

    #[tokio::test]
    async fn non_cjk_prompt_passes_through_with_backend_configured() {
        let translator = StubTranslator::replying("should not be used");
        let outcome = gate(translator.clone())
            .translate("a red fox", ProviderId::Svgio, false)
            .await;
        assert!(!outcome.is_degraded());
        assert_eq!(outcome.value().text, "a red fox");
        assert!(!outcome.value().translated);
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cjk_prompt_is_translated() {
        let outcome = gate(StubTranslator::replying("a little cat"))
            .translate("一只小猫", ProviderId::Svgio, false)
            .await;
        let translated = outcome.into_value();
        assert!(translated.translated);
        assert_eq!(translated.text, "a little cat");
        let provenance = translated.provenance("一只小猫").unwrap();
        assert_eq!(provenance.original_prompt, "一只小猫");
        assert_eq!(provenance.translated_prompt, "a little cat");
    }

    #[tokio::test]
    async fn opt_out_and_native_providers_skip_backend() {
        let translator = StubTranslator::replying("a cat");
        let gate = gate(translator.clone());

        let skipped = gate.translate("一只猫", ProviderId::Svgio, true).await;
        assert!(!skipped.value().translated);

        for provider in [ProviderId::Recraft, ProviderId::Openai, ProviderId::Claude] {
            let outcome = gate.translate("一只猫", provider, false).await;
            assert_eq!(outcome.value().text, "一只猫");
        }
        assert_eq!(translator.calls.load(Ordering::SeqCst), 0);

        let disabled = TranslationGate::disabled()
            .translate("一只猫", ProviderId::Svgio, false)
            .await;
        assert!(!disabled.is_degraded());
        assert!(!disabled.value().translated);
    }

    #[tokio::test]
    async fn backend_failure_degrades_to_original_prompt() {
        let outcome = gate(StubTranslator::failing("quota exceeded"))
            .translate("一只猫", ProviderId::Svgio, false)
            .await;
        assert!(outcome.is_degraded());
        let (value, error) = outcome.into_parts();
        assert_eq!(value.text, "一只猫");
        assert!(!value.translated);
        assert_eq!(error.unwrap().kind(), ErrorKind::Upstream);
    }

    #[tokio::test]
    async fn identical_translation_is_not_marked_translated() {
        let outcome = gate(StubTranslator::replying("猫 cat"))
            .translate("猫 cat", ProviderId::Svgio, false)
            .await;
        assert!(!outcome.is_degraded());
        assert!(!outcome.value().translated);
        assert_eq!(outcome.value().provenance("猫 cat"), None);
    }

    #[tokio::test]
    async fn slow_backend_is_a_soft_timeout() {
        let translator = Arc::new(StubTranslator {
            reply: Ok("late"),
            delay: Duration::from_millis(500),
            calls: AtomicUsize::new(0),
        });
        let gate = TranslationGate::new(Some(translator), Duration::from_millis(20));
        let outcome = gate.translate("一只猫", ProviderId::Svgio, false).await;
        assert_eq!(outcome.value().text, "一只猫");
        assert_eq!(outcome.soft_failure().unwrap().kind(), ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn chat_translator_sends_fixed_parameters() {
        if loopback_unavailable() {
            return;
        }
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .header("authorization", "Bearer tr-key")
                    .body_includes("\"max_tokens\":150")
                    .body_includes("\"temperature\":0.3")
                    .body_includes("\"model\":\"gpt-3.5-turbo\"")
                    .body_includes("一只猫");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"choices":[{"message":{"role":"assistant","content":"  a cat \n"}}]}"#);
            })
            .await;

        let translator = ChatTranslator::new(
            reqwest::Client::new(),
            server.url("/v1/chat/completions"),
            "tr-key",
            "gpt-3.5-turbo",
        );
        let text = translator.translate("一只猫").await.unwrap();
        mock.assert_async().await;
        assert_eq!(text, "a cat");
    }

    #[tokio::test]
    async fn chat_translator_reports_error_objects_and_empty_choices() {
        if loopback_unavailable() {
            return;
        }
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/error");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"error":{"message":"model overloaded","type":"server_error"}}"#);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/empty");
                then.status(200)
                    .header("content-type", "application/json")
                    .body(r#"{"choices":[]}"#);
            })
            .await;

        let http = reqwest::Client::new();
        let err = ChatTranslator::new(http.clone(), server.url("/error"), "k", "m")
            .translate("一只猫")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("model overloaded"));

        let err = ChatTranslator::new(http, server.url("/empty"), "k", "m")
            .translate("一只猫")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no translation choices"));
    }

    #[test]
    fn from_config_requires_credential_and_flag() {
        let config = TranslationConfig::default();
        let http = reqwest::Client::new();

        let env = Env::parse_dotenv("SVG_GATEWAY_TEST_TRANSLATION_KEY=tk\n");
        let mut with_key = config.clone();
        with_key.api_key_env = "SVG_GATEWAY_TEST_TRANSLATION_KEY".to_string();
        assert!(ChatTranslator::from_config(&with_key, &env, http.clone()).is_some());

        let mut missing = config.clone();
        missing.api_key_env = "SVG_GATEWAY_TEST_MISSING_KEY".to_string();
        assert!(ChatTranslator::from_config(&missing, &env, http.clone()).is_none());

        let mut disabled = with_key;
        disabled.enabled = false;
        assert!(ChatTranslator::from_config(&disabled, &env, http).is_none());
    }
}
