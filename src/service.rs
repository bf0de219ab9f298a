//! Request dispatch: validation, provider selection, translation, deadlines.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::content::ContentResolver;
use crate::image::ImageProvider;
use crate::profile::{DEFAULT_PROVIDER_TIMEOUT, Env, GatewayConfig, build_http_client};
use crate::providers::{ChatSvg, ChatVariant, Recraft, SvgIo};
use crate::translate::{ChatTranslator, TranslationGate, Translator};
use crate::types::{GenerationRequest, GenerationResult, OutputFormat, ProviderId};
use crate::{GatewayError, Result};

/// Generated SVG bytes with the metadata they belong to.
#[derive(Debug, Clone)]
pub struct SvgDocument {
    pub result: GenerationResult,
    pub bytes: Bytes,
    pub media_type: Option<String>,
}

struct RegisteredProvider {
    adapter: Arc<dyn ImageProvider>,
    timeout: Duration,
}

/// Holds the configured adapters and drives one generation end to end.
pub struct ServiceManager {
    providers: BTreeMap<ProviderId, RegisteredProvider>,
    default_provider: ProviderId,
    translation: TranslationGate,
    resolver: ContentResolver,
}

impl std::fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceManager")
            .field("providers", &self.configured_providers())
            .field("default_provider", &self.default_provider)
            .field("translation", &self.translation)
            .field("resolver", &self.resolver)
            .finish()
    }
}

impl ServiceManager {
    pub fn new(
        default_provider: ProviderId,
        translation: TranslationGate,
        resolver: ContentResolver,
    ) -> Self {
        Self {
            providers: BTreeMap::new(),
            default_provider,
            translation,
            resolver,
        }
    }

    /// Builds one shared HTTP client and every enabled provider whose
    /// credential is present; providers without one are skipped with a log.
    pub fn from_config(config: &GatewayConfig, env: &Env) -> Result<Self> {
        let http = build_http_client(config.http.connect_timeout, &config.http.headers)?;
        let resolver = ContentResolver::new(http.clone(), config.download.timeout);

        let translator = ChatTranslator::from_config(&config.translation, env, http.clone())
            .map(|translator| Arc::new(translator) as Arc<dyn Translator>);
        let translation = TranslationGate::new(translator, config.translation.timeout);

        let mut manager = Self::new(config.default_provider, translation, resolver.clone());
        for provider in config.enabled_providers() {
            let settings = config.provider_settings(provider);
            let Some(api_key) = env.get(&settings.api_key_env) else {
                tracing::warn!(
                    provider = %provider,
                    key = %settings.api_key_env,
                    "provider enabled but no credential found, skipping"
                );
                continue;
            };
            let adapter: Arc<dyn ImageProvider> = match provider {
                ProviderId::Svgio => Arc::new(SvgIo::from_settings(&settings, api_key, http.clone())),
                ProviderId::Recraft => Arc::new(Recraft::from_settings(
                    &settings,
                    api_key,
                    resolver.clone(),
                    http.clone(),
                )),
                ProviderId::Openai => Arc::new(ChatSvg::from_settings(
                    ChatVariant::OpenAi,
                    &settings,
                    api_key,
                    http.clone(),
                )),
                ProviderId::Claude => Arc::new(ChatSvg::from_settings(
                    ChatVariant::Claude,
                    &settings,
                    api_key,
                    http.clone(),
                )),
            };
            manager.register_provider(adapter, settings.timeout);
        }

        tracing::info!(
            providers = ?manager.configured_providers(),
            default_provider = %manager.default_provider,
            translation = manager.translation.is_enabled(),
            "service manager ready"
        );
        Ok(manager)
    }

    /// Adds or replaces the adapter for its provider id.
    pub fn register_provider(&mut self, adapter: Arc<dyn ImageProvider>, timeout: Duration) {
        let provider = adapter.provider();
        tracing::debug!(provider = %provider, timeout_ms = timeout.as_millis() as u64, "provider registered");
        self.providers
            .insert(provider, RegisteredProvider { adapter, timeout });
    }

    pub fn with_provider(mut self, adapter: Arc<dyn ImageProvider>) -> Self {
        self.register_provider(adapter, DEFAULT_PROVIDER_TIMEOUT);
        self
    }

    pub fn provider(&self, provider: ProviderId) -> Option<Arc<dyn ImageProvider>> {
        self.providers
            .get(&provider)
            .map(|registered| registered.adapter.clone())
    }

    pub fn configured_providers(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }

    pub fn default_provider(&self) -> ProviderId {
        self.default_provider
    }

    pub fn resolver(&self) -> &ContentResolver {
        &self.resolver
    }

    pub async fn generate_image(&self, request: &GenerationRequest) -> Result<GenerationResult> {
        request.validate()?;

        let provider = request.provider.unwrap_or(self.default_provider);
        let registered = self.providers.get(&provider).ok_or_else(|| {
            GatewayError::ProviderNotConfigured {
                provider: provider.to_string(),
            }
        })?;

        let (translated, soft_failure) = self
            .translation
            .translate(&request.prompt, provider, request.skip_translate)
            .await
            .into_parts();
        if let Some(err) = soft_failure {
            tracing::warn!(provider = %provider, error = %err, "prompt translation failed, using original prompt");
        }
        let provenance = translated.provenance(&request.prompt);
        let translated_request;
        let effective = if translated.translated {
            translated_request = request.with_prompt(translated.text);
            &translated_request
        } else {
            request
        };

        tracing::debug!(provider = %provider, format = ?effective.format, "dispatching generation");
        let result = match tokio::time::timeout(
            registered.timeout,
            registered.adapter.generate(effective),
        )
        .await
        {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => {
                let err = err.reclassify_timeout("generation", registered.timeout);
                tracing::warn!(provider = %provider, kind = %err.kind(), error = %err, "generation failed");
                return Err(err);
            }
            Err(_) => {
                tracing::warn!(provider = %provider, timeout_ms = registered.timeout.as_millis() as u64, "generation deadline exceeded");
                return Err(GatewayError::Timeout {
                    stage: "generation",
                    after: registered.timeout,
                });
            }
        };

        tracing::info!(provider = %provider, id = %result.id, translated = provenance.is_some(), "generation succeeded");
        Ok(result.with_translation(provenance))
    }

    /// Generates with raw SVG requested and resolves `svg_url` into bytes.
    pub async fn generate_svg(&self, request: &GenerationRequest) -> Result<SvgDocument> {
        let request = if request.format == OutputFormat::Svg {
            std::borrow::Cow::Borrowed(request)
        } else {
            std::borrow::Cow::Owned(request.clone().with_format(OutputFormat::Svg))
        };
        let result = self.generate_image(&request).await?;
        let content = self.resolver.resolve(&result.svg_url).await?;
        tracing::debug!(id = %result.id, bytes = content.bytes.len(), "svg content resolved");
        Ok(SvgDocument {
            result,
            bytes: content.bytes,
            media_type: content.media_type,
        })
    }
}
