use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use super::env::{Env, parse_duration};
use crate::types::ProviderId;
use crate::{GatewayError, Result};

/// Covers translation, generation and download run back to back.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(150);
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_TRANSLATION_TIMEOUT: Duration = Duration::from_secs(45);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub default_provider: ProviderId,
    pub providers: ProvidersConfig,
    pub translation: TranslationConfig,
    pub download: DownloadConfig,
    pub http: HttpConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            default_provider: ProviderId::Svgio,
            providers: ProvidersConfig::default(),
            translation: TranslationConfig::default(),
            download: DownloadConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Outer deadline for a whole inbound request.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    pub cors_allow_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            cors_allow_origin: "*".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Per-provider overrides as written in the config file; every field falls
/// back to the provider's built-in default when absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub api_key_env: Option<String>,
    #[serde(deserialize_with = "deserialize_opt_duration")]
    pub timeout: Option<Duration>,
    pub default_model: Option<String>,
    pub generate_endpoint: Option<String>,
    pub vectorize_endpoint: Option<String>,
    pub default_size: Option<String>,
    pub default_style: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub svgio: ProviderConfig,
    pub recraft: ProviderConfig,
    pub openai: ProviderConfig,
    pub claude: ProviderConfig,
}

impl ProvidersConfig {
    pub fn get(&self, provider: ProviderId) -> &ProviderConfig {
        match provider {
            ProviderId::Svgio => &self.svgio,
            ProviderId::Recraft => &self.recraft,
            ProviderId::Openai => &self.openai,
            ProviderId::Claude => &self.claude,
        }
    }

    fn get_mut(&mut self, provider: ProviderId) -> &mut ProviderConfig {
        match provider {
            ProviderId::Svgio => &mut self.svgio,
            ProviderId::Recraft => &mut self.recraft,
            ProviderId::Openai => &mut self.openai,
            ProviderId::Claude => &mut self.claude,
        }
    }
}

/// Fully resolved settings an adapter is constructed from.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub provider: ProviderId,
    pub enabled: bool,
    pub base_url: String,
    pub api_key_env: String,
    pub timeout: Duration,
    pub default_model: Option<String>,
    pub generate_endpoint: String,
    pub vectorize_endpoint: String,
    pub default_size: String,
    pub default_style: String,
    pub max_tokens: u32,
    pub temperature: f64,
}

struct ProviderDefaults {
    base_url: &'static str,
    api_key_env: &'static str,
    default_model: Option<&'static str>,
    generate_endpoint: &'static str,
    vectorize_endpoint: &'static str,
    default_style: &'static str,
}

fn provider_defaults(provider: ProviderId) -> ProviderDefaults {
    match provider {
        ProviderId::Svgio => ProviderDefaults {
            base_url: "https://api.svg.io",
            api_key_env: "SVGIO_API_KEY",
            default_model: None,
            generate_endpoint: "/v1/generate",
            vectorize_endpoint: "",
            default_style: "FLAT_VECTOR",
        },
        ProviderId::Recraft => ProviderDefaults {
            base_url: "https://external.api.recraft.ai",
            api_key_env: "RECRAFT_API_KEY",
            default_model: Some("recraftv3"),
            generate_endpoint: "/v1/images/generations",
            vectorize_endpoint: "/v1/images/vectorize",
            default_style: "vector_illustration",
        },
        ProviderId::Openai => ProviderDefaults {
            base_url: "https://api.openai.com/v1",
            api_key_env: "OPENAI_API_KEY",
            default_model: Some("gpt-4o"),
            generate_endpoint: "/chat/completions",
            vectorize_endpoint: "",
            default_style: "",
        },
        ProviderId::Claude => ProviderDefaults {
            base_url: "https://api.anthropic.com/v1",
            api_key_env: "CLAUDE_API_KEY",
            default_model: Some("claude-sonnet-4-20250514"),
            generate_endpoint: "/chat/completions",
            vectorize_endpoint: "",
            default_style: "",
        },
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub enabled: bool,
    pub service_url: String,
    pub default_model: String,
    pub api_key_env: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            service_url: "https://api.openai.com/v1/chat/completions".to_string(),
            default_model: "gpt-3.5-turbo".to_string(),
            api_key_env: "TRANSLATION_API_KEY".to_string(),
            timeout: DEFAULT_TRANSLATION_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub connect_timeout: Duration,
    /// Extra headers sent on every outbound request.
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            headers: BTreeMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Loads a YAML (`.yaml`/`.yml`) or TOML (`.toml`) file, applies
    /// environment overrides and validates the result.
    pub async fn load(path: &Path, env: &Env) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let mut config = Self::parse(path, &raw)?;
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults plus environment overrides, validated.
    pub fn from_env(env: &Env) -> Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides(env)?;
        config.validate()?;
        Ok(config)
    }

    fn parse(path: &Path, raw: &str) -> Result<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("yaml" | "yml") => serde_yaml::from_str(raw).map_err(|err| {
                GatewayError::Config(format!("failed to parse {}: {err}", path.display()))
            }),
            Some("toml") => toml::from_str(raw).map_err(|err| {
                GatewayError::Config(format!("failed to parse {}: {err}", path.display()))
            }),
            _ => Err(GatewayError::Config(format!(
                "unsupported config format: {} (expected .yaml, .yml or .toml)",
                path.display()
            ))),
        }
    }

    pub fn apply_env_overrides(&mut self, env: &Env) -> Result<()> {
        if let Some(host) = env.get("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env.get_parsed::<u16>("SERVER_PORT")? {
            self.server.port = port;
        }
        if let Some(timeout) = env.get_duration("SERVER_TIMEOUT")? {
            self.server.timeout = timeout;
        }
        if let Some(raw) = env.get("DEFAULT_PROVIDER") {
            self.default_provider = raw.parse()?;
        }

        for provider in ProviderId::ALL {
            let prefix = provider.as_str().to_ascii_uppercase();
            let key = |suffix: &str| format!("{prefix}_{suffix}");
            let section = self.providers.get_mut(provider);

            if let Some(enabled) = env.get_bool(&key("ENABLED"))? {
                section.enabled = Some(enabled);
            }
            if let Some(base_url) = env.get(&key("BASE_URL")) {
                section.base_url = Some(base_url);
            }
            if let Some(timeout) = env.get_duration(&key("TIMEOUT"))? {
                section.timeout = Some(timeout);
            }
            if let Some(model) = env.get(&key("DEFAULT_MODEL")) {
                section.default_model = Some(model);
            }
            if let Some(endpoint) = env.get(&key("GENERATE_ENDPOINT")) {
                section.generate_endpoint = Some(endpoint);
            }
            if provider == ProviderId::Recraft {
                if let Some(endpoint) = env.get(&key("VECTORIZE_ENDPOINT")) {
                    section.vectorize_endpoint = Some(endpoint);
                }
            }
            if matches!(provider, ProviderId::Openai | ProviderId::Claude) {
                if let Some(max_tokens) = env.get_parsed::<u32>(&key("MAX_TOKENS"))? {
                    section.max_tokens = Some(max_tokens);
                }
                if let Some(temperature) = env.get_parsed::<f64>(&key("TEMPERATURE"))? {
                    section.temperature = Some(temperature);
                }
            }
        }

        if let Some(enabled) = env.get_bool("TRANSLATION_ENABLED")? {
            self.translation.enabled = enabled;
        }
        if let Some(url) = env.get("TRANSLATION_SERVICE_URL") {
            self.translation.service_url = url;
        }
        if let Some(model) = env.get("TRANSLATION_DEFAULT_MODEL") {
            self.translation.default_model = model;
        }
        if let Some(timeout) = env.get_duration("TRANSLATION_TIMEOUT")? {
            self.translation.timeout = timeout;
        }
        if let Some(timeout) = env.get_duration("DOWNLOAD_TIMEOUT")? {
            self.download.timeout = timeout;
        }
        Ok(())
    }

    pub fn provider_settings(&self, provider: ProviderId) -> ProviderSettings {
        let section = self.providers.get(provider);
        let defaults = provider_defaults(provider);
        ProviderSettings {
            provider,
            enabled: section.enabled.unwrap_or(true),
            base_url: section
                .base_url
                .clone()
                .unwrap_or_else(|| defaults.base_url.to_string()),
            api_key_env: section
                .api_key_env
                .clone()
                .unwrap_or_else(|| defaults.api_key_env.to_string()),
            timeout: section.timeout.unwrap_or(DEFAULT_PROVIDER_TIMEOUT),
            default_model: section
                .default_model
                .clone()
                .or_else(|| defaults.default_model.map(str::to_string)),
            generate_endpoint: section
                .generate_endpoint
                .clone()
                .unwrap_or_else(|| defaults.generate_endpoint.to_string()),
            vectorize_endpoint: section
                .vectorize_endpoint
                .clone()
                .unwrap_or_else(|| defaults.vectorize_endpoint.to_string()),
            default_size: section
                .default_size
                .clone()
                .unwrap_or_else(|| "1024x1024".to_string()),
            default_style: section
                .default_style
                .clone()
                .unwrap_or_else(|| defaults.default_style.to_string()),
            max_tokens: section.max_tokens.unwrap_or(4000),
            temperature: section.temperature.unwrap_or(0.7),
        }
    }

    pub fn enabled_providers(&self) -> Vec<ProviderId> {
        ProviderId::ALL
            .into_iter()
            .filter(|provider| self.provider_settings(*provider).enabled)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(GatewayError::Config("server port must be non-zero".to_string()));
        }

        let enabled = self.enabled_providers();
        if enabled.is_empty() {
            return Err(GatewayError::Config(
                "at least one provider must be enabled".to_string(),
            ));
        }
        if !enabled.contains(&self.default_provider) {
            return Err(GatewayError::Config(format!(
                "default provider {} is not enabled",
                self.default_provider
            )));
        }

        if self.download.timeout >= self.server.timeout {
            return Err(GatewayError::Config(format!(
                "download timeout ({:?}) must be shorter than the server timeout ({:?})",
                self.download.timeout, self.server.timeout
            )));
        }

        for provider in enabled {
            let settings = self.provider_settings(provider);
            if settings.base_url.trim().is_empty() {
                return Err(GatewayError::Config(format!(
                    "provider {provider} is enabled but base_url is empty"
                )));
            }
            if settings.timeout >= self.server.timeout {
                return Err(GatewayError::Config(format!(
                    "{provider} timeout ({:?}) must be shorter than the server timeout ({:?})",
                    settings.timeout, self.server.timeout
                )));
            }
            if self.translation.enabled
                && provider.requires_translation()
                && self.translation.timeout >= settings.timeout
            {
                return Err(GatewayError::Config(format!(
                    "translation timeout ({:?}) must be shorter than the {provider} timeout ({:?})",
                    self.translation.timeout, settings.timeout
                )));
            }

            // Stages run one after another under the server deadline.
            let translation = if self.translation.enabled && provider.requires_translation() {
                self.translation.timeout
            } else {
                Duration::ZERO
            };
            let chain = translation + settings.timeout + self.download.timeout;
            if chain >= self.server.timeout {
                return Err(GatewayError::Config(format!(
                    "{provider} translation + generation + download timeouts ({chain:?}) must be shorter than the server timeout ({:?})",
                    self.server.timeout
                )));
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Seconds(u64),
    Text(String),
}

impl RawDuration {
    fn into_duration<E: serde::de::Error>(self) -> std::result::Result<Duration, E> {
        match self {
            RawDuration::Seconds(secs) => Ok(Duration::from_secs(secs)),
            RawDuration::Text(text) => parse_duration(&text)
                .ok_or_else(|| E::custom(format!("invalid duration {text:?}"))),
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    RawDuration::deserialize(deserializer)?.into_duration()
}

fn deserialize_opt_duration<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<RawDuration>::deserialize(deserializer)?
        .map(RawDuration::into_duration)
        .transpose()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GatewayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.listen_addr(), "0.0.0.0:8080");

        let recraft = config.provider_settings(ProviderId::Recraft);
        assert_eq!(recraft.default_model.as_deref(), Some("recraftv3"));
        assert_eq!(recraft.vectorize_endpoint, "/v1/images/vectorize");
        assert_eq!(recraft.api_key_env, "RECRAFT_API_KEY");
    }

    #[tokio::test]
    async fn loads_yaml_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "server:\n  port: 9090\n  timeout: 2m\ndefault_provider: recraft\nproviders:\n  recraft:\n    base_url: http://127.0.0.1:1\n    timeout: 30\n  claude:\n    enabled: false\ntranslation:\n  timeout: 10s\n"
        )
        .unwrap();

        let config = GatewayConfig::load(file.path(), &Env::default())
            .await
            .unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.timeout, Duration::from_secs(120));
        assert_eq!(config.default_provider, ProviderId::Recraft);

        let recraft = config.provider_settings(ProviderId::Recraft);
        assert_eq!(recraft.base_url, "http://127.0.0.1:1");
        assert_eq!(recraft.timeout, Duration::from_secs(30));
        assert_eq!(recraft.generate_endpoint, "/v1/images/generations");
        assert!(!config.enabled_providers().contains(&ProviderId::Claude));
    }

    #[tokio::test]
    async fn loads_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "default_provider = \"openai\"\n\n[providers.openai]\nmax_tokens = 2000\ntemperature = 0.2\n\n[download]\ntimeout = \"5s\"\n"
        )
        .unwrap();

        let config = GatewayConfig::load(file.path(), &Env::default())
            .await
            .unwrap();
        let openai = config.provider_settings(ProviderId::Openai);
        assert_eq!(openai.max_tokens, 2000);
        assert_eq!(openai.temperature, 0.2);
        assert_eq!(config.download.timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn unknown_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".ini").tempfile().unwrap();
        let err = GatewayConfig::load(file.path(), &Env::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported config format"));
    }

    #[tokio::test]
    async fn missing_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = GatewayConfig::load(&dir.path().join("gateway.yaml"), &Env::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Io(_)));
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn env_overrides_win_over_file_values() {
        let env = Env::parse_dotenv(
            "SERVER_PORT=7000\nDEFAULT_PROVIDER=claude\nSVGIO_ENABLED=false\nCLAUDE_BASE_URL=http://claude.local\nCLAUDE_TEMPERATURE=0.1\nRECRAFT_VECTORIZE_ENDPOINT=/v2/vectorize\nTRANSLATION_TIMEOUT=20s\n",
        );
        let config = GatewayConfig::from_env(&env).unwrap();
        assert_eq!(config.server.port, 7000);
        assert_eq!(config.default_provider, ProviderId::Claude);
        assert!(!config.enabled_providers().contains(&ProviderId::Svgio));
        assert_eq!(
            config.provider_settings(ProviderId::Claude).base_url,
            "http://claude.local"
        );
        assert_eq!(config.provider_settings(ProviderId::Claude).temperature, 0.1);
        assert_eq!(
            config.provider_settings(ProviderId::Recraft).vectorize_endpoint,
            "/v2/vectorize"
        );
        assert_eq!(config.translation.timeout, Duration::from_secs(20));
    }

    #[test]
    fn bad_env_values_are_config_errors() {
        let env = Env::parse_dotenv("SERVER_PORT=http\n");
        let err = GatewayConfig::from_env(&env).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn validate_rejects_broken_layouts() {
        let mut config = GatewayConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        for provider in ProviderId::ALL {
            config.providers.get_mut(provider).enabled = Some(false);
        }
        assert!(config.validate().unwrap_err().to_string().contains("at least one"));

        let mut config = GatewayConfig::default();
        config.providers.svgio.enabled = Some(false);
        assert!(config.validate().unwrap_err().to_string().contains("default provider"));

        let mut config = GatewayConfig::default();
        config.providers.recraft.base_url = Some(" ".to_string());
        assert!(config.validate().unwrap_err().to_string().contains("base_url"));
    }

    #[test]
    fn validate_enforces_nested_deadlines() {
        let mut config = GatewayConfig::default();
        config.providers.openai.timeout = Some(config.server.timeout);
        assert!(config.validate().unwrap_err().to_string().contains("openai timeout"));

        let mut config = GatewayConfig::default();
        config.translation.timeout = Duration::from_secs(60);
        assert!(config.validate().unwrap_err().to_string().contains("translation timeout"));

        config.translation.enabled = false;
        config.validate().unwrap();

        let mut config = GatewayConfig::default();
        config.download.timeout = config.server.timeout;
        assert!(config.validate().unwrap_err().to_string().contains("download timeout"));
    }

    #[test]
    fn validate_rejects_stages_that_overrun_the_server_deadline() {
        let config = GatewayConfig::default();
        let svgio = config.provider_settings(ProviderId::Svgio);
        assert!(
            config.translation.timeout + svgio.timeout + config.download.timeout
                < config.server.timeout
        );

        // 45s + 60s fits under 120s only until the 30s download is added.
        let mut config = GatewayConfig::default();
        config.server.timeout = Duration::from_secs(120);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("svgio translation + generation + download"), "{err}");

        // Without translation the same budget holds generation plus download.
        config.translation.enabled = false;
        config.validate().unwrap();

        // Generation and download alone can also overrun it.
        let mut config = GatewayConfig::default();
        config.server.timeout = Duration::from_secs(90);
        config.translation.enabled = false;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("must be shorter than the server timeout (90s)"), "{err}");
    }

    #[test]
    fn translation_budget_only_counts_for_translated_providers() {
        let env = Env::parse_dotenv(
            "SERVER_TIMEOUT=100s
SVGIO_ENABLED=false
DEFAULT_PROVIDER=recraft
TRANSLATION_TIMEOUT=45s
",
        );
        let config = GatewayConfig::from_env(&env).unwrap();
        assert_eq!(config.server.timeout, Duration::from_secs(100));

        let env = Env::parse_dotenv("SERVER_TIMEOUT=100s
TRANSLATION_TIMEOUT=45s
");
        let err = GatewayConfig::from_env(&env).unwrap_err();
        assert!(err.to_string().contains("svgio translation"));
    }
}
