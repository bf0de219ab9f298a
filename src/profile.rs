//! Gateway configuration: `.env` overlay, typed config file, shared HTTP client.

mod config;
mod env;
mod http;

pub use config::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_PROVIDER_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TRANSLATION_TIMEOUT, DownloadConfig, GatewayConfig, HttpConfig,
    ProviderConfig, ProviderSettings, ProvidersConfig, ServerConfig, TranslationConfig,
};
pub use env::{Env, parse_dotenv, parse_duration};
pub use http::build_http_client;
