//! Image generation gateway that puts SVG-capable providers behind one
//! request/response model.
//!
//! A [`ServiceManager`] validates a [`GenerationRequest`], optionally
//! translates CJK prompts, dispatches to the selected [`ImageProvider`] under
//! a deadline and, for SVG output, resolves the resulting [`ImageRef`] into
//! bytes. The `server` feature exposes the same flow over HTTP.

pub mod content;
mod error;
pub mod image;
pub mod outcome;
mod profile;
pub mod providers;
#[cfg(feature = "server")]
pub mod server;
pub mod service;
pub mod svg;
pub mod translate;
pub mod types;
pub mod utils;

pub use content::{ContentResolver, ResolvedContent, parse_data_url};
pub use error::{ErrorKind, GatewayError, Result};
pub use image::ImageProvider;
pub use outcome::BestEffort;
pub use profile::{
    DEFAULT_CONNECT_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_PROVIDER_TIMEOUT,
    DEFAULT_REQUEST_TIMEOUT, DEFAULT_TRANSLATION_TIMEOUT, DownloadConfig, Env, GatewayConfig,
    HttpConfig, ProviderConfig, ProviderSettings, ProvidersConfig, ServerConfig,
    TranslationConfig, build_http_client, parse_dotenv, parse_duration,
};
pub use providers::{ChatSvg, ChatVariant, Recraft, SvgIo, parse_size};
pub use service::{ServiceManager, SvgDocument};
pub use svg::{ExtractStrategy, extract_svg};
pub use translate::{
    ChatTranslator, TranslatedPrompt, TranslationGate, Translator, contains_cjk,
};
pub use types::{
    GenerationRequest, GenerationResult, ImageRef, OutputFormat, ProviderFamily, ProviderId,
    TranslationProvenance,
};
