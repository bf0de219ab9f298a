use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::Instrument;

use super::AppState;
use super::error::{error_response, gateway_error_response};
use crate::GatewayError;
use crate::service::SvgDocument;
use crate::types::{GenerationRequest, GenerationResult, ImageRef, ProviderId};

static REQUEST_ID_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Serialize)]
pub(super) struct HealthResponse {
    status: &'static str,
    time: String,
}

#[derive(Debug, Serialize)]
pub(super) struct ProvidersResponse {
    providers: Vec<ProviderId>,
    default_provider: ProviderId,
}

/// Metadata body of `POST /v1/images`.
#[derive(Debug, Serialize)]
pub(super) struct ImageResponse {
    id: String,
    svg_url: ImageRef,
    png_url: ImageRef,
    width: u32,
    height: u32,
    provider: ProviderId,
    #[serde(with = "time::serde::rfc3339")]
    created_at: OffsetDateTime,
    was_translated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    original_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    translated_prompt: Option<String>,
}

impl From<GenerationResult> for ImageResponse {
    fn from(result: GenerationResult) -> Self {
        let was_translated = result.was_translated();
        let (original_prompt, translated_prompt) = match result.translation {
            Some(provenance) => (
                Some(provenance.original_prompt),
                Some(provenance.translated_prompt),
            ),
            None => (None, None),
        };
        Self {
            id: result.id,
            svg_url: result.svg_url,
            png_url: result.png_url,
            width: result.width,
            height: result.height,
            provider: result.provider,
            created_at: result.created_at,
            was_translated,
            original_prompt,
            translated_prompt,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Output {
    Svg,
    Metadata,
}

pub(super) async fn health() -> Json<HealthResponse> {
    let time = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(HealthResponse {
        status: "ok",
        time,
    })
}

pub(super) async fn list_providers(State(state): State<AppState>) -> Json<ProvidersResponse> {
    Json(ProvidersResponse {
        providers: state.manager.configured_providers(),
        default_provider: state.manager.default_provider(),
    })
}

pub(super) async fn generate_svg(State(state): State<AppState>, body: Bytes) -> Response {
    handle_generate(state, None, body, Output::Svg).await
}

pub(super) async fn generate_metadata(State(state): State<AppState>, body: Bytes) -> Response {
    handle_generate(state, None, body, Output::Metadata).await
}

pub(super) async fn generate_svg_for(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Response {
    handle_generate(state, Some(provider), body, Output::Svg).await
}

pub(super) async fn generate_metadata_for(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: Bytes,
) -> Response {
    handle_generate(state, Some(provider), body, Output::Metadata).await
}

pub(super) async fn fallback() -> Response {
    error_response(StatusCode::NOT_FOUND, "not_found", "route not found", None)
}

async fn handle_generate(
    state: AppState,
    path_provider: Option<String>,
    body: Bytes,
    output: Output,
) -> Response {
    let request_id = REQUEST_ID_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
    let span = tracing::info_span!(
        "generate",
        request_id,
        output = ?output,
        path_provider = path_provider.as_deref().unwrap_or("")
    );
    async move {
        let forced = match path_provider.as_deref().map(str::parse::<ProviderId>) {
            Some(Ok(provider)) => Some(provider),
            Some(Err(err)) => return gateway_error_response(&err),
            None => None,
        };

        let mut request: GenerationRequest = match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(err) => {
                tracing::debug!(error = %err, bytes = body.len(), "request body rejected");
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_json",
                    "invalid request body",
                    Some(err.to_string()),
                );
            }
        };
        if let Some(provider) = forced {
            request.provider = Some(provider);
        }
        tracing::debug!(
            provider = ?request.provider,
            prompt = %request.prompt,
            style = ?request.style,
            "request parsed"
        );

        let deadline = state.request_timeout;
        let manager = &state.manager;
        let outcome = match output {
            Output::Svg => tokio::time::timeout(deadline, manager.generate_svg(&request))
                .await
                .map(|result| result.map(svg_response)),
            Output::Metadata => tokio::time::timeout(deadline, manager.generate_image(&request))
                .await
                .map(|result| result.map(|result| Json(ImageResponse::from(result)).into_response())),
        };

        match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => gateway_error_response(&err),
            Err(_) => {
                tracing::warn!(timeout_ms = deadline.as_millis() as u64, "request deadline exceeded");
                gateway_error_response(&GatewayError::Timeout {
                    stage: "request",
                    after: deadline,
                })
            }
        }
    }
    .instrument(span)
    .await
}

fn svg_response(document: SvgDocument) -> Response {
    let SvgDocument { result, bytes, .. } = document;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("image/svg+xml"),
    );
    insert_header(
        &mut headers,
        header::CONTENT_DISPOSITION,
        &format!("attachment; filename=\"{}.svg\"", result.id),
    );
    insert_header(&mut headers, HeaderName::from_static("x-image-id"), &result.id);
    insert_header(
        &mut headers,
        HeaderName::from_static("x-image-width"),
        &result.width.to_string(),
    );
    insert_header(
        &mut headers,
        HeaderName::from_static("x-image-height"),
        &result.height.to_string(),
    );
    insert_header(
        &mut headers,
        HeaderName::from_static("x-provider"),
        result.provider.as_str(),
    );
    if let Some(provenance) = &result.translation {
        insert_header(
            &mut headers,
            HeaderName::from_static("x-original-prompt"),
            &provenance.original_prompt,
        );
        insert_header(
            &mut headers,
            HeaderName::from_static("x-translated-prompt"),
            &provenance.translated_prompt,
        );
        headers.insert(
            HeaderName::from_static("x-was-translated"),
            HeaderValue::from_static("true"),
        );
    }
    tracing::info!(id = %result.id, provider = %result.provider, bytes = bytes.len(), "svg response ready");
    (StatusCode::OK, headers, Body::from(bytes)).into_response()
}

/// Raw UTF-8 is allowed in header values; control characters are not, so
/// such values are dropped rather than failing the response.
fn insert_header(headers: &mut HeaderMap, name: HeaderName, value: &str) {
    match HeaderValue::from_bytes(value.as_bytes()) {
        Ok(value) => {
            headers.insert(name, value);
        }
        Err(_) => tracing::debug!(header = %name, "skipping header with invalid value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TranslationProvenance;

    fn sample_result() -> GenerationResult {
        GenerationResult {
            id: "img_7".to_string(),
            prompt: "a cat".to_string(),
            negative_prompt: String::new(),
            style: String::new(),
            svg_url: ImageRef::svg("<svg/>"),
            png_url: ImageRef::svg("<svg/>"),
            width: 1024,
            height: 1024,
            created_at: OffsetDateTime::UNIX_EPOCH,
            provider: ProviderId::Claude,
            translation: None,
        }
    }

    #[test]
    fn metadata_omits_provenance_when_untranslated() {
        let value = serde_json::to_value(ImageResponse::from(sample_result())).unwrap();
        assert_eq!(value["was_translated"], false);
        assert_eq!(value["provider"], "claude");
        assert_eq!(value["created_at"], "1970-01-01T00:00:00Z");
        assert!(value.get("original_prompt").is_none());
    }

    #[test]
    fn translated_svg_response_carries_utf8_prompt_headers() {
        let result = sample_result().with_translation(Some(TranslationProvenance {
            original_prompt: "一只猫".to_string(),
            translated_prompt: "a cat".to_string(),
        }));
        let response = svg_response(SvgDocument {
            result,
            bytes: Bytes::from_static(b"<svg/>"),
            media_type: None,
        });
        let headers = response.headers();
        assert_eq!(headers["x-was-translated"], "true");
        assert_eq!(headers["x-original-prompt"].as_bytes(), "一只猫".as_bytes());
        assert_eq!(headers["x-translated-prompt"], "a cat");
        assert_eq!(
            headers[header::CONTENT_DISPOSITION],
            "attachment; filename=\"img_7.svg\""
        );
    }

    #[test]
    fn control_characters_drop_the_header() {
        let mut headers = HeaderMap::new();
        insert_header(
            &mut headers,
            HeaderName::from_static("x-original-prompt"),
            "line\nbreak",
        );
        assert!(headers.get("x-original-prompt").is_none());
    }
}
