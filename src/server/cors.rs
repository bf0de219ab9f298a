use axum::http::{HeaderName, HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, CorsLayer};

const EXPOSE_HEADERS: [&str; 8] = [
    "x-image-id",
    "x-image-width",
    "x-image-height",
    "x-provider",
    "x-original-prompt",
    "x-translated-prompt",
    "x-was-translated",
    "content-disposition",
];

/// `"*"` allows any origin; anything else is echoed as the single allowed
/// origin.
pub(super) fn cors_layer(allow_origin: &str) -> CorsLayer {
    let origin = if allow_origin.trim() == "*" {
        AllowOrigin::any()
    } else {
        match HeaderValue::from_str(allow_origin.trim()) {
            Ok(origin) => AllowOrigin::exact(origin),
            Err(_) => {
                tracing::warn!(allow_origin, "invalid cors origin, allowing any");
                AllowOrigin::any()
            }
        }
    };
    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .expose_headers(EXPOSE_HEADERS.map(HeaderName::from_static))
}
