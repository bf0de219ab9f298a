//! HTTP surface over [`ServiceManager`].

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, header};
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::profile::{DEFAULT_REQUEST_TIMEOUT, GatewayConfig};
use crate::service::ServiceManager;

mod cors;
mod error;
mod handlers;

pub use error::ErrorResponse;

/// Shared per-router state; cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    manager: Arc<ServiceManager>,
    request_timeout: Duration,
    cors_allow_origin: String,
}

impl AppState {
    pub fn new(manager: Arc<ServiceManager>) -> Self {
        Self {
            manager,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            cors_allow_origin: "*".to_string(),
        }
    }

    pub fn from_config(manager: Arc<ServiceManager>, config: &GatewayConfig) -> Self {
        Self::new(manager)
            .with_request_timeout(config.server.timeout)
            .with_cors_allow_origin(config.server.cors_allow_origin.clone())
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cors_allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.cors_allow_origin = origin.into();
        self
    }

    pub fn manager(&self) -> &ServiceManager {
        &self.manager
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/v1/providers", get(handlers::list_providers))
        .route("/v1/images", post(handlers::generate_metadata))
        .route("/v1/images/svg", post(handlers::generate_svg))
        .route("/v1/:provider/images", post(handlers::generate_metadata_for))
        .route("/v1/:provider/images/svg", post(handlers::generate_svg_for))
        .fallback(handlers::fallback)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(cors::cors_layer(&state.cors_allow_origin))
        .with_state(state)
}

/// Serves `router(state)` on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "svg gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    tracing::info!("svg gateway stopped");
    Ok(())
}
