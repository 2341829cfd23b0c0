//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router (proxy route + health route)
//! - Wire up middleware (request ID, tracing)
//! - Turn a panicking request task into a JSON 500
//! - Build the shared outbound client and credential provider
//! - Serve plain TCP or TLS until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, Request},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use axum_server::tls_rustls::RustlsConfig;
use serde_json::json;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::credentials::{self, CredentialProvider};
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, RequestIdExt};
use crate::proxy::{Pipeline, ProxiedResponse};

/// Connections still open after shutdown get this long to finish.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

/// HTTP server for the summarizer proxy.
pub struct HttpServer {
    router: Router,
    config: Arc<ProxyConfig>,
}

impl HttpServer {
    /// Create a server, resolving the credential provider from configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, ServerError> {
        let client = build_client()?;
        let provider = credentials::provider_from_config(&config.credentials, client.clone());
        Ok(Self::assemble(config, provider, client))
    }

    /// Create a server with an explicit credential provider.
    pub fn with_provider(
        config: ProxyConfig,
        provider: Arc<dyn CredentialProvider>,
    ) -> Result<Self, ServerError> {
        let client = build_client()?;
        Ok(Self::assemble(config, provider, client))
    }

    fn assemble(
        config: ProxyConfig,
        provider: Arc<dyn CredentialProvider>,
        client: reqwest::Client,
    ) -> Self {
        let config = Arc::new(config);
        let state = AppState {
            pipeline: Arc::new(Pipeline::new(config.clone(), provider, client)),
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ProxyConfig, state: AppState) -> Router {
        Router::new()
            .route(&config.routes.proxy_path, any(proxy_handler))
            .route(&config.routes.health_path, get(health_handler))
            .with_state(state)
            .layer(propagate_request_id_layer())
            .layer(
                TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                    tracing::info_span!(
                        "request",
                        method = %request.method(),
                        path = %request.uri().path(),
                        request_id = %request.headers().request_id(),
                    )
                }),
            )
            .layer(set_request_id_layer())
    }

    /// The router, for serving elsewhere or driving in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Serve plain HTTP until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            proxy_path = %self.config.routes.proxy_path,
            "HTTP server starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received, draining connections");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Serve HTTPS until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ServerError> {
        tracing::info!(
            address = %addr,
            proxy_path = %self.config.routes.proxy_path,
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let signal = handle.clone();
        tokio::spawn(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining connections");
            signal.graceful_shutdown(Some(DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

fn build_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .user_agent(concat!("summarizer-proxy/", env!("CARGO_PKG_VERSION")))
        .build()
}

// The pipeline runs in its own task so a panic surfaces as a `JoinError`
// instead of tearing down the connection.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> ProxiedResponse {
    let start = Instant::now();
    let method = request.method().clone();
    let request_id = request.headers().request_id().to_string();
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let pipeline = state.pipeline.clone();
    let task = tokio::spawn(async move { pipeline.handle(request).await }.in_current_span());
    match task.await {
        Ok(response) => response,
        Err(error) => state.pipeline.internal_error(
            &method,
            origin.as_deref(),
            &request_id,
            start,
            error,
        ),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, CredentialError, UnavailableProvider};
    use crate::http::request::X_REQUEST_ID;
    use async_trait::async_trait;
    use axum::http::StatusCode;
    use tower::ServiceExt;

    struct PanickingProvider;

    #[async_trait]
    impl CredentialProvider for PanickingProvider {
        async fn credential(&self, _audience: &str) -> Result<Credential, CredentialError> {
            panic!("identity provider bug")
        }

        fn kind(&self) -> &'static str {
            "panicking"
        }
    }

    fn server() -> HttpServer {
        HttpServer::with_provider(
            ProxyConfig::default(),
            Arc::new(UnavailableProvider::new("test")),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = server()
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_request_id_generated_and_propagated() {
        let response = server()
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let id = response.headers()[X_REQUEST_ID].to_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
    }

    #[tokio::test]
    async fn test_client_request_id_kept() {
        let response = server()
            .router()
            .oneshot(
                Request::options("/summarize")
                    .header(X_REQUEST_ID, "client-id-1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.headers()[X_REQUEST_ID], "client-id-1");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let response = server()
            .router()
            .oneshot(Request::post("/other").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let mut config = ProxyConfig::default();
        config.backend.url = Some("http://127.0.0.1:9".to_string());
        let router = HttpServer::with_provider(config, Arc::new(PanickingProvider))
            .unwrap()
            .router();

        let response = router
            .oneshot(
                Request::post("/summarize")
                    .header(header::CONTENT_TYPE, "application/json")
                    .header(header::ORIGIN, "https://app.example")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "ok": false, "error": "internal error" }));
    }
}
