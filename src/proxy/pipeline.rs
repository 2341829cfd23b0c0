//! The forwarding pipeline.
//!
//! ```text
//! ReceivingRequest ──▶ Authorizing ──▶ Forwarding ──▶ RespondingToClient
//!        │                                                  ▲
//!        └── preflight / validation failure ────────────────┘
//! ```
//!
//! Each request runs through [`Pipeline::handle`] exactly once. Nothing is
//! retried and every failure becomes one JSON error response carrying the
//! same CORS headers as a success.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request};

use crate::config::ProxyConfig;
use crate::credentials::{Credential, CredentialError, CredentialProvider};
use crate::observability::metrics;
use crate::proxy::cors::{CorsPolicy, OriginDecision};
use crate::proxy::error::ProxyError;
use crate::proxy::forward::{Forwarder, OutboundRequest};
use crate::proxy::inbound::{validate_body, InboundRequest};
use crate::proxy::outbound::ProxiedResponse;

const DEFAULT_FORWARD_CONTENT_TYPE: &str = "application/json";

/// Where a request was when it finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReceivingRequest,
    Authorizing,
    Forwarding,
    RespondingToClient,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ReceivingRequest => "receiving_request",
            Stage::Authorizing => "authorizing",
            Stage::Forwarding => "forwarding",
            Stage::RespondingToClient => "responding_to_client",
        };
        f.write_str(name)
    }
}

/// Shared, immutable request processor.
pub struct Pipeline {
    config: Arc<ProxyConfig>,
    cors: CorsPolicy,
    credentials: Arc<dyn CredentialProvider>,
    forwarder: Forwarder,
}

impl Pipeline {
    pub fn new(
        config: Arc<ProxyConfig>,
        credentials: Arc<dyn CredentialProvider>,
        client: reqwest::Client,
    ) -> Self {
        let cors = CorsPolicy::from_config(&config.cors);
        let forwarder = Forwarder::new(client, config.timeouts.forward());
        Self {
            config,
            cors,
            credentials,
            forwarder,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Run one request to completion. Never fails: errors are rendered.
    pub async fn handle(&self, request: Request<Body>) -> ProxiedResponse {
        let start = Instant::now();
        let (parts, body) = request.into_parts();
        let mut inbound = InboundRequest::from_parts(&parts);
        let decision = self.cors.check(inbound.origin.as_deref());
        let method = inbound.method.to_string();

        if inbound.method == Method::OPTIONS {
            let mut response = ProxiedResponse::no_content();
            self.cors.apply_preflight(&mut response.headers, &decision);
            tracing::debug!(
                request_id = %inbound.request_id,
                origin_allowed = decision.allow_origin().is_some(),
                "Preflight answered"
            );
            metrics::record_request(&method, response.status.as_u16(), "preflight", start);
            return response;
        }

        let mut stage = Stage::ReceivingRequest;
        let deadline = self.config.timeouts.request();
        let result =
            match tokio::time::timeout(deadline, self.process(&mut inbound, body, &decision, &mut stage))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(ProxyError::RequestTimeout(deadline)),
            };

        let (mut response, outcome) = match result {
            Ok(response) => {
                tracing::info!(
                    request_id = %inbound.request_id,
                    status = response.status.as_u16(),
                    binary = response.binary,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Request forwarded"
                );
                (response, "forwarded")
            }
            Err(error) => {
                log_failure(&error, stage, &inbound.request_id);
                let outcome = if error.status().is_client_error() {
                    "rejected"
                } else {
                    "error"
                };
                (ProxiedResponse::from_error(&error), outcome)
            }
        };

        self.cors.apply(&mut response.headers, &decision);
        metrics::record_request(&method, response.status.as_u16(), outcome, start);
        response
    }

    /// Render a failure that escaped [`Pipeline::handle`], such as a panic.
    pub fn internal_error(
        &self,
        method: &Method,
        origin: Option<&str>,
        request_id: &str,
        start: Instant,
        cause: impl fmt::Display,
    ) -> ProxiedResponse {
        let error = ProxyError::Internal(cause.to_string());
        log_failure(&error, Stage::ReceivingRequest, request_id);

        let mut response = ProxiedResponse::from_error(&error);
        self.cors.apply(&mut response.headers, &self.cors.check(origin));
        metrics::record_request(method.as_str(), response.status.as_u16(), "error", start);
        response
    }

    async fn process(
        &self,
        inbound: &mut InboundRequest,
        body: Body,
        decision: &OriginDecision,
        stage: &mut Stage,
    ) -> Result<ProxiedResponse, ProxyError> {
        if *decision == OriginDecision::Rejected {
            return Err(ProxyError::OriginNotAllowed);
        }
        if inbound.method != Method::POST {
            return Err(ProxyError::MethodNotAllowed(inbound.method.to_string()));
        }
        if let Some(secret) = &self.config.security.app_secret {
            if inbound.app_secret.as_deref() != Some(secret.as_str()) {
                return Err(ProxyError::Unauthorized);
            }
        }

        let limit = self.config.security.max_body_size;
        inbound.body = axum::body::to_bytes(body, limit)
            .await
            .map_err(|_| ProxyError::PayloadTooLarge(limit))?;
        let payload = inbound.decoded_body()?;
        validate_body(
            self.config.body.mode,
            inbound.content_type.as_deref(),
            &payload,
        )
        .await?;

        let target = self
            .config
            .backend
            .target_url()
            .ok_or_else(|| ProxyError::Configuration("BACKEND_URL is not set".to_string()))?;
        let audience = self
            .config
            .backend
            .audience()
            .ok_or_else(|| ProxyError::Configuration("backend audience is not set".to_string()))?;

        *stage = Stage::Authorizing;
        let credential = self.authorize(&audience).await?;

        *stage = Stage::Forwarding;
        let outbound = OutboundRequest {
            url: target,
            content_type: Some(
                inbound
                    .content_type
                    .clone()
                    .unwrap_or_else(|| DEFAULT_FORWARD_CONTENT_TYPE.to_string()),
            ),
            authorization: credential.authorization(),
            request_id: inbound.request_id.clone(),
            body: payload,
        };
        let upstream = self.forwarder.forward(outbound).await?;

        *stage = Stage::RespondingToClient;
        ProxiedResponse::from_backend(upstream, &self.config.response).map_err(ProxyError::from)
    }

    async fn authorize(&self, audience: &str) -> Result<Credential, ProxyError> {
        let provider = self.credentials.kind();
        let timeout = self.config.timeouts.credential();

        let result = match tokio::time::timeout(timeout, self.credentials.credential(audience)).await
        {
            Ok(result) => result,
            Err(_) => Err(CredentialError::MintFailed(format!(
                "identity provider timed out after {}s",
                timeout.as_secs()
            ))),
        };

        match &result {
            Ok(_) => metrics::record_credential(provider, "ok"),
            Err(CredentialError::Unavailable(_)) => metrics::record_credential(provider, "unavailable"),
            Err(CredentialError::MintFailed(_)) => metrics::record_credential(provider, "failed"),
        }
        result.map_err(ProxyError::from)
    }
}

fn log_failure(error: &ProxyError, stage: Stage, request_id: &str) {
    let status = error.status().as_u16();
    if error.status().is_server_error() {
        tracing::error!(
            request_id = %request_id,
            stage = %stage,
            kind = error.kind(),
            status,
            error = %error,
            "Request failed"
        );
    } else {
        tracing::warn!(
            request_id = %request_id,
            stage = %stage,
            kind = error.kind(),
            status,
            error = %error,
            "Request rejected"
        );
    }
}
