//! Backend call.

use std::time::Duration;

use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;

use crate::http::request::X_REQUEST_ID;
use crate::proxy::error::UpstreamError;

/// Request sent to the summarization backend.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub url: String,
    pub content_type: Option<String>,
    pub authorization: String,
    pub request_id: String,
    pub body: Bytes,
}

/// Fully buffered backend answer.
#[derive(Debug, Clone)]
pub struct OutboundResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl OutboundResponse {
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// POSTs uploads to the backend on a shared connection pool.
#[derive(Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    timeout: Duration,
}

impl Forwarder {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Send the request and buffer the whole response.
    ///
    /// The deadline covers connect, headers and body. Any backend status
    /// is a successful call; only transport failures are errors.
    pub async fn forward(&self, request: OutboundRequest) -> Result<OutboundResponse, UpstreamError> {
        let timeout = self.timeout;
        match tokio::time::timeout(timeout, self.send(request)).await {
            Ok(result) => result,
            Err(_) => Err(UpstreamError::Timeout(timeout)),
        }
    }

    async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, UpstreamError> {
        let mut builder = self
            .client
            .post(&request.url)
            .header(header::AUTHORIZATION, request.authorization)
            .header(X_REQUEST_ID, request.request_id)
            .body(request.body);
        if let Some(content_type) = request.content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }

        let response = builder.send().await.map_err(network_error)?;
        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);

        let mut headers = HeaderMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = HeaderValue::from_bytes(value.as_bytes()) {
                headers.append(name.clone(), value);
            }
        }

        let body = response.bytes().await.map_err(network_error)?;
        Ok(OutboundResponse {
            status,
            headers,
            body,
        })
    }
}

fn network_error(e: reqwest::Error) -> UpstreamError {
    UpstreamError::Network(e.to_string())
}
