//! Pipeline error taxonomy and its mapping to HTTP statuses.

use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;
use thiserror::Error;

use crate::credentials::CredentialError;

/// Failures of the backend call.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("backend request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("backend unreachable: {0}")]
    Network(String),

    #[error("backend returned non-JSON body")]
    InvalidJson { snippet: String },
}

/// Every way a proxied request can end without a backend answer.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("Forbidden: origin not allowed")]
    OriginNotAllowed,

    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("unsupported content type: {0}")]
    UnsupportedMediaType(String),

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("request timed out after {}s", .0.as_secs())]
    RequestTimeout(Duration),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Configuration(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::OriginNotAllowed => StatusCode::FORBIDDEN,
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::Unauthorized => StatusCode::UNAUTHORIZED,
            ProxyError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ProxyError::MalformedBody(_) => StatusCode::BAD_REQUEST,
            ProxyError::Credential(CredentialError::Unavailable(_)) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::Credential(CredentialError::MintFailed(_)) => StatusCode::BAD_GATEWAY,
            ProxyError::Upstream(UpstreamError::Timeout(_)) | ProxyError::RequestTimeout(_) => {
                StatusCode::GATEWAY_TIMEOUT
            }
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Taxonomy bucket, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ProxyError::Configuration(_) => "configuration",
            ProxyError::OriginNotAllowed
            | ProxyError::MethodNotAllowed(_)
            | ProxyError::Unauthorized
            | ProxyError::PayloadTooLarge(_)
            | ProxyError::UnsupportedMediaType(_)
            | ProxyError::MalformedBody(_) => "validation",
            ProxyError::Credential(_) => "credential",
            ProxyError::Upstream(_) => "upstream",
            ProxyError::RequestTimeout(_) => "timeout",
            ProxyError::Internal(_) => "internal",
        }
    }

    /// JSON body sent to the client. Internal details stay in the logs.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ProxyError::Internal(_) => json!({ "ok": false, "error": "internal error" }),
            ProxyError::Upstream(UpstreamError::InvalidJson { snippet }) => json!({
                "ok": false,
                "error": self.to_string(),
                "snippet": snippet,
            }),
            _ => json!({ "ok": false, "error": self.to_string() }),
        }
    }
}
