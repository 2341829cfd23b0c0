//! Inbound request decoding and validation.
//!
//! # Responsibilities
//! - Capture the headers the pipeline decides on (method, origin, content type)
//! - Undo the base64 transit encoding, exactly once, when flagged
//! - Reject malformed JSON and multipart uploads before any network call

use axum::body::Body;
use axum::http::{header, request::Parts, HeaderMap, Method};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use bytes::Bytes;

use crate::config::BodyMode;
use crate::http::request::{RequestIdExt, X_APP_SECRET};
use crate::proxy::error::ProxyError;

/// Header flagging a base64-encoded body, in either direction.
pub const X_IS_BASE64_ENCODED: &str = "x-is-base64-encoded";

/// Name of the multipart part carrying the upload.
pub const FILE_FIELD: &str = "file";

/// Content types the pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Multipart,
    Other,
}

impl BodyKind {
    pub fn of(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else {
            return BodyKind::Other;
        };
        let essence = ct
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            BodyKind::Json
        } else if essence == "multipart/form-data" {
            BodyKind::Multipart
        } else {
            BodyKind::Other
        }
    }
}

/// Request-scoped view of what the browser sent.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub origin: Option<String>,
    pub content_type: Option<String>,
    pub base64_encoded: bool,
    pub app_secret: Option<String>,
    pub request_id: String,
    pub body: Bytes,
}

impl InboundRequest {
    /// Capture the request head. The body is attached later, once the
    /// request has passed the method and origin checks.
    pub fn from_parts(parts: &Parts) -> Self {
        let headers = &parts.headers;
        Self {
            method: parts.method.clone(),
            origin: header_str(headers, header::ORIGIN.as_str()),
            content_type: header_str(headers, header::CONTENT_TYPE.as_str()),
            base64_encoded: header_str(headers, X_IS_BASE64_ENCODED)
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(false),
            app_secret: header_str(headers, X_APP_SECRET),
            request_id: headers.request_id().to_string(),
            body: Bytes::new(),
        }
    }

    /// Body bytes with the transit encoding removed.
    pub fn decoded_body(&self) -> Result<Bytes, ProxyError> {
        if !self.base64_encoded {
            return Ok(self.body.clone());
        }
        let text = std::str::from_utf8(&self.body)
            .map_err(|_| ProxyError::MalformedBody("base64 body is not text".to_string()))?;
        let stripped: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        B64.decode(stripped.as_bytes())
            .map(Bytes::from)
            .map_err(|e| ProxyError::MalformedBody(format!("invalid base64 body: {}", e)))
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Check the decoded body against the content type and body mode.
pub async fn validate_body(
    mode: BodyMode,
    content_type: Option<&str>,
    body: &Bytes,
) -> Result<(), ProxyError> {
    let kind = BodyKind::of(content_type);
    match (mode, kind) {
        (BodyMode::Json, BodyKind::Multipart | BodyKind::Other) if content_type.is_some() => {
            Err(ProxyError::UnsupportedMediaType(content_type.unwrap_or_default().to_string()))
        }
        (BodyMode::Multipart, BodyKind::Json | BodyKind::Other) => Err(
            ProxyError::UnsupportedMediaType(content_type.unwrap_or("none").to_string()),
        ),
        // A JSON-mode request without a content type is forwarded as JSON.
        (BodyMode::Json, _) | (_, BodyKind::Json) => validate_json(body),
        (_, BodyKind::Multipart) => {
            validate_multipart(content_type.unwrap_or_default(), body.clone()).await
        }
        (BodyMode::Any, BodyKind::Other) => Ok(()),
    }
}

fn validate_json(body: &Bytes) -> Result<(), ProxyError> {
    serde_json::from_slice::<serde_json::Value>(body)
        .map(|_| ())
        .map_err(|e| ProxyError::MalformedBody(format!("malformed JSON: {}", e)))
}

// The size limit was already enforced on the raw body, so the parser runs
// without one of its own.
async fn validate_multipart(content_type: &str, body: Bytes) -> Result<(), ProxyError> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| ProxyError::MalformedBody(format!("multipart: {}", e)))?;
    let mut multipart = multer::Multipart::new(Body::from(body).into_data_stream(), boundary);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ProxyError::MalformedBody(format!("multipart: {}", e)))?
    {
        if field.name() == Some(FILE_FIELD) {
            return Ok(());
        }
    }

    Err(ProxyError::MalformedBody(format!(
        "multipart body has no '{}' part",
        FILE_FIELD
    )))
}
