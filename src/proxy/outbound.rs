//! Backend response translation.
//!
//! # Responsibilities
//! - Classify the backend body as binary or text from its content type
//! - Base64-encode binary bodies and flag them for the browser
//! - Catch backends that declare JSON but send something else
//! - Turn a [`ProxyError`] into the client's JSON error response

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use bytes::Bytes;

use crate::config::ResponseConfig;
use crate::observability::metrics;
use crate::proxy::error::{ProxyError, UpstreamError};
use crate::proxy::forward::OutboundResponse;
use crate::proxy::inbound::{BodyKind, X_IS_BASE64_ENCODED};

/// Flags a raw binary body when base64 encoding is turned off.
pub const X_BINARY_BODY: &str = "x-binary-body";

const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Whether a content type carries bytes that cannot travel as text.
pub fn is_binary_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    matches!(
        essence.as_str(),
        "application/octet-stream" | "application/pdf" | "application/zip"
    ) || essence.starts_with("image/")
        || essence.starts_with("audio/")
        || essence.starts_with("video/")
}

/// Response on its way back to the browser.
#[derive(Debug, Clone)]
pub struct ProxiedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub binary: bool,
}

impl ProxiedResponse {
    /// Empty 204 used for preflight.
    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            binary: false,
        }
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: Bytes::from(value.to_string()),
            binary: false,
        }
    }

    pub fn from_error(error: &ProxyError) -> Self {
        let mut response = Self::json(error.status(), &error.body());
        if let ProxyError::MethodNotAllowed(_) = error {
            response
                .headers
                .insert(header::ALLOW, HeaderValue::from_static("POST, OPTIONS"));
        }
        response
    }

    /// Translate the backend answer. The status is mirrored as is.
    pub fn from_backend(
        upstream: OutboundResponse,
        config: &ResponseConfig,
    ) -> Result<Self, UpstreamError> {
        let content_type = upstream
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let binary = is_binary_content_type(&content_type);
        metrics::record_upstream(upstream.status.as_u16(), binary);

        if BodyKind::of(Some(content_type.as_str())) == BodyKind::Json
            && !upstream.body.is_empty()
            && serde_json::from_slice::<serde_json::Value>(&upstream.body).is_err()
        {
            return Err(UpstreamError::InvalidJson {
                snippet: snippet(&upstream.body, config.snippet_len),
            });
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type)
                .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE)),
        );

        let body = if !binary {
            upstream.body
        } else if config.encode_binary {
            headers.insert(X_IS_BASE64_ENCODED, HeaderValue::from_static("true"));
            Bytes::from(B64.encode(&upstream.body))
        } else {
            headers.insert(X_BINARY_BODY, HeaderValue::from_static("true"));
            upstream.body
        };

        Ok(Self {
            status: upstream.status,
            headers,
            body,
            binary,
        })
    }
}

impl IntoResponse for ProxiedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// First `len` characters of a body, lossily decoded.
fn snippet(body: &[u8], len: usize) -> String {
    String::from_utf8_lossy(body).chars().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(status: u16, content_type: Option<&str>, body: &'static [u8]) -> OutboundResponse {
        let mut headers = HeaderMap::new();
        if let Some(ct) = content_type {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(ct).unwrap());
        }
        OutboundResponse {
            status: StatusCode::from_u16(status).unwrap(),
            headers,
            body: Bytes::from_static(body),
        }
    }

    #[test]
    fn test_binary_classification() {
        for ct in [
            "application/pdf",
            "application/octet-stream",
            "application/zip",
            "image/png",
            "audio/mpeg",
            "video/mp4",
            "Application/PDF; name=a.pdf",
        ] {
            assert!(is_binary_content_type(ct), "{}", ct);
        }
        for ct in ["application/json", "text/plain", "text/html; charset=utf-8"] {
            assert!(!is_binary_content_type(ct), "{}", ct);
        }
    }

    #[test]
    fn test_pdf_is_base64_encoded() {
        let pdf = b"%PDF-1.4\x00\xff\xfe binary";
        let response = ProxiedResponse::from_backend(
            backend(200, Some("application/pdf"), pdf),
            &ResponseConfig::default(),
        )
        .unwrap();

        assert!(response.binary);
        assert_eq!(response.headers[X_IS_BASE64_ENCODED], "true");
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/pdf");
        assert_eq!(B64.decode(&response.body).unwrap(), pdf.to_vec());
    }

    #[test]
    fn test_raw_binary_when_encoding_disabled() {
        let config = ResponseConfig {
            encode_binary: false,
            ..Default::default()
        };
        let response =
            ProxiedResponse::from_backend(backend(200, Some("image/png"), b"\x89PNG"), &config)
                .unwrap();
        assert_eq!(response.headers[X_BINARY_BODY], "true");
        assert!(response.headers.get(X_IS_BASE64_ENCODED).is_none());
        assert_eq!(response.body, Bytes::from_static(b"\x89PNG"));
    }

    #[test]
    fn test_text_passes_through_with_status() {
        let response = ProxiedResponse::from_backend(
            backend(422, Some("application/json"), br#"{"error":"bad pdf"}"#),
            &ResponseConfig::default(),
        )
        .unwrap();
        assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(!response.binary);
        assert!(response.headers.get(X_IS_BASE64_ENCODED).is_none());
        assert_eq!(response.body, Bytes::from_static(br#"{"error":"bad pdf"}"#));
    }

    #[test]
    fn test_missing_content_type_defaults_to_text() {
        let response = ProxiedResponse::from_backend(
            backend(200, None, b"plain summary"),
            &ResponseConfig::default(),
        )
        .unwrap();
        assert_eq!(response.headers[header::CONTENT_TYPE], "text/plain");
        assert!(!response.binary);
    }

    #[test]
    fn test_declared_json_that_is_not_json() {
        let html: &'static [u8] = b"<html><body>Service Unavailable</body></html>";
        let config = ResponseConfig {
            snippet_len: 12,
            ..Default::default()
        };
        let err = ProxiedResponse::from_backend(backend(200, Some("application/json"), html), &config)
            .unwrap_err();
        match err {
            UpstreamError::InvalidJson { snippet } => assert_eq!(snippet, "<html><body>"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_method_not_allowed_sets_allow() {
        let response = ProxiedResponse::from_error(&ProxyError::MethodNotAllowed("GET".into()));
        assert_eq!(response.status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers[header::ALLOW], "POST, OPTIONS");
        assert_eq!(response.headers[header::CONTENT_TYPE], "application/json");
    }
}
