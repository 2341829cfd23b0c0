//! Identity resolution wired through the real server constructor.

use std::time::{SystemTime, UNIX_EPOCH};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;
use tower::ServiceExt;
use wiremock::matchers::{body_string_contains, header as header_eq, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use summarizer_proxy::config::{CredentialMode, ProxyConfig};
use summarizer_proxy::http::HttpServer;

mod common;
use common::{bounded, start_mock_backend, MockResponse};

fn id_token(lifetime_secs: u64) -> String {
    let exp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() + lifetime_secs;
    format!(
        "{}.{}.sig",
        URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256"}"#),
        URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{},"aud":"backend"}}"#, exp))
    )
}

fn escaped_key() -> String {
    let key = RsaPrivateKey::new(&mut rand::rngs::OsRng, 1024).unwrap();
    key.to_pkcs8_pem(LineEnding::LF)
        .unwrap()
        .to_string()
        .replace('\n', "\\n")
}

fn upload() -> Request<Body> {
    Request::post("/summarize")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"filename":"a.pdf","content":""}"#))
        .unwrap()
}

#[tokio::test]
async fn test_service_account_token_reaches_backend_and_is_cached() {
    let token = id_token(3600);
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("jwt-bearer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "id_token": token })))
        .expect(1)
        .mount(&idp)
        .await;

    let backend = start_mock_backend(MockResponse::json(r#"{"summary":"ok"}"#)).await;

    let mut config = ProxyConfig::default();
    config.backend.url = Some(backend.url());
    config.credentials.mode = CredentialMode::Explicit;
    config.credentials.client_email = Some("proxy@project.iam.gserviceaccount.com".into());
    config.credentials.private_key = Some(escaped_key());
    config.credentials.token_uri = format!("{}/token", idp.uri());

    let router = HttpServer::new(config).unwrap().router();
    for _ in 0..2 {
        let response = bounded(router.clone().oneshot(upload())).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let seen = backend.last_request().unwrap();
    assert_eq!(seen.header("authorization"), Some(format!("Bearer {}", token)));
    assert_eq!(backend.calls(), 2);
}

#[tokio::test]
async fn test_identity_provider_rejection_is_502() {
    let idp = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        })))
        .mount(&idp)
        .await;
    let backend = start_mock_backend(MockResponse::json("{}")).await;

    let mut config = ProxyConfig::default();
    config.backend.url = Some(backend.url());
    config.credentials.client_email = Some("proxy@project.iam.gserviceaccount.com".into());
    config.credentials.private_key = Some(escaped_key());
    config.credentials.token_uri = format!("{}/token", idp.uri());

    let response = bounded(HttpServer::new(config).unwrap().router().oneshot(upload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("invalid_grant"));
    assert!(!text.contains("PRIVATE KEY"));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn test_ambient_identity_from_metadata_server() {
    let token = id_token(3600);
    let metadata = MockServer::start().await;
    let backend = start_mock_backend(MockResponse::json("{}")).await;

    Mock::given(method("GET"))
        .and(path("/computeMetadata/v1/instance/service-accounts/default/identity"))
        .and(query_param("audience", backend.url()))
        .and(header_eq("metadata-flavor", "Google"))
        .respond_with(ResponseTemplate::new(200).set_body_string(token.clone()))
        .expect(1)
        .mount(&metadata)
        .await;

    let mut config = ProxyConfig::default();
    config.backend.url = Some(backend.url());
    config.credentials.mode = CredentialMode::Ambient;
    config.credentials.metadata_url = metadata.uri();

    let response = bounded(HttpServer::new(config).unwrap().router().oneshot(upload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        backend.last_request().unwrap().header("authorization"),
        Some(format!("Bearer {}", token))
    );
}

#[tokio::test]
async fn test_explicit_mode_without_identity_is_500() {
    let backend = start_mock_backend(MockResponse::json("{}")).await;
    let mut config = ProxyConfig::default();
    config.backend.url = Some(backend.url());
    config.credentials.mode = CredentialMode::Explicit;

    let response = bounded(HttpServer::new(config).unwrap().router().oneshot(upload()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(backend.calls(), 0);
}
