//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Root configuration for the upload proxy.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Paths served by the proxy.
    pub routes: RoutesConfig,

    /// Summarization backend the uploads are forwarded to.
    pub backend: BackendConfig,

    /// Identity used to mint bearer tokens for the backend.
    pub credentials: CredentialsConfig,

    /// CORS policy applied to every response.
    pub cors: CorsConfig,

    /// Accepted inbound body shapes.
    pub body: BodyConfig,

    /// Response translation settings.
    pub response: ResponseConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request gatekeeping.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Paths exposed to the browser.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Upload endpoint (preflight + POST).
    pub proxy_path: String,

    /// Liveness endpoint.
    pub health_path: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            proxy_path: "/summarize".to_string(),
            health_path: "/health".to_string(),
        }
    }
}

/// Backend service configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the summarization backend, without trailing slash.
    pub url: Option<String>,

    /// Token audience. Falls back to `url` when unset.
    pub audience: Option<String>,

    /// Fixed path appended to `url` for every forwarded upload.
    pub path: String,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: None,
            audience: None,
            path: "/summarize_rfp".to_string(),
        }
    }
}

impl BackendConfig {
    /// Full URL uploads are posted to.
    pub fn target_url(&self) -> Option<String> {
        self.url
            .as_deref()
            .map(|base| format!("{}{}", base.trim_end_matches('/'), self.path))
    }

    /// Audience the bearer token is minted for.
    pub fn audience(&self) -> Option<String> {
        self.audience
            .as_deref()
            .or(self.url.as_deref())
            .map(|aud| aud.trim_end_matches('/').to_string())
            .filter(|aud| !aud.is_empty())
    }
}

/// Which identity sources may be used to mint tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialMode {
    /// Explicit service account if configured, else the ambient identity.
    #[default]
    Auto,
    /// Only an explicit service account; never the metadata server.
    Explicit,
    /// Only the ambient metadata-server identity.
    Ambient,
}

/// Identity configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Identity source selection.
    pub mode: CredentialMode,

    /// Service account email.
    pub client_email: Option<String>,

    /// Service account private key (PEM, `\n` escapes allowed).
    pub private_key: Option<String>,

    /// Path to a service-account JSON key file.
    pub credentials_file: Option<String>,

    /// OAuth token endpoint the signed assertion is exchanged at.
    pub token_uri: String,

    /// Base URL of the compute metadata server.
    pub metadata_url: String,

    /// Reuse minted tokens per audience until shortly before expiry.
    pub cache_tokens: bool,

    /// Tokens are refreshed this many seconds before they expire.
    pub refresh_margin_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            mode: CredentialMode::Auto,
            client_email: None,
            private_key: None,
            credentials_file: None,
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            metadata_url: "http://metadata.google.internal".to_string(),
            cache_tokens: true,
            refresh_margin_secs: 300,
        }
    }
}

// Hand-written so the private key never ends up in logs.
impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("mode", &self.mode)
            .field("client_email", &self.client_email)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("credentials_file", &self.credentials_file)
            .field("token_uri", &self.token_uri)
            .field("metadata_url", &self.metadata_url)
            .field("cache_tokens", &self.cache_tokens)
            .field("refresh_margin_secs", &self.refresh_margin_secs)
            .finish()
    }
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins. Empty or containing `*` means any origin.
    pub allowed_origins: Vec<String>,

    /// `Access-Control-Allow-Origin` value used when any origin is allowed.
    pub default_origin: String,

    /// `Access-Control-Allow-Methods` value.
    pub allow_methods: String,

    /// `Access-Control-Allow-Headers` value.
    pub allow_headers: String,

    /// `Access-Control-Max-Age` sent on preflight responses.
    pub max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: Vec::new(),
            default_origin: "*".to_string(),
            allow_methods: "POST, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization, X-App-Secret".to_string(),
            max_age_secs: 86_400,
        }
    }
}

/// Inbound body shapes the proxy accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyMode {
    /// JSON or multipart.
    #[default]
    Any,
    /// JSON only.
    Json,
    /// `multipart/form-data` with a `file` part only.
    Multipart,
}

/// Inbound body configuration.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BodyConfig {
    pub mode: BodyMode,
}

/// Response translation configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Base64-encode binary backend bodies.
    pub encode_binary: bool,

    /// Characters of a non-JSON backend body quoted in the 502 error.
    pub snippet_len: usize,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            encode_binary: true,
            snippet_len: 200,
        }
    }
}

/// Timeout configuration for the two network calls and the whole request.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Token mint timeout in seconds.
    pub credential_secs: u64,

    /// Backend forward timeout in seconds.
    pub forward_secs: u64,

    /// Overall request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            credential_secs: 10,
            forward_secs: 60,
            request_secs: 90,
        }
    }
}

impl TimeoutConfig {
    pub fn credential(&self) -> Duration {
        Duration::from_secs(self.credential_secs)
    }

    pub fn forward(&self) -> Duration {
        Duration::from_secs(self.forward_secs)
    }

    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }
}

/// Request gatekeeping configuration.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Shared secret expected in `X-App-Secret`, when set.
    pub app_secret: Option<String>,

    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            app_secret: None,
            max_body_size: 10 * 1024 * 1024, // 10MB
        }
    }
}

impl fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("app_secret", &self.app_secret.as_ref().map(|_| "<redacted>"))
            .field("max_body_size", &self.max_body_size)
            .finish()
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
