//! Credential provider subsystem.
//!
//! # Data Flow
//! ```text
//! CredentialsConfig (resolved once at start-up)
//!     → service_account.rs (explicit email + key, or key file)
//!     → metadata.rs (ambient identity of the host)
//!     → cache.rs (optional per-audience reuse)
//!     → Credential → "Authorization: Bearer <token>"
//! ```
//!
//! # Identity resolution order
//! 1. `client_email` + `private_key` (config file, then `GCP_SA_*` env pair)
//! 2. service-account key file (`GOOGLE_APPLICATION_CREDENTIALS`)
//! 3. metadata server, unless `mode = "explicit"`
//!
//! `mode = "ambient"` skips 1 and 2.
//!
//! # Security Constraints
//! - Private keys and tokens are never logged or included in error messages

pub mod cache;
pub mod metadata;
pub mod service_account;

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use crate::config::{CredentialMode, CredentialsConfig};

pub use cache::CachingProvider;
pub use metadata::MetadataProvider;
pub use service_account::ServiceAccountProvider;

/// A bearer token minted for one audience.
#[derive(Clone)]
pub struct Credential {
    pub token: String,
    pub audience: String,
    pub expires_at: Option<SystemTime>,
}

impl Credential {
    /// Build a credential, reading the expiry from the token's `exp` claim when present.
    pub fn new(token: String, audience: &str) -> Self {
        let expires_at = jwt_expiry(&token);
        Self {
            token,
            audience: audience.to_string(),
            expires_at,
        }
    }

    /// Value for the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    /// Whether the token is still usable `margin` from now.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(exp) => SystemTime::now() + margin < exp,
            None => false,
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("audience", &self.audience)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Errors that can occur while obtaining a credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No explicit identity and no ambient default identity.
    #[error("credential unavailable: {0}")]
    Unavailable(String),

    /// The identity provider refused or failed the request.
    #[error("credential mint failed: {0}")]
    MintFailed(String),
}

/// Produces bearer credentials for an audience.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credential(&self, audience: &str) -> Result<Credential, CredentialError>;

    /// Short name for logs and metrics.
    fn kind(&self) -> &'static str;
}

/// Provider used when no identity could be resolved.
#[derive(Debug, Clone)]
pub struct UnavailableProvider {
    reason: String,
}

impl UnavailableProvider {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl CredentialProvider for UnavailableProvider {
    async fn credential(&self, _audience: &str) -> Result<Credential, CredentialError> {
        Err(CredentialError::Unavailable(self.reason.clone()))
    }

    fn kind(&self) -> &'static str {
        "none"
    }
}

/// Turn literal `\n` sequences into line breaks.
///
/// Only applies when the key has no real line break, so correctly stored
/// keys pass through untouched.
pub fn normalize_private_key(key: &str) -> String {
    if key.contains("\\n") && !key.contains('\n') {
        key.replace("\\n", "\n")
    } else {
        key.to_string()
    }
}

/// Read the `exp` claim of a JWT without verifying it.
pub fn jwt_expiry(token: &str) -> Option<SystemTime> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?.as_u64()?;
    Some(UNIX_EPOCH + Duration::from_secs(exp))
}

/// Resolve the configured identity into a provider.
pub fn provider_from_config(
    config: &CredentialsConfig,
    client: reqwest::Client,
) -> Arc<dyn CredentialProvider> {
    let base = resolve_identity(config, client);
    tracing::info!(
        provider = base.kind(),
        cache = config.cache_tokens,
        "Credential provider resolved"
    );

    if config.cache_tokens {
        Arc::new(CachingProvider::new(
            base,
            Duration::from_secs(config.refresh_margin_secs),
        ))
    } else {
        base
    }
}

fn resolve_identity(
    config: &CredentialsConfig,
    client: reqwest::Client,
) -> Arc<dyn CredentialProvider> {
    if config.mode != CredentialMode::Ambient {
        if let (Some(email), Some(key)) = (&config.client_email, &config.private_key) {
            return Arc::new(ServiceAccountProvider::new(
                email,
                key,
                &config.token_uri,
                client,
            ));
        }

        if let Some(path) = &config.credentials_file {
            return match ServiceAccountProvider::from_key_file(
                std::path::Path::new(path),
                &config.token_uri,
                client,
            ) {
                Ok(provider) => Arc::new(provider),
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "Service account key file unusable");
                    Arc::new(UnavailableProvider::new(e.to_string()))
                }
            };
        }
    }

    match config.mode {
        CredentialMode::Explicit => Arc::new(UnavailableProvider::new(
            "no service account configured and ambient identity disabled",
        )),
        CredentialMode::Auto | CredentialMode::Ambient => {
            Arc::new(MetadataProvider::new(&config.metadata_url, client))
        }
    }
}
