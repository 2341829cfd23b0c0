//! Per-audience token cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::credentials::{Credential, CredentialError, CredentialProvider};
use crate::observability::metrics;

/// Wraps a provider and reuses its tokens until `margin` before expiry.
///
/// Tokens without a readable expiry are never stored.
pub struct CachingProvider {
    inner: Arc<dyn CredentialProvider>,
    tokens: DashMap<String, Credential>,
    margin: Duration,
}

impl CachingProvider {
    pub fn new(inner: Arc<dyn CredentialProvider>, margin: Duration) -> Self {
        Self {
            inner,
            tokens: DashMap::new(),
            margin,
        }
    }

    /// Number of cached audiences.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl CredentialProvider for CachingProvider {
    async fn credential(&self, audience: &str) -> Result<Credential, CredentialError> {
        if let Some(cached) = self.tokens.get(audience) {
            if cached.is_fresh(self.margin) {
                metrics::record_credential_cache_hit(self.inner.kind());
                return Ok(cached.clone());
            }
        }
        self.tokens.remove(audience);

        let credential = self.inner.credential(audience).await?;
        if credential.expires_at.is_some() {
            self.tokens.insert(audience.to_string(), credential.clone());
        }
        Ok(credential)
    }

    fn kind(&self) -> &'static str {
        self.inner.kind()
    }
}
