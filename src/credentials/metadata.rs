//! Ambient identity from the compute metadata server.

use async_trait::async_trait;

use crate::credentials::{Credential, CredentialError, CredentialProvider};

const IDENTITY_PATH: &str = "/computeMetadata/v1/instance/service-accounts/default/identity";

/// Mints identity tokens for the host's default service account.
pub struct MetadataProvider {
    base_url: String,
    client: reqwest::Client,
}

impl MetadataProvider {
    pub fn new(base_url: &str, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl CredentialProvider for MetadataProvider {
    async fn credential(&self, audience: &str) -> Result<Credential, CredentialError> {
        let url = format!("{}{}", self.base_url, IDENTITY_PATH);
        let response = self
            .client
            .get(&url)
            .query(&[("audience", audience), ("format", "full")])
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                // Not running on a host with a metadata server.
                if e.is_connect() {
                    CredentialError::Unavailable(format!(
                        "no ambient identity: metadata server unreachable ({})",
                        e
                    ))
                } else {
                    CredentialError::MintFailed(format!("metadata server request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::MintFailed(format!("read metadata response: {}", e)))?;

        if !status.is_success() {
            return Err(CredentialError::MintFailed(format!(
                "metadata server returned {}: {}",
                status.as_u16(),
                body.chars().take(200).collect::<String>()
            )));
        }

        let token = body.trim();
        if token.is_empty() {
            return Err(CredentialError::MintFailed(
                "metadata server returned an empty token".to_string(),
            ));
        }

        tracing::debug!(audience = %audience, "Minted ambient identity token");
        Ok(Credential::new(token.to_string(), audience))
    }

    fn kind(&self) -> &'static str {
        "metadata"
    }
}
