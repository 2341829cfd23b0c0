//! Service-account identity tokens.
//!
//! Signs an RS256 assertion with the account's private key and exchanges it
//! at the OAuth token endpoint for an identity token whose `aud` is the
//! requested audience.

use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::{
    pkcs1::DecodeRsaPrivateKey,
    pkcs1v15::SigningKey,
    pkcs8::DecodePrivateKey,
    signature::{RandomizedSigner, SignatureEncoding},
    RsaPrivateKey,
};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::credentials::{normalize_private_key, Credential, CredentialError, CredentialProvider};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: u64 = 3600;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    sub: &'a str,
    aud: &'a str,
    target_audience: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Subset of a service-account JSON key file.
#[derive(Deserialize)]
struct KeyFile {
    #[serde(rename = "type")]
    kind: Option<String>,
    client_email: String,
    private_key: String,
    token_uri: Option<String>,
}

/// Mints identity tokens for an explicit service account.
pub struct ServiceAccountProvider {
    client_email: String,
    private_key_pem: String,
    token_uri: String,
    client: reqwest::Client,
}

impl ServiceAccountProvider {
    /// Create a provider from an email and PEM key (`\n` escapes allowed).
    pub fn new(client_email: &str, private_key: &str, token_uri: &str, client: reqwest::Client) -> Self {
        Self {
            client_email: client_email.to_string(),
            private_key_pem: normalize_private_key(private_key),
            token_uri: token_uri.to_string(),
            client,
        }
    }

    /// Create a provider from a service-account JSON key file.
    ///
    /// The file's own `token_uri` wins over `default_token_uri`.
    pub fn from_key_file(
        path: &Path,
        default_token_uri: &str,
        client: reqwest::Client,
    ) -> Result<Self, CredentialError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CredentialError::Unavailable(format!("cannot read key file {}: {}", path.display(), e))
        })?;
        let key: KeyFile = serde_json::from_str(&content).map_err(|e| {
            CredentialError::Unavailable(format!("invalid key file {}: {}", path.display(), e))
        })?;
        if let Some(kind) = key.kind.as_deref() {
            if kind != "service_account" {
                return Err(CredentialError::Unavailable(format!(
                    "key file {} has type '{}', expected 'service_account'",
                    path.display(),
                    kind
                )));
            }
        }

        let token_uri = key.token_uri.as_deref().unwrap_or(default_token_uri);
        Ok(Self::new(&key.client_email, &key.private_key, token_uri, client))
    }

    /// Build the signed assertion for `audience` issued at `now`.
    pub fn assertion(&self, audience: &str, now: SystemTime) -> Result<String, CredentialError> {
        let key = parse_private_key(&self.private_key_pem)?;

        let iat = now
            .duration_since(UNIX_EPOCH)
            .map_err(|_| CredentialError::MintFailed("system clock before epoch".to_string()))?
            .as_secs();
        let claims = AssertionClaims {
            iss: &self.client_email,
            sub: &self.client_email,
            aud: &self.token_uri,
            target_audience: audience,
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let claims = serde_json::to_vec(&claims)
            .map_err(|e| CredentialError::MintFailed(format!("encode claims: {}", e)))?;
        let signing_input = format!("{}.{}", header, URL_SAFE_NO_PAD.encode(claims));

        let signing_key = SigningKey::<Sha256>::new(key);
        let mut rng = rand::rngs::OsRng;
        let signature = signing_key.sign_with_rng(&mut rng, signing_input.as_bytes());

        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        ))
    }
}

fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, CredentialError> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|_| CredentialError::MintFailed("private key is not a valid RSA PEM key".to_string()))
}

#[async_trait]
impl CredentialProvider for ServiceAccountProvider {
    async fn credential(&self, audience: &str) -> Result<Credential, CredentialError> {
        let assertion = self.assertion(audience, SystemTime::now())?;

        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| CredentialError::MintFailed(format!("token endpoint unreachable: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::MintFailed(format!("read token response: {}", e)))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(desc) => format!("{}: {}", err.error, desc),
                    None => err.error,
                },
                Err(_) => body.chars().take(200).collect(),
            };
            return Err(CredentialError::MintFailed(format!(
                "token endpoint returned {}: {}",
                status.as_u16(),
                detail
            )));
        }

        let token = serde_json::from_str::<TokenResponse>(&body)
            .ok()
            .and_then(|t| t.id_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                CredentialError::MintFailed("token endpoint response has no id_token".to_string())
            })?;

        tracing::debug!(
            client_email = %self.client_email,
            audience = %audience,
            "Minted service account identity token"
        );
        Ok(Credential::new(token, audience))
    }

    fn kind(&self) -> &'static str {
        "service_account"
    }
}
