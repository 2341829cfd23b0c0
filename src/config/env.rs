//! Environment overlay.
//!
//! Applied once at start-up on top of the file (or default) configuration.
//! Request handling never reads the environment.

use std::collections::HashMap;
use std::env;

use crate::config::schema::ProxyConfig;

pub const BACKEND_URL: &str = "BACKEND_URL";
pub const BACKEND_AUDIENCE: &str = "BACKEND_AUDIENCE";
pub const BACKEND_PATH: &str = "BACKEND_PATH";
pub const SA_CLIENT_EMAIL: &str = "GCP_SA_CLIENT_EMAIL";
pub const SA_PRIVATE_KEY: &str = "GCP_SA_PRIVATE_KEY";
pub const APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";
pub const ALLOWED_ORIGIN: &str = "ALLOWED_ORIGIN";
pub const APP_SECRET: &str = "PROXY_APP_SECRET";
pub const BIND_ADDRESS: &str = "PROXY_BIND_ADDRESS";
pub const FORWARD_TIMEOUT_SECS: &str = "PROXY_FORWARD_TIMEOUT_SECS";

/// Source of environment variables.
pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, env::VarError>;
}

/// Delegates to `std::env`.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    #[inline]
    fn var(&self, key: &str) -> Result<String, env::VarError> {
        env::var(key)
    }
}

/// Fixed set of variables, for tests and embedding.
#[derive(Debug, Default, Clone)]
pub struct MapEnv(pub HashMap<String, String>);

impl MapEnv {
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.0.insert(key.to_string(), value.to_string());
        self
    }
}

impl ReadEnv for MapEnv {
    fn var(&self, key: &str) -> Result<String, env::VarError> {
        self.0.get(key).cloned().ok_or(env::VarError::NotPresent)
    }
}

fn non_empty<E: ReadEnv>(env: &E, key: &str) -> Option<String> {
    env.var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Overlay environment values onto `config`.
///
/// The service-account pair is only taken when both halves are present, and
/// only when the file configuration did not already name an identity.
pub fn apply_env_overrides<E: ReadEnv>(config: &mut ProxyConfig, env: &E) {
    if let Some(url) = non_empty(env, BACKEND_URL) {
        config.backend.url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(aud) = non_empty(env, BACKEND_AUDIENCE) {
        config.backend.audience = Some(aud.trim_end_matches('/').to_string());
    }
    if let Some(path) = non_empty(env, BACKEND_PATH) {
        config.backend.path = path;
    }

    let creds = &mut config.credentials;
    if creds.client_email.is_none() && creds.private_key.is_none() {
        if let (Some(email), Some(key)) = (
            non_empty(env, SA_CLIENT_EMAIL),
            non_empty(env, SA_PRIVATE_KEY),
        ) {
            creds.client_email = Some(email);
            creds.private_key = Some(key);
        }
    }
    if creds.credentials_file.is_none() {
        creds.credentials_file = non_empty(env, APPLICATION_CREDENTIALS);
    }

    if let Some(origins) = non_empty(env, ALLOWED_ORIGIN) {
        config.cors.allowed_origins = origins
            .split(',')
            .map(|o| o.trim().trim_end_matches('/').to_string())
            .filter(|o| !o.is_empty())
            .collect();
    }

    if let Some(secret) = non_empty(env, APP_SECRET) {
        config.security.app_secret = Some(secret);
    }
    if let Some(addr) = non_empty(env, BIND_ADDRESS) {
        config.listener.bind_address = addr;
    }
    if let Some(secs) = non_empty(env, FORWARD_TIMEOUT_SECS) {
        match secs.parse() {
            Ok(secs) => config.timeouts.forward_secs = secs,
            Err(_) => tracing::warn!(value = %secs, "Ignoring non-numeric {}", FORWARD_TIMEOUT_SECS),
        }
    }
}
