//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate URLs, paths and value ranges
//! - Check that identity settings are complete
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system
//! - A missing backend URL is not an error here; it is reported per request

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid URL '{value}'")]
    InvalidUrl { field: &'static str, value: String },

    #[error("{field}: path '{value}' must start with '/'")]
    InvalidPath { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("listener.bind_address: '{0}' is not a socket address")]
    BindAddress(String),

    #[error("routes.proxy_path and routes.health_path must differ")]
    RouteConflict,

    #[error("credentials: client_email and private_key must be set together")]
    IncompleteIdentity,

    #[error("cors.allowed_origins: '{0}' is not an origin")]
    InvalidOrigin(String),

    #[error("timeouts.request_secs ({request}) must exceed credential_secs + forward_secs ({inner})")]
    TimeoutBudget { request: u64, inner: u64 },
}

/// Check every semantic constraint and collect all failures.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if let Some(url) = &config.backend.url {
        check_http_url(&mut errors, "backend.url", url);
    }
    if let Some(aud) = &config.backend.audience {
        if aud.trim().is_empty() {
            errors.push(ValidationError::InvalidUrl {
                field: "backend.audience",
                value: aud.clone(),
            });
        }
    }
    if !config.backend.path.is_empty() && !config.backend.path.starts_with('/') {
        errors.push(ValidationError::InvalidPath {
            field: "backend.path",
            value: config.backend.path.clone(),
        });
    }

    for (field, path) in [
        ("routes.proxy_path", &config.routes.proxy_path),
        ("routes.health_path", &config.routes.health_path),
    ] {
        if !path.starts_with('/') {
            errors.push(ValidationError::InvalidPath {
                field,
                value: path.clone(),
            });
        }
    }
    if config.routes.proxy_path == config.routes.health_path {
        errors.push(ValidationError::RouteConflict);
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    for (field, value) in [
        ("timeouts.credential_secs", config.timeouts.credential_secs),
        ("timeouts.forward_secs", config.timeouts.forward_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }
    let inner = config
        .timeouts
        .credential_secs
        .saturating_add(config.timeouts.forward_secs);
    if config.timeouts.request_secs <= inner {
        errors.push(ValidationError::TimeoutBudget {
            request: config.timeouts.request_secs,
            inner,
        });
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero {
            field: "security.max_body_size",
        });
    }

    let creds = &config.credentials;
    if creds.client_email.is_some() != creds.private_key.is_some() {
        errors.push(ValidationError::IncompleteIdentity);
    }
    check_http_url(&mut errors, "credentials.token_uri", &creds.token_uri);
    check_http_url(&mut errors, "credentials.metadata_url", &creds.metadata_url);

    for origin in &config.cors.allowed_origins {
        if origin != "*" && !is_origin(origin) {
            errors.push(ValidationError::InvalidOrigin(origin.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_http_url(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    let ok = Url::parse(value)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false);
    if !ok {
        errors.push(ValidationError::InvalidUrl {
            field,
            value: value.to_string(),
        });
    }
}

// An origin is scheme://host[:port], optionally with one trailing slash.
fn is_origin(value: &str) -> bool {
    let trimmed = value.trim();
    let bare = trimmed.strip_suffix('/').unwrap_or(trimmed);
    match Url::parse(bare) {
        Ok(u) => {
            u.host_str().is_some()
                && u.path() == "/"
                && !bare.ends_with('/')
                && u.query().is_none()
                && u.fragment().is_none()
        }
        Err(_) => false,
    }
}
