//! CORS negotiation.
//!
//! The allow-origin header is only ever set to a value the policy approved;
//! rejected origins get the remaining CORS headers so the browser sees a
//! well-formed response and blocks it.

use std::collections::HashSet;

use axum::http::{header, HeaderMap, HeaderValue};

use crate::config::CorsConfig;

/// Outcome of checking a request's `Origin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginDecision {
    /// Value to send as `Access-Control-Allow-Origin`.
    Allowed(HeaderValue),
    Rejected,
}

impl OriginDecision {
    pub fn allow_origin(&self) -> Option<&HeaderValue> {
        match self {
            OriginDecision::Allowed(value) => Some(value),
            OriginDecision::Rejected => None,
        }
    }
}

#[derive(Debug, Clone)]
enum OriginPolicy {
    Any(HeaderValue),
    List(HashSet<String>),
}

/// CORS policy compiled from configuration.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    origins: OriginPolicy,
    allow_methods: HeaderValue,
    allow_headers: HeaderValue,
    max_age: HeaderValue,
}

impl CorsPolicy {
    pub fn from_config(config: &CorsConfig) -> Self {
        let any = config.allowed_origins.is_empty()
            || config.allowed_origins.iter().any(|o| o.trim() == "*");

        let origins = if any {
            OriginPolicy::Any(
                HeaderValue::from_str(&config.default_origin)
                    .unwrap_or_else(|_| HeaderValue::from_static("*")),
            )
        } else {
            OriginPolicy::List(
                config
                    .allowed_origins
                    .iter()
                    .map(|o| o.trim().trim_end_matches('/').to_ascii_lowercase())
                    .collect(),
            )
        };

        Self {
            origins,
            allow_methods: HeaderValue::from_str(&config.allow_methods)
                .unwrap_or_else(|_| HeaderValue::from_static("POST, OPTIONS")),
            allow_headers: HeaderValue::from_str(&config.allow_headers)
                .unwrap_or_else(|_| HeaderValue::from_static("Content-Type")),
            max_age: HeaderValue::from(config.max_age_secs),
        }
    }

    /// Decide whether `origin` may read the response.
    pub fn check(&self, origin: Option<&str>) -> OriginDecision {
        match &self.origins {
            OriginPolicy::Any(default) => OriginDecision::Allowed(default.clone()),
            OriginPolicy::List(allowed) => {
                let Some(origin) = origin.map(str::trim).filter(|o| !o.is_empty()) else {
                    return OriginDecision::Rejected;
                };
                if !allowed.contains(&origin.to_ascii_lowercase()) {
                    return OriginDecision::Rejected;
                }
                match HeaderValue::from_str(origin) {
                    Ok(value) => OriginDecision::Allowed(value),
                    Err(_) => OriginDecision::Rejected,
                }
            }
        }
    }

    /// Add the CORS headers every response carries.
    pub fn apply(&self, headers: &mut HeaderMap, decision: &OriginDecision) {
        if let Some(origin) = decision.allow_origin() {
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.clone());
        }
        headers.insert(header::ACCESS_CONTROL_ALLOW_METHODS, self.allow_methods.clone());
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, self.allow_headers.clone());
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
    }

    /// CORS headers plus the preflight cache lifetime.
    pub fn apply_preflight(&self, headers: &mut HeaderMap, decision: &OriginDecision) {
        self.apply(headers, decision);
        headers.insert(header::ACCESS_CONTROL_MAX_AGE, self.max_age.clone());
    }
}
