//! Structured logging.
//!
//! Uses the `tracing` crate; `RUST_LOG` wins over the configured level.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
pub fn init_logging(level: &str) {
    let default_filter = format!("summarizer_proxy={level},tower_http={level}");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
