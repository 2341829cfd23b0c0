//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline and credential providers produce:
//!     → logging.rs (structured log events, request ID in every span)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Prometheus scrape (optional)
//! ```

pub mod logging;
pub mod metrics;
