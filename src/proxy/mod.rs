//! Authenticated forwarding subsystem.
//!
//! # Data Flow
//! ```text
//! Request<Body>
//!     → cors.rs (origin decision, preflight)
//!     → inbound.rs (headers, base64 transit decode, body validation)
//!     → credentials (bearer token for the backend audience)
//!     → forward.rs (POST to backend, bounded by forward timeout)
//!     → outbound.rs (binary/text bifurcation)
//!     → ProxiedResponse (+ CORS headers)
//! ```
//!
//! Failures at any step are [`ProxyError`]s rendered by the pipeline.

pub mod cors;
pub mod error;
pub mod forward;
pub mod inbound;
pub mod outbound;
pub mod pipeline;

pub use cors::{CorsPolicy, OriginDecision};
pub use error::{ProxyError, UpstreamError};
pub use forward::{Forwarder, OutboundRequest, OutboundResponse};
pub use inbound::{BodyKind, InboundRequest, X_IS_BASE64_ENCODED};
pub use outbound::{is_binary_content_type, ProxiedResponse, X_BINARY_BODY};
pub use pipeline::{Pipeline, Stage};
