//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, routes)
//!     → request.rs (request ID assigned or kept)
//!     → proxy::Pipeline (authenticated forwarding)
//!     → Send to client
//! ```

pub mod request;
pub mod server;

pub use request::{MakeRequestUuid, RequestIdExt, X_APP_SECRET, X_REQUEST_ID};
pub use server::{AppState, HttpServer, ServerError};
