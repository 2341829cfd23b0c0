//! Summarizer proxy library.
//!
//! Mints a Google identity token for a private backend, forwards browser
//! uploads to it and hands the answer back with CORS headers and
//! binary-safe encoding.

pub mod config;
pub mod credentials;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod proxy;

pub use config::schema::ProxyConfig;
pub use credentials::{Credential, CredentialError, CredentialProvider};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use proxy::{Pipeline, ProxyError};
