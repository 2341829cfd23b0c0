//! Network layer subsystem.
//!
//! Plain TCP is bound directly by the server; this module only covers the
//! optional TLS termination.

pub mod tls;

pub use tls::load_tls_config;
