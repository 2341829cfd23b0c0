//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → env.rs (environment overlay)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared via Arc to the pipeline
//! ```
//!
//! # Design Decisions
//! - Config is built once at start-up; request handling never reads the environment
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod env;
pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load, ConfigError};
pub use schema::{
    BackendConfig, BodyConfig, BodyMode, CorsConfig, CredentialMode, CredentialsConfig,
    ListenerConfig, ObservabilityConfig, ProxyConfig, ResponseConfig, RoutesConfig,
    SecurityConfig, TimeoutConfig, TlsConfig,
};
pub use validation::ValidationError;
