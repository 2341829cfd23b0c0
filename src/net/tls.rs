//! TLS configuration and certificate loading.

use std::io;
use std::path::Path;

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsConfig;

/// Load the PEM certificate chain and private key named in `config`.
pub async fn load_tls_config(config: &TlsConfig) -> Result<RustlsConfig, io::Error> {
    let cert_path = Path::new(&config.cert_path);
    let key_path = Path::new(&config.key_path);

    if !cert_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("certificate file not found: {}", cert_path.display()),
        ));
    }
    if !key_path.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("private key file not found: {}", key_path.display()),
        ));
    }

    RustlsConfig::from_pem_file(cert_path, key_path).await
}
