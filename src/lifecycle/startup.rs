//! Startup orchestration.
//!
//! Configuration is already loaded and validated when [`serve`] runs. It
//! starts the metrics exporter, resolves the identity, binds the listener
//! and blocks until shutdown.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::ProxyConfig;
use crate::http::{HttpServer, ServerError};
use crate::net::load_tls_config;
use crate::observability::metrics;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to load TLS material: {0}")]
    Tls(#[source] io::Error),

    #[error(transparent)]
    Server(#[from] ServerError),
}

/// Start every subsystem and serve until `shutdown` fires.
pub async fn serve(
    config: ProxyConfig,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match config.backend.target_url() {
        Some(target) => tracing::info!(target = %target, "Backend configured"),
        None => tracing::warn!("BACKEND_URL is not set; uploads will fail until it is configured"),
    }

    let bind_address = config.listener.bind_address.clone();
    let tls = config.listener.tls.clone();
    let server = HttpServer::new(config)?;

    match tls {
        Some(tls) => {
            let addr: SocketAddr = bind_address
                .parse()
                .map_err(|_| StartupError::BindAddress(bind_address.clone()))?;
            let rustls = load_tls_config(&tls).await.map_err(StartupError::Tls)?;
            server.run_tls(addr, rustls, shutdown).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address)
                .await
                .map_err(|source| StartupError::Bind {
                    addr: bind_address.clone(),
                    source,
                })?;
            server.run(listener, shutdown).await?;
        }
    }

    Ok(())
}
