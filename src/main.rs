//! Summarizer proxy
//!
//! Authenticated reverse proxy between a browser uploader and a private
//! summarization backend.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────────┐
//!                         │                 SUMMARIZER PROXY                  │
//!                         │                                                   │
//!   Browser upload        │  ┌────────┐   ┌──────────┐   ┌──────────────┐     │
//!   ──────────────────────┼─▶│  http  │──▶│  proxy   │──▶│ credentials  │     │
//!                         │  │ server │   │ pipeline │   │ SA / metadata│     │
//!                         │  └────────┘   └────┬─────┘   └──────┬───────┘     │
//!                         │                    │  bearer token   │            │
//!                         │                    ▼◀────────────────┘            │
//!   JSON / base64 body    │  ┌────────┐   ┌──────────┐                        │
//!   ◀─────────────────────┼──│  CORS  │◀──│ forward  │◀───────────────────────┼──── Backend
//!                         │  └────────┘   └──────────┘                        │
//!                         │                                                   │
//!                         │  config · observability · lifecycle · net (TLS)   │
//!                         └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use summarizer_proxy::config::{self, env::SystemEnv};
use summarizer_proxy::lifecycle::{self, Shutdown};
use summarizer_proxy::observability::logging;

#[derive(Parser, Debug)]
#[command(name = "summarizer-proxy", version, about = "Authenticated proxy for the summarization backend")]
struct Cli {
    /// Optional TOML configuration file; environment variables override it.
    #[arg(short, long, env = "PROXY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = config::load(cli.config.as_deref(), &SystemEnv)?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind_address = %config.listener.bind_address,
        proxy_path = %config.routes.proxy_path,
        forward_timeout_secs = config.timeouts.forward_secs,
        credential_mode = ?config.credentials.mode,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let mut server = tokio::spawn(lifecycle::serve(config, shutdown.subscribe()));

    tokio::select! {
        _ = lifecycle::wait_for_signal() => {
            shutdown.trigger();
        }
        result = &mut server => {
            result??;
            return Ok(());
        }
    }

    server.await??;
    tracing::info!("Shutdown complete");
    Ok(())
}
