//! broker-bridge
//!
//! Synchronous HTTP front for an asynchronous message broker.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                    BROKER BRIDGE                     │
//!                 │                                                      │
//!  POST /dest     │  ┌─────────┐   ┌─────────┐   ┌──────────────────┐    │
//!  ───────────────┼─▶│   net   │──▶│  http   │──▶│   correlation    │    │
//!                 │  │listeners│   │ bridge  │   │ engine + pending │    │
//!                 │  └─────────┘   └────┬────┘   └────────┬─────────┘    │
//!                 │                     │ gate            │ send+receipt │
//!                 │                     ▼                 ▼              │
//!  {receiptId}    │               ┌──────────┐    ┌──────────────────┐   │     STOMP
//!  ◀──────────────┼───────────────│  broker  │◀───│  stomp client    │◀──┼──── broker
//!                 │               │  state   │    │ (ws / wss)       │   │
//!                 │               └──────────┘    └──────────────────┘   │
//!                 │                                                      │
//!                 │  config · lifecycle · observability · resilience     │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use broker_bridge::config::load_config;
use broker_bridge::lifecycle::{signals, startup, Shutdown};
use broker_bridge::observability::{logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "broker-bridge", version, about = "HTTP to message broker bridge")]
struct Args {
    /// Configuration file (JSON when it ends in .json, TOML otherwise)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Both TLS stacks (listeners and wss) share this provider.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let settings = match load_config(&args.config) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init_logging("info");
            tracing::error!(config = %args.config.display(), error = %e, "Invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    logging::init_logging(&settings.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "broker-bridge starting");
    tracing::info!(
        broker_url = %settings.broker_url,
        home_route = %settings.rest.normalized_home_route(),
        send_confirm_timeout_ms = settings.rest.send_confirm_timeout_ms,
        listeners = settings.listeners.len(),
        "Configuration loaded"
    );

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    match startup::run(settings, shutdown).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            ExitCode::FAILURE
        }
    }
}
