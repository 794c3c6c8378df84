//! Startup orchestration.
//!
//! # Responsibilities
//! - Validate listener TLS material before anything else
//! - Start the broker connection task
//! - Hold listeners back until the broker first reports Connected
//! - Stop listeners and the broker task on shutdown
//!
//! # Design Decisions
//! - Fail fast: TLS and bind errors are fatal
//! - Listeners start last (traffic only when the broker is reachable)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, oneshot};

use crate::broker::stomp::StompConnection;
use crate::broker::{BrokerConnection, BrokerError, ConnectionGate};
use crate::config::{RestConfig, Settings};
use crate::correlation::CorrelationEngine;
use crate::http::BridgeServer;
use crate::lifecycle::Shutdown;
use crate::net::{prepare_listeners, start_listener, ListenerError, PreparedListener, RunningListener, TlsError};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Run the bridge until `shutdown` fires.
pub async fn run(settings: Settings, shutdown: Shutdown) -> Result<(), StartupError> {
    let stop = shutdown.subscribe();
    let prepared = prepare_listeners(&settings.listeners)?;

    let gate = ConnectionGate::new();
    let connection = Arc::new(StompConnection::new(
        settings.broker_url.clone(),
        settings.broker.clone(),
        gate.clone(),
    )?);
    let broker_task = tokio::spawn(connection.clone().run(shutdown.subscribe()));

    let result = serve(&settings.rest, prepared, connection, gate, stop, None).await;

    // Stops the broker task when serving ended on an error.
    shutdown.trigger();
    if broker_task.await.is_err() {
        tracing::error!("Broker task ended abnormally");
    }
    tracing::info!("Shutdown complete");
    result
}

/// Serve the bridge on `prepared` listeners over an existing broker connection.
///
/// Waits for the gate's first Connected before binding. `on_ready` receives
/// the bound addresses once every listener is up.
pub async fn serve(
    rest: &RestConfig,
    prepared: Vec<PreparedListener>,
    broker: Arc<dyn BrokerConnection>,
    gate: ConnectionGate,
    mut stop: broadcast::Receiver<()>,
    on_ready: Option<oneshot::Sender<Vec<SocketAddr>>>,
) -> Result<(), StartupError> {
    // In-flight requests resolve within the confirm timeout.
    let grace = rest.send_confirm_timeout();
    let engine = Arc::new(CorrelationEngine::new(broker, grace));
    let server = BridgeServer::new(rest, engine, gate.clone());

    tracing::info!("Waiting for broker connection before accepting requests");
    tokio::select! {
        _ = gate.wait_until_connected() => {}
        _ = stop.recv() => {
            tracing::info!("Shutdown requested before the broker connected");
            return Ok(());
        }
    }

    let mut running = Vec::with_capacity(prepared.len());
    for listener in prepared {
        match start_listener(listener, server.router()).await {
            Ok(listener) => running.push(listener),
            Err(e) => {
                let _ = stop_all(running, grace).await;
                return Err(e.into());
            }
        }
    }

    if let Some(ready) = on_ready {
        let _ = ready.send(running.iter().map(RunningListener::local_addr).collect());
    }

    let _ = stop.recv().await;
    tracing::info!(listeners = running.len(), "Stopping listeners");
    stop_all(running, grace).await.map_err(Into::into)
}

async fn stop_all(listeners: Vec<RunningListener>, grace: Duration) -> Result<(), ListenerError> {
    let mut first_error = None;
    for listener in listeners {
        if let Err(e) = listener.shutdown(grace).await {
            tracing::error!(error = %e, "Listener failed");
            first_error.get_or_insert(e);
        }
    }
    first_error.map_or(Ok(()), Err)
}
