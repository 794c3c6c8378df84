//! Listener bootstrap.
//!
//! # Responsibilities
//! - Turn listener configuration into ready-to-bind listeners (TLS material loaded)
//! - Bind each listener and report its address
//! - Serve the shared router until a graceful shutdown is requested

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::config::ListenerConfig;
use crate::net::tls::{load_tls_config, TlsError};

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to bind {scheme} listener on port {port}: {source}")]
    Bind {
        scheme: &'static str,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("{scheme} listener on {address} failed: {source}")]
    Serve {
        scheme: &'static str,
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("{scheme} listener task aborted")]
    Aborted { scheme: &'static str },
}

/// A listener whose material has been validated but which is not bound yet.
pub enum PreparedListener {
    Plain { port: u16 },
    Tls { port: u16, config: RustlsConfig },
}

impl PreparedListener {
    pub fn port(&self) -> u16 {
        match self {
            PreparedListener::Plain { port } | PreparedListener::Tls { port, .. } => *port,
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            PreparedListener::Plain { .. } => "http",
            PreparedListener::Tls { .. } => "https",
        }
    }
}

/// Load the TLS material of every listener. Any failure is fatal.
pub fn prepare_listeners(configs: &[ListenerConfig]) -> Result<Vec<PreparedListener>, TlsError> {
    configs
        .iter()
        .map(|config| match config {
            ListenerConfig::Plain { port } => Ok(PreparedListener::Plain { port: *port }),
            ListenerConfig::Tls { port, .. } => Ok(PreparedListener::Tls {
                port: *port,
                config: load_tls_config(config)?,
            }),
        })
        .collect()
}

/// A bound listener serving in the background.
pub struct RunningListener {
    scheme: &'static str,
    address: SocketAddr,
    handle: Handle,
    task: JoinHandle<Result<(), ListenerError>>,
}

impl RunningListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.address
    }

    pub fn scheme(&self) -> &'static str {
        self.scheme
    }

    /// Stop accepting, give in-flight requests `grace` to finish, then close.
    pub async fn shutdown(self, grace: Duration) -> Result<(), ListenerError> {
        self.handle.graceful_shutdown(Some(grace));
        let result = match self.task.await {
            Ok(result) => result,
            Err(_) => Err(ListenerError::Aborted {
                scheme: self.scheme,
            }),
        };
        tracing::info!(scheme = self.scheme, address = %self.address, "Listener stopped");
        result
    }
}

/// Bind `prepared` on all interfaces and serve `router` on it.
///
/// Returns once the socket is bound, so bind failures surface here.
pub async fn start_listener(
    prepared: PreparedListener,
    router: Router,
) -> Result<RunningListener, ListenerError> {
    let scheme = prepared.scheme();
    let port = prepared.port();
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let handle = Handle::new();
    let app = router.into_make_service();

    let server_handle = handle.clone();
    let mut task = tokio::spawn(async move {
        let served = match prepared {
            PreparedListener::Plain { .. } => {
                axum_server::bind(addr)
                    .handle(server_handle)
                    .serve(app)
                    .await
            }
            PreparedListener::Tls { config, .. } => {
                axum_server::bind_rustls(addr, config)
                    .handle(server_handle)
                    .serve(app)
                    .await
            }
        };
        served.map_err(|source| ListenerError::Serve {
            scheme,
            address: addr,
            source,
        })
    });

    let Some(address) = handle.listening().await else {
        // The server exited before binding; its error says why.
        let source = match (&mut task).await {
            Ok(Err(ListenerError::Serve { source, .. })) => source,
            Ok(Err(e)) => std::io::Error::other(e.to_string()),
            Ok(Ok(())) => std::io::Error::other("server exited before binding"),
            Err(e) => std::io::Error::other(e.to_string()),
        };
        return Err(ListenerError::Bind {
            scheme,
            port,
            source,
        });
    };

    tracing::info!(scheme, address = %address, "Listening for connections");
    Ok(RunningListener {
        scheme,
        address,
        handle,
        task,
    })
}
