//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ListenerConfig (http / https)
//!     → tls.rs (read key, certificate and CA files; build rustls config)
//!     → listener.rs (prepare all, then bind each once the broker is up)
//!     → axum-server serving the bridge router
//! ```
//!
//! # Design Decisions
//! - All TLS material is validated before any socket binds
//! - Plain and TLS listeners share one router
//! - Graceful shutdown goes through an axum-server Handle per listener

pub mod listener;
pub mod tls;

pub use listener::{prepare_listeners, start_listener, ListenerError, PreparedListener, RunningListener};
pub use tls::{load_tls_config, served_chain, TlsError};
