//! HTTP to message-broker bridge.
//!
//! Accepts `POST <homeRoute>/<destination>` requests, forwards each message to
//! the broker with a receipt request, and answers once the broker confirms or
//! the confirm timeout elapses.

pub mod broker;
pub mod config;
pub mod correlation;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;

pub use config::Settings;
pub use correlation::CorrelationEngine;
pub use http::BridgeServer;
pub use lifecycle::Shutdown;
