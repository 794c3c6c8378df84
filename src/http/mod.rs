//! HTTP request bridge.
//!
//! # Data Flow
//! ```text
//! HTTP/HTTPS request
//!     → server.rs (request id, trace span, optional basic auth)
//!     → request.rs (home route, method, JSON body → SendRequest)
//!     → ConnectionGate (refuse while the broker is not connected)
//!     → CorrelationEngine::send
//!     → response.rs ({"receiptId"} or {"exception"}, always 200)
//! ```

pub mod auth;
pub mod request;
pub mod response;
pub mod server;

use thiserror::Error;

use crate::broker::ReceiptId;
use crate::correlation::SendOutcome;

pub use response::BridgeResponse;
pub use server::{AppState, BridgeServer};

/// Why a bridge request did not produce a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not connected")]
    NotConnected,

    #[error("{0}")]
    SendFailed(String),

    #[error("timeout. unable to confirm message send")]
    TimedOut,
}

impl BridgeError {
    /// Metric label, matching the `outcome` label of the engine.
    pub fn label(&self) -> &'static str {
        match self {
            BridgeError::BadRequest(_) => "bad_request",
            BridgeError::NotConnected => "not_connected",
            BridgeError::SendFailed(_) => "failed",
            BridgeError::TimedOut => "timeout",
        }
    }
}

impl From<SendOutcome> for Result<ReceiptId, BridgeError> {
    fn from(outcome: SendOutcome) -> Self {
        match outcome {
            SendOutcome::Acknowledged(id) => Ok(id),
            SendOutcome::TimedOut => Err(BridgeError::TimedOut),
            SendOutcome::Failed(reason) => Err(BridgeError::SendFailed(reason)),
        }
    }
}
