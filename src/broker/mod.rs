//! Broker connection subsystem.
//!
//! # Data Flow
//! ```text
//! correlation engine
//!     → BrokerConnection::send(message, on_ack)
//!     → binding (stomp/) writes SEND with a receipt header
//!     → broker answers RECEIPT
//!     → binding invokes on_ack(receipt id)
//!
//! Lifecycle events (dial, CONNECTED, ERROR, close)
//!     → state.rs ConnectionGate transitions
//!     → subscribers (listener bootstrap, request bridge)
//! ```
//!
//! # Design Decisions
//! - The core only sees the `BrokerConnection` trait; wire details stay in the binding
//! - Receipt ids are minted by the caller so the pending record exists before
//!   the broker can possibly answer
//! - A single logical connection; the binding serializes writes internally

pub mod state;
pub mod stomp;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use state::{ConnectionGate, ConnectionState};

/// Identifier the broker echoes back when it accepts a message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(String);

impl ReceiptId {
    /// Mint a fresh, process-unique receipt id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ReceiptId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for ReceiptId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message ready to be handed to the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    /// Normalized destination, without the binding's wire prefix.
    pub destination: String,
    pub headers: HashMap<String, String>,
    pub body: String,
    /// Receipt the broker must echo to acknowledge this message.
    pub receipt: ReceiptId,
}

/// Single-use acknowledgment callback, invoked with the echoed receipt id.
pub type AckCallback = Box<dyn FnOnce(ReceiptId) + Send + Sync + 'static>;

/// Errors raised by a broker binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    Closed,

    #[error("connect timed out")]
    ConnectTimeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("broker TLS error: {0}")]
    Tls(String),
}

/// Contract every broker binding fulfils.
///
/// `send` must return synchronously: `Ok` once the message is queued for the
/// wire, `Err` if it cannot be (for instance while disconnected). The callback
/// fires at most once, later, when the broker acknowledges the receipt.
///
/// `forget` is called when the sender stops waiting (timeout or dropped
/// request); the binding must release the callback it holds for `receipt`.
pub trait BrokerConnection: Send + Sync + 'static {
    fn state(&self) -> ConnectionState;

    fn send(&self, message: OutboundMessage, on_ack: AckCallback) -> Result<(), BrokerError>;

    fn forget(&self, receipt: &ReceiptId);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receipt_ids_are_unique() {
        assert_ne!(ReceiptId::generate(), ReceiptId::generate());
    }

    #[test]
    fn receipt_id_serializes_as_string() {
        let id = ReceiptId::from("r1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"r1\"");
    }
}
