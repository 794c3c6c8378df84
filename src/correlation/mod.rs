//! Request / acknowledgment correlation.
//!
//! # Data Flow
//! ```text
//! SendRequest
//!     → engine.rs: mint ReceiptId, register in pending.rs
//!     → BrokerConnection::send(message, acknowledger)
//!     → race: acknowledger(receipt) vs. timer
//!     → exactly one SendOutcome
//! ```
//!
//! # Design Decisions
//! - Pending records are keyed by receipt id, never by arrival order
//! - Removal from the pending table decides the winner of ack vs. timeout
//! - Dispatch failures resolve immediately and never start a timer
//! - No resend after a timeout

pub mod engine;
pub mod pending;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::broker::ReceiptId;

pub use engine::CorrelationEngine;
pub use pending::{Acknowledgment, PendingTable};

/// Result of one correlated send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Acknowledged(ReceiptId),
    TimedOut,
    Failed(String),
}

impl SendOutcome {
    /// Metric label for this outcome.
    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Acknowledged(_) => "acknowledged",
            SendOutcome::TimedOut => "timeout",
            SendOutcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for SendOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendOutcome::Acknowledged(id) => write!(f, "acknowledged ({})", id),
            SendOutcome::TimedOut => f.write_str("timed out"),
            SendOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("destination is empty")]
pub struct EmptyDestination;

/// One message to deliver, built from an inbound HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    destination: String,
    headers: HashMap<String, String>,
    body: String,
}

impl SendRequest {
    pub fn new(
        destination: &str,
        headers: HashMap<String, String>,
        body: String,
    ) -> Result<Self, EmptyDestination> {
        Ok(Self {
            destination: normalize_destination(destination).ok_or(EmptyDestination)?,
            headers,
            body,
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn into_parts(self) -> (String, HashMap<String, String>, String) {
        (self.destination, self.headers, self.body)
    }
}

/// Strip surrounding separators; `None` if nothing remains.
///
/// `/queue/a/` → `queue/a`.
pub fn normalize_destination(raw: &str) -> Option<String> {
    let trimmed = raw.trim_matches('/');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
