//! Send-and-wait-for-receipt engine.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time;

use crate::broker::{AckCallback, BrokerConnection, OutboundMessage, ReceiptId};
use crate::correlation::pending::PendingTable;
use crate::correlation::{SendOutcome, SendRequest};
use crate::observability::metrics;

/// Correlates broker sends with their receipts.
///
/// Each `send` registers its own pending record, so concurrent sends never
/// observe each other, and receipts may arrive in any order.
pub struct CorrelationEngine {
    broker: Arc<dyn BrokerConnection>,
    pending: Arc<PendingTable>,
    timeout: Duration,
}

impl CorrelationEngine {
    pub fn new(broker: Arc<dyn BrokerConnection>, timeout: Duration) -> Self {
        Self {
            broker,
            pending: Arc::new(PendingTable::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn pending(&self) -> &PendingTable {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Dispatch `request` and wait for exactly one outcome.
    pub async fn send(&self, request: SendRequest) -> SendOutcome {
        let receipt = ReceiptId::generate();
        let mut rx = match self.pending.register(receipt.clone()) {
            Ok(rx) => rx,
            Err(e) => return self.finish(SendOutcome::Failed(e.to_string())),
        };
        // Removes the record if this future is dropped before resolution.
        let _guard = PendingGuard {
            table: &self.pending,
            broker: self.broker.as_ref(),
            id: receipt.clone(),
        };

        let (destination, headers, body) = request.into_parts();
        let message = OutboundMessage {
            destination: destination.clone(),
            headers,
            body,
            receipt: receipt.clone(),
        };

        if let Err(e) = self.broker.send(message, acknowledger(Arc::downgrade(&self.pending))) {
            self.pending.cancel(&receipt);
            tracing::warn!(destination = %destination, error = %e, "Send dispatch failed");
            return self.finish(SendOutcome::Failed(e.to_string()));
        }
        metrics::record_pending(self.pending.len());

        let outcome = match time::timeout(self.timeout, &mut rx).await {
            Ok(Ok(ack)) => {
                metrics::record_ack_latency(ack.latency);
                SendOutcome::Acknowledged(ack.receipt)
            }
            // The sender is only dropped unresolved when the record was removed
            // without an acknowledgment, so nothing can arrive any more.
            Ok(Err(_)) => {
                self.broker.forget(&receipt);
                SendOutcome::TimedOut
            }
            Err(_) if self.pending.expire(&receipt) => {
                self.broker.forget(&receipt);
                tracing::warn!(
                    destination = %destination,
                    receipt_id = %receipt,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "No receipt before timeout"
                );
                SendOutcome::TimedOut
            }
            // The acknowledgment removed the record first; its value is in flight.
            Err(_) => match rx.await {
                Ok(ack) => SendOutcome::Acknowledged(ack.receipt),
                Err(_) => SendOutcome::TimedOut,
            },
        };

        self.finish(outcome)
    }

    fn finish(&self, outcome: SendOutcome) -> SendOutcome {
        metrics::record_request(outcome.label());
        metrics::record_pending(self.pending.len());
        outcome
    }
}

/// Callback handed to the broker: resolves whatever receipt it is given.
fn acknowledger(table: Weak<PendingTable>) -> AckCallback {
    Box::new(move |receipt: ReceiptId| {
        if let Some(table) = table.upgrade() {
            table.acknowledge(&receipt);
        }
    })
}

struct PendingGuard<'a> {
    table: &'a PendingTable,
    broker: &'a dyn BrokerConnection,
    id: ReceiptId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.table.cancel(&self.id) {
            self.broker.forget(&self.id);
            tracing::debug!(receipt_id = %self.id, "Waiting request dropped before resolution");
        }
    }
}
