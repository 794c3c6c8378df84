//! Pending acknowledgment table.
//!
//! Maps receipt ids to the request waiting for them. Removing an entry is the
//! single-resolution primitive: whichever path removes it (acknowledgment,
//! timeout, dispatch failure, cancellation) is the only one that resolves it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::broker::ReceiptId;

/// Delivered to the waiting request when the broker acknowledges.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgment {
    pub receipt: ReceiptId,
    /// Time between registration and acknowledgment.
    pub latency: Duration,
}

/// A request waiting for its receipt.
struct PendingAcknowledgment {
    created_at: Instant,
    resolver: oneshot::Sender<Acknowledgment>,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("receipt {0} is already pending")]
pub struct DuplicateReceipt(pub ReceiptId);

/// Counters for the table's lifetime.
#[derive(Debug, Default)]
pub struct PendingStats {
    pub registered: AtomicU64,
    pub acknowledged: AtomicU64,
    pub timed_out: AtomicU64,
    pub cancelled: AtomicU64,
    /// Acknowledgments that arrived for nothing pending (late or unknown).
    pub ignored: AtomicU64,
}

#[derive(Default)]
pub struct PendingTable {
    pending: DashMap<ReceiptId, PendingAcknowledgment>,
    stats: PendingStats,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and get the receiver its acknowledgment will arrive on.
    pub fn register(
        &self,
        id: ReceiptId,
    ) -> Result<oneshot::Receiver<Acknowledgment>, DuplicateReceipt> {
        match self.pending.entry(id) {
            Entry::Occupied(entry) => Err(DuplicateReceipt(entry.key().clone())),
            Entry::Vacant(entry) => {
                let (tx, rx) = oneshot::channel();
                entry.insert(PendingAcknowledgment {
                    created_at: Instant::now(),
                    resolver: tx,
                });
                self.stats.registered.fetch_add(1, Ordering::Relaxed);
                Ok(rx)
            }
        }
    }

    /// Resolve `id` as acknowledged. Returns false if nothing was pending
    /// under that id (already resolved, timed out, or never registered).
    pub fn acknowledge(&self, id: &ReceiptId) -> bool {
        let Some((receipt, pending)) = self.pending.remove(id) else {
            self.stats.ignored.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(receipt_id = %id, "Acknowledgment for unknown or expired receipt ignored");
            return false;
        };

        let latency = pending.created_at.elapsed();
        self.stats.acknowledged.fetch_add(1, Ordering::Relaxed);
        // The waiter may have been dropped in the meantime; nothing to deliver then.
        let _ = pending.resolver.send(Acknowledgment { receipt, latency });
        true
    }

    /// Remove `id` because its timer fired. False means another path won.
    pub fn expire(&self, id: &ReceiptId) -> bool {
        if self.pending.remove(id).is_some() {
            self.stats.timed_out.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    /// Remove `id` without resolving it (dispatch failed or waiter went away).
    pub fn cancel(&self, id: &ReceiptId) -> bool {
        if self.pending.remove(id).is_some() {
            self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self, id: &ReceiptId) -> bool {
        self.pending.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
