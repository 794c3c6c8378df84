//! Broker connection state machine.
//!
//! # States
//! - Disconnected: no session (initial, after close or shutdown)
//! - Connecting: dialing / waiting for CONNECTED
//! - Connected: session established, sends accepted
//! - Errored: broker refused the session or the dial failed
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting → Connected → Disconnected
//!                     │            │
//!                     └─▶ Errored ◀┘   (then back to Connecting on retry)
//! ```
//!
//! Only the broker binding drives transitions; everyone else observes.

use std::fmt;
use std::sync::Arc;

use tokio::sync::watch;

use crate::observability::metrics;

/// Connection state for the single broker session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Errored,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Errored => "errored",
        }
    }

    fn gauge_value(&self) -> f64 {
        match self {
            ConnectionState::Disconnected => 0.0,
            ConnectionState::Connecting => 1.0,
            ConnectionState::Connected => 2.0,
            ConnectionState::Errored => 3.0,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared, subscribable view of the broker connection state.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Debug, Clone)]
pub struct ConnectionGate {
    tx: Arc<watch::Sender<ConnectionState>>,
}

impl ConnectionGate {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConnectionState::Disconnected);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.current() == ConnectionState::Connected
    }

    /// Receiver that observes every subsequent transition.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.tx.subscribe()
    }

    /// Move to `next`. Returns false when already in that state.
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut previous = next;
        let changed = self.tx.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            previous = *state;
            *state = next;
            true
        });

        if changed {
            tracing::info!(from = %previous, to = %next, "Broker connection state changed");
            metrics::record_broker_state(next.gauge_value());
        }
        changed
    }

    /// Resolve once the gate is (or becomes) Connected.
    pub async fn wait_until_connected(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot observe a closed channel.
        let _ = rx.wait_for(|state| *state == ConnectionState::Connected).await;
    }
}

impl Default for ConnectionGate {
    fn default() -> Self {
        Self::new()
    }
}
