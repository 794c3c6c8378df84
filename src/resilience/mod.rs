//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Broker session lost or refused:
//!     → backoff.rs (doubling ceiling from BrokerOptions, jittered, capped)
//!     → reconnect attempt
//!
//! Request waiting on a receipt:
//!     → correlation engine timer (rest.sendConfirmTimeoutMS)
//!     → TimedOut reported to the caller, never resent
//! ```
//!
//! # Design Decisions
//! - Reconnects retry forever until shutdown; the delay is capped, not the count
//! - Sends are never retried: a timed-out message may still have been delivered

pub mod backoff;
