//! STOMP-over-WebSocket binding of the broker contract.
//!
//! # Data Flow
//! ```text
//! BrokerConnection::send
//!     → client.rs (register receipt callback, queue frame)
//!     → writer half of the WebSocket (frame.rs encoding)
//!
//! WebSocket reader half
//!     → frame.rs decoding (heart-beats skipped)
//!     → RECEIPT → callback(receipt id)
//!     → ERROR   → session ends, gate → Errored, reconnect with backoff
//! ```

pub mod client;
pub mod frame;

pub use client::StompConnection;
pub use frame::{Command, Frame, FrameError};
