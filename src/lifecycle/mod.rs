//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Load TLS material → Start broker task → Wait for Connected → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop listeners (grace period) → Stop broker task → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::StartupError;
