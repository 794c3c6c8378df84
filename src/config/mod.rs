//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON/TOML, path from the command line)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks, all errors collected)
//!     → Settings (validated, immutable)
//!     → shared by value / Arc with every subsystem
//! ```
//!
//! # Design Decisions
//! - Loaded once at startup; there is no reload path
//! - Optional sections have defaults; required ones are checked, not defaulted
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError, ConfigFormat};
pub use schema::{
    BridgeConfig, BrokerConfig, BrokerOptions, ListenerConfig, LoginOptions, ObservabilityConfig,
    RestConfig, Settings,
};
pub use validation::ValidationError;
