//! Configuration schema definitions.
//!
//! Key names follow the bridge's established configuration files
//! (`homeRoute`, `sendConfirmTimeoutMS`, `msgBroker`, `private_key`, ...), so
//! the same document can be written in JSON or TOML. Sections the bridge
//! cannot run without are `Option`s here; `validation.rs` turns their absence
//! into startup errors instead of silently substituting defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root of the configuration document, as parsed.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    /// HTTP side: home route, confirmation timeout, listeners.
    pub rest: Option<RestConfig>,

    /// Broker side: endpoint, TLS, session options.
    #[serde(rename = "msgBroker")]
    pub msg_broker: Option<BrokerConfig>,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// REST service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RestConfig {
    /// Path prefix under which destinations are addressed.
    #[serde(rename = "homeRoute")]
    pub home_route: String,

    /// How long to wait for a broker receipt before answering with a timeout.
    #[serde(rename = "sendConfirmTimeoutMS")]
    pub send_confirm_timeout_ms: u64,

    /// Largest accepted request body.
    #[serde(rename = "maxBodyBytes")]
    pub max_body_bytes: usize,

    /// Optional HTTP Basic credentials required from callers.
    #[serde(rename = "basicAuth")]
    pub basic_auth: Option<BasicAuthConfig>,

    /// Enabled transports.
    pub protocols: Option<ProtocolsConfig>,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            home_route: "/".to_string(),
            send_confirm_timeout_ms: 20_000,
            max_body_bytes: 2 * 1024 * 1024,
            basic_auth: None,
            protocols: None,
        }
    }
}

impl RestConfig {
    /// Home route with a single leading separator and no trailing one
    /// (`/` stays `/`).
    pub fn normalized_home_route(&self) -> String {
        let trimmed = self.home_route.trim().trim_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", trimmed)
        }
    }

    pub fn send_confirm_timeout(&self) -> Duration {
        Duration::from_millis(self.send_confirm_timeout_ms)
    }
}

/// Credentials for HTTP Basic authentication.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    pub login: String,
    pub passcode: String,
}

/// Transport section; a transport is enabled by being present.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProtocolsConfig {
    pub http: Option<HttpProtocolConfig>,
    pub https: Option<HttpsProtocolConfig>,
}

/// Plaintext listener settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HttpProtocolConfig {
    pub port: Option<u16>,
}

/// TLS listener settings. Paths point at PEM files.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HttpsProtocolConfig {
    pub port: Option<u16>,
    pub private_key: Option<String>,
    pub certificate: Option<String>,
    pub ca_files: Vec<String>,
}

/// A validated, enabled listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerConfig {
    Plain {
        port: u16,
    },
    Tls {
        port: u16,
        private_key: PathBuf,
        certificate: PathBuf,
        ca_files: Vec<PathBuf>,
    },
}

impl ListenerConfig {
    pub fn port(&self) -> u16 {
        match self {
            ListenerConfig::Plain { port } | ListenerConfig::Tls { port, .. } => *port,
        }
    }

    /// URL scheme served by this listener.
    pub fn scheme(&self) -> &'static str {
        match self {
            ListenerConfig::Plain { .. } => "http",
            ListenerConfig::Tls { .. } => "https",
        }
    }
}

/// Message broker configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerConfig {
    /// WebSocket endpoint (`ws://` or `wss://`).
    pub url: Option<String>,

    #[serde(rename = "tlsOptions")]
    pub tls_options: BrokerTlsOptions,

    #[serde(rename = "brokerOptions")]
    pub broker_options: BrokerOptions,

    #[serde(rename = "loginOptions")]
    pub login_options: LoginOptions,

    /// HTTP Basic credentials required from callers. Older documents keep
    /// them here; `rest.basicAuth` takes precedence when both are set.
    #[serde(rename = "login_options", skip_serializing_if = "Option::is_none")]
    pub http_login: Option<BasicAuthConfig>,
}

/// Extra trust anchors for `wss://` endpoints.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BrokerTlsOptions {
    pub ca_files: Vec<String>,
}

/// Session behaviour of the broker connection.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrokerOptions {
    /// Prepended to every destination on the wire.
    #[serde(rename = "destinationPrefix")]
    pub destination_prefix: String,

    #[serde(rename = "connectTimeoutMS")]
    pub connect_timeout_ms: u64,

    /// Base delay for reconnect backoff.
    #[serde(rename = "reconnectDelayMS")]
    pub reconnect_delay_ms: u64,

    #[serde(rename = "maxReconnectDelayMS")]
    pub max_reconnect_delay_ms: u64,

    /// Outgoing heart-beat interval; 0 disables.
    #[serde(rename = "heartbeatOutgoingMS")]
    pub heartbeat_outgoing_ms: u64,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self {
            destination_prefix: "/".to_string(),
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            heartbeat_outgoing_ms: 10_000,
        }
    }
}

/// Credentials and virtual host sent with CONNECT.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoginOptions {
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub host: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Configuration after validation: every required section present and every
/// enabled listener complete.
#[derive(Debug, Clone)]
pub struct Settings {
    pub rest: RestConfig,
    pub broker: BrokerConfig,
    pub broker_url: url::Url,
    pub listeners: Vec<ListenerConfig>,
    pub observability: ObservabilityConfig,
}
