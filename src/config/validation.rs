//! Configuration validation.
//!
//! # Responsibilities
//! - Reject documents missing a required section (`rest`, `rest.protocols`, `msgBroker`)
//! - Check every enabled listener is complete (ports, key, certificate)
//! - Validate value ranges (timeout > 0, ports > 0, broker URL scheme)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: &BridgeConfig → Result<Settings, Vec<ValidationError>>
//! - File readability is checked later by `net::tls`, still before any port is bound

use std::path::PathBuf;

use thiserror::Error;

use crate::config::schema::{
    BridgeConfig, HttpProtocolConfig, HttpsProtocolConfig, ListenerConfig, RestConfig, Settings,
};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing \"{0}\" config")]
    MissingSection(&'static str),

    #[error("no {0} port specified")]
    MissingPort(&'static str),

    #[error("{0} port must be greater than zero")]
    ZeroPort(&'static str),

    #[error("no private key file specified")]
    MissingPrivateKey,

    #[error("no certificate file specified")]
    MissingCertificate,

    #[error("no web service to run")]
    NoListeners,

    #[error("sendConfirmTimeoutMS must be greater than zero")]
    ZeroTimeout,

    #[error("no broker url specified")]
    MissingBrokerUrl,

    #[error("invalid broker url {url:?}: {reason}")]
    InvalidBrokerUrl { url: String, reason: String },
}

/// Validate a parsed document and produce the settings the service runs on.
pub fn validate_config(config: &BridgeConfig) -> Result<Settings, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rest = config.rest.as_ref();
    if rest.is_none() {
        errors.push(ValidationError::MissingSection("rest"));
    }

    let mut listeners = Vec::new();
    if let Some(rest) = rest {
        if rest.send_confirm_timeout_ms == 0 {
            errors.push(ValidationError::ZeroTimeout);
        }
        match &rest.protocols {
            None => errors.push(ValidationError::MissingSection("protocols")),
            Some(protocols) => {
                if let Some(http) = &protocols.http {
                    match plain_listener(http) {
                        Ok(listener) => listeners.push(listener),
                        Err(e) => errors.push(e),
                    }
                }
                if let Some(https) = &protocols.https {
                    match tls_listener(https) {
                        Ok(listener) => listeners.push(listener),
                        Err(mut e) => errors.append(&mut e),
                    }
                }
                if protocols.http.is_none() && protocols.https.is_none() {
                    errors.push(ValidationError::NoListeners);
                }
            }
        }
    }

    let broker = config.msg_broker.as_ref();
    let mut broker_url = None;
    match broker {
        None => errors.push(ValidationError::MissingSection("msgBroker")),
        Some(broker) => match broker.url.as_deref() {
            None | Some("") => errors.push(ValidationError::MissingBrokerUrl),
            Some(raw) => match parse_broker_url(raw) {
                Ok(url) => broker_url = Some(url),
                Err(e) => errors.push(e),
            },
        },
    }

    match (rest, broker, broker_url) {
        (Some(rest), Some(broker), Some(broker_url)) if errors.is_empty() => Ok(Settings {
            rest: RestConfig {
                basic_auth: rest.basic_auth.clone().or_else(|| broker.http_login.clone()),
                ..rest.clone()
            },
            broker: broker.clone(),
            broker_url,
            listeners,
            observability: config.observability.clone(),
        }),
        _ => Err(errors),
    }
}

fn plain_listener(http: &HttpProtocolConfig) -> Result<ListenerConfig, ValidationError> {
    match http.port {
        None => Err(ValidationError::MissingPort("http")),
        Some(0) => Err(ValidationError::ZeroPort("http")),
        Some(port) => Ok(ListenerConfig::Plain { port }),
    }
}

fn tls_listener(https: &HttpsProtocolConfig) -> Result<ListenerConfig, Vec<ValidationError>> {
    let mut errors = Vec::new();

    let port = match https.port {
        None => {
            errors.push(ValidationError::MissingPort("https"));
            None
        }
        Some(0) => {
            errors.push(ValidationError::ZeroPort("https"));
            None
        }
        Some(port) => Some(port),
    };
    let private_key = non_empty(&https.private_key);
    if private_key.is_none() {
        errors.push(ValidationError::MissingPrivateKey);
    }
    let certificate = non_empty(&https.certificate);
    if certificate.is_none() {
        errors.push(ValidationError::MissingCertificate);
    }

    match (port, private_key, certificate) {
        (Some(port), Some(private_key), Some(certificate)) => Ok(ListenerConfig::Tls {
            port,
            private_key,
            certificate,
            ca_files: https.ca_files.iter().map(PathBuf::from).collect(),
        }),
        _ => Err(errors),
    }
}

fn non_empty(path: &Option<String>) -> Option<PathBuf> {
    path.as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
}

fn parse_broker_url(raw: &str) -> Result<url::Url, ValidationError> {
    let url = url::Url::parse(raw).map_err(|e| ValidationError::InvalidBrokerUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ValidationError::InvalidBrokerUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme {:?}, expected ws or wss", other),
        }),
    }
}
