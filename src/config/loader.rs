//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::{BridgeConfig, Settings};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Syntax of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    /// `.json` files are JSON, everything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Toml,
        }
    }
}

/// Load and validate configuration from a JSON or TOML file.
pub fn load_config(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content, ConfigFormat::from_path(path))
}

/// Parse and validate an in-memory document.
pub fn parse_config(content: &str, format: ConfigFormat) -> Result<Settings, ConfigError> {
    let config: BridgeConfig = match format {
        ConfigFormat::Json => serde_json::from_str(content)?,
        ConfigFormat::Toml => toml::from_str(content)?,
    };

    validate_config(&config).map_err(ConfigError::Validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn format_from_extension() {
        assert_eq!(ConfigFormat::from_path(Path::new("bridge.json")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("bridge.JSON")), ConfigFormat::Json);
        assert_eq!(ConfigFormat::from_path(Path::new("bridge.toml")), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("bridge")), ConfigFormat::Toml);
    }

    #[test]
    fn toml_document() {
        let raw = r#"
            [rest]
            homeRoute = "/bridge"
            sendConfirmTimeoutMS = 1500

            [rest.protocols.http]
            port = 8080

            [msgBroker]
            url = "ws://localhost:61614/stomp"

            [msgBroker.loginOptions]
            login = "guest"
            passcode = "guest"

            [observability]
            log_level = "debug"
        "#;
        let settings = parse_config(raw, ConfigFormat::Toml).unwrap();
        assert_eq!(settings.rest.normalized_home_route(), "/bridge");
        assert_eq!(settings.rest.send_confirm_timeout_ms, 1500);
        assert_eq!(settings.listeners.len(), 1);
        assert_eq!(settings.observability.log_level, "debug");
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = parse_config("{}", ConfigFormat::Json).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: missing \"rest\" config, missing \"msgBroker\" config"
        );
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{ "rest": {{ "protocols": {{ "http": {{ "port": 9000 }} }} }}, "msgBroker": {{ "url": "wss://broker.example:443/ws" }} }}"#
        )
        .unwrap();
        let settings = load_config(file.path()).unwrap();
        assert_eq!(settings.listeners[0].port(), 9000);
        assert_eq!(settings.broker_url.scheme(), "wss");
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/bridge.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn malformed_json() {
        assert!(matches!(
            parse_config("{ not json", ConfigFormat::Json),
            Err(ConfigError::Json(_))
        ));
    }
}
