//! # Configuration Surface
//!
//! TOML-backed settings for the dispatcher: broker endpoint, login
//! credentials, organization id, and the reconnect delay. The core never
//! reads files on its own; the host loads this once at startup.

use crate::ports::broker::{Credentials, SessionConfig};
use crate::service::dispatcher::DispatchConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;

/// Errors from configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {error}")]
    Io { path: String, error: String },

    /// The TOML content could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(String),
}

/// Complete dispatcher configuration.
///
/// ```toml
/// [broker]
/// host = "broker.example.com"
/// port = 65001
/// cafile = "/etc/relay/ca.pem"
///
/// [auth]
/// email = "user@example.com"
/// password = "secret"
///
/// [org]
/// id = "201"
///
/// [dispatch]
/// reconnect_delay_secs = 5
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Broker endpoint.
    pub broker: BrokerSettings,
    /// Login credentials.
    pub auth: AuthSettings,
    /// Organization scoping.
    pub org: OrgSettings,
    /// Dispatcher tuning.
    #[serde(default)]
    pub dispatch: DispatchSettings,
}

/// `[broker]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerSettings {
    /// Broker hostname (also used for certificate validation).
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// Optional CA bundle path.
    #[serde(default)]
    pub cafile: Option<PathBuf>,
}

/// `[auth]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthSettings {
    /// Account email, used as the broker login.
    pub email: String,
    /// Account password.
    pub password: String,
}

/// `[org]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct OrgSettings {
    /// Organization id scoping broker destinations.
    pub id: String,
}

/// `[dispatch]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    /// Fixed delay between reconnect attempts, in seconds.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_reconnect_delay_secs() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS,
        }
    }
}

impl RelayConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on invalid TOML or missing fields.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Session parameters for the broker connection.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.broker.host.clone(), self.broker.port);
        if let Some(cafile) = &self.broker.cafile {
            config = config.with_ca_file(cafile.clone());
        }
        config
    }

    /// Broker login credentials.
    #[must_use]
    pub fn credentials(&self) -> Credentials {
        Credentials {
            login: self.auth.email.clone(),
            passcode: self.auth.password.clone(),
        }
    }

    /// Dispatcher tuning derived from the `[org]`/`[dispatch]` sections.
    #[must_use]
    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig::new(self.org.id.clone())
            .with_reconnect_delay(Duration::from_secs(self.dispatch.reconnect_delay_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [broker]
        host = "broker.example.com"
        port = 65001
        cafile = "/etc/relay/ca.pem"

        [auth]
        email = "user@example.com"
        password = "secret"

        [org]
        id = "201"

        [dispatch]
        reconnect_delay_secs = 7
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = RelayConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.broker.host, "broker.example.com");
        assert_eq!(config.broker.port, 65001);
        assert_eq!(
            config.broker.cafile.as_deref(),
            Some(Path::new("/etc/relay/ca.pem"))
        );
        assert_eq!(config.org.id, "201");
        assert_eq!(config.dispatch.reconnect_delay_secs, 7);

        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.org_id, "201");
        assert_eq!(dispatch.reconnect_delay, Duration::from_secs(7));
    }

    #[test]
    fn test_dispatch_section_defaults() {
        let minimal = r#"
            [broker]
            host = "h"
            port = 1

            [auth]
            email = "e"
            password = "p"

            [org]
            id = "1"
        "#;
        let config = RelayConfig::parse(minimal).unwrap();
        assert_eq!(config.dispatch.reconnect_delay_secs, 5);
        assert!(config.broker.cafile.is_none());
    }

    #[test]
    fn test_parse_failure_is_reported() {
        let err = RelayConfig::parse("not toml at all [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_credentials_and_session_config() {
        let config = RelayConfig::parse(SAMPLE).unwrap();
        let credentials = config.credentials();
        assert_eq!(credentials.login, "user@example.com");

        let session = config.session_config();
        assert_eq!(session.host, "broker.example.com");
        assert_eq!(session.port, 65001);
        assert!(session.ca_file.is_some());
    }
}
