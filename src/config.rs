//! Configuration management for the organicdump server
//!
//! Settings come from built-in defaults, an optional TOML file, and
//! `ORGANICDUMP__*` environment variables, in increasing precedence.
//! Command-line flags are applied on top by the binary.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use crate::transport::tcp::ConnectionLimits;

/// Config file looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "organicdump";

const ENV_PREFIX: &str = "ORGANICDUMP";

/// What the event loop does with a message from a classified session whose
/// kind has no bound handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnboundKindPolicy {
    /// Log and discard the message; the session stays open.
    #[default]
    Drop,
    /// Treat it as a protocol violation and evict the session.
    Evict,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to listen on
    pub bind_address: String,

    pub port: u16,

    /// SQLite database path; `:memory:` keeps everything in memory
    pub database_path: String,

    /// Live sessions beyond this are closed right after accept
    pub max_sessions: usize,

    /// Largest accepted frame payload in bytes
    pub max_frame_bytes: usize,

    pub write_timeout_secs: u64,

    /// Reply to a successful handshake with an `ok` response
    pub acknowledge_handshake: bool,

    pub unbound_kind_policy: UnboundKindPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 4850,
            database_path: "organicdump.db".to_string(),
            max_sessions: 256,
            max_frame_bytes: 1024 * 1024,
            write_timeout_secs: 10,
            acknowledge_handshake: false,
            unbound_kind_policy: UnboundKindPolicy::Drop,
        }
    }
}

impl ServerConfig {
    /// Loads configuration with environment overrides.
    ///
    /// An explicit `path` must exist; without one, `organicdump.toml` in the
    /// working directory is used if present.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config: ServerConfig = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses configuration from TOML text, without environment overrides.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: ServerConfig = Config::builder()
            .add_source(File::from_str(contents, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Message("port cannot be 0".into()));
        }

        if self.bind_address.trim().is_empty() {
            return Err(ConfigError::Message("bind_address cannot be empty".into()));
        }

        if self.database_path.trim().is_empty() {
            return Err(ConfigError::Message("database_path cannot be empty".into()));
        }

        if self.max_sessions == 0 {
            return Err(ConfigError::Message(
                "max_sessions must be greater than 0".into(),
            ));
        }

        if self.max_frame_bytes == 0 {
            return Err(ConfigError::Message(
                "max_frame_bytes must be greater than 0".into(),
            ));
        }

        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Message(
                "write_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Get bind address and port as a socket address string
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            max_frame_bytes: self.max_frame_bytes,
            write_timeout: self.write_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr(), "0.0.0.0:4850");
        assert_eq!(config.unbound_kind_policy, UnboundKindPolicy::Drop);
    }

    #[test]
    fn toml_overrides_only_the_fields_it_names() {
        let config = ServerConfig::from_toml(
            r#"
            port = 9000
            database_path = ":memory:"
            unbound_kind_policy = "evict"
            acknowledge_handshake = true
            "#,
        )
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.database_path, ":memory:");
        assert_eq!(config.unbound_kind_policy, UnboundKindPolicy::Evict);
        assert!(config.acknowledge_handshake);
        assert_eq!(config.max_sessions, 256);
        assert_eq!(config.bind_address, "0.0.0.0");
    }

    #[test]
    fn zero_port_is_rejected() {
        assert!(ServerConfig::from_toml("port = 0").is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        assert!(ServerConfig::from_toml("max_sessions = 0").is_err());
        assert!(ServerConfig::from_toml("max_frame_bytes = 0").is_err());
        assert!(ServerConfig::from_toml("write_timeout_secs = 0").is_err());
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(ServerConfig::from_toml(r#"unbound_kind_policy = "ignore""#).is_err());
    }
}
