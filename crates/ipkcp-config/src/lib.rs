#![deny(unsafe_code)]

//! Configuration loading and validation for the IPK Calculator Protocol.
//!
//! Loads TOML configuration files and validates them. [`AppConfig`] is the
//! central configuration structure shared by the server runtime, the client
//! drivers, and the CLI.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The shortest line a TCP client can send that carries a legal query.
const SHORTEST_QUERY: &str = "SOLVE (+ 1 1)\n";

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

/// Top-level application configuration.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Listening endpoint and transport.
    #[serde(default)]
    pub server: ServerConfig,

    /// Resource bounds for sessions and frames.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Client driver settings.
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Which transport a server listens on (or a client talks over).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Line-oriented text protocol with a per-connection session.
    #[default]
    Tcp,
    /// Binary envelopes, one stateless transaction per datagram.
    Udp,
}

impl FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("tcp") {
            Ok(Self::Tcp)
        } else if s.eq_ignore_ascii_case("udp") {
            Ok(Self::Udp)
        } else {
            Err(ConfigError::Validation(format!(
                "transport mode must be \"tcp\" or \"udp\", got {s:?}"
            )))
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("tcp"),
            Self::Udp => f.write_str("udp"),
        }
    }
}

/// Listening endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address (or host name) the server binds to.
    #[serde(default = "default_address")]
    pub address: String,

    /// Port the server binds to.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport to serve.
    #[serde(default)]
    pub mode: TransportMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            mode: TransportMode::default(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    2023
}

/// Resource bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of concurrently served TCP sessions.
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Maximum length of a single TCP line, terminator included.
    #[serde(default = "default_max_line_len")]
    pub max_line_len: usize,

    /// Size of the UDP receive buffer.
    #[serde(default = "default_max_datagram_len")]
    pub max_datagram_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            max_line_len: default_max_line_len(),
            max_datagram_len: default_max_datagram_len(),
        }
    }
}

fn default_max_sessions() -> usize {
    128
}

fn default_max_line_len() -> usize {
    2048
}

fn default_max_datagram_len() -> usize {
    2048
}

/// Client driver configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// How long the UDP client waits for a response (0 = forever).
    #[serde(default)]
    pub response_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g. "info", "debug", "trace").
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from a TOML file at the given path using async I/O.
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation(
                "server.port must be non-zero".to_string(),
            ));
        }
        if self.server.address.is_empty() {
            return Err(ConfigError::Validation(
                "server.address must not be empty".to_string(),
            ));
        }
        if self.limits.max_sessions == 0 {
            return Err(ConfigError::Validation(
                "limits.max_sessions must be at least 1".to_string(),
            ));
        }
        if self.limits.max_line_len < SHORTEST_QUERY.len() {
            return Err(ConfigError::Validation(format!(
                "limits.max_line_len must be at least {}, got {}",
                SHORTEST_QUERY.len(),
                self.limits.max_line_len
            )));
        }
        if self.limits.max_datagram_len < 2 {
            return Err(ConfigError::Validation(format!(
                "limits.max_datagram_len must be at least 2, got {}",
                self.limits.max_datagram_len
            )));
        }
        Ok(())
    }

    /// The `host:port` string the server binds to.
    pub fn bind_target(&self) -> String {
        format!("{}:{}", self.server.address, self.server.port)
    }
}
