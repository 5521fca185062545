//! Configuration for xclient
//!
//! Centralized configuration with sensible defaults. Both configs can be
//! read from JSON; absent keys keep their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, XError};

/// Default X Protocol port
pub const DEFAULT_PORT: u16 = 33060;

/// Connection configuration for one session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    // -------------------------------------------------------------------------
    // Endpoint
    // -------------------------------------------------------------------------
    /// Server host name or address
    pub host: String,

    /// Server X Protocol port
    pub port: u16,

    // -------------------------------------------------------------------------
    // Credentials
    // -------------------------------------------------------------------------
    /// Account name
    pub user: String,

    /// Account password (may be empty)
    #[serde(skip_serializing)]
    pub password: String,

    /// Default schema for the session
    pub schema: Option<String>,

    /// Authentication mechanism offered to the server
    pub auth_method: AuthMethod,

    /// TLS policy (negotiation is a placeholder, see `SslMode`)
    pub ssl_mode: SslMode,

    // -------------------------------------------------------------------------
    // Transport
    // -------------------------------------------------------------------------
    /// TCP connect timeout (milliseconds)
    pub connect_timeout_ms: u64,

    /// How long a pending fetch waits for bytes (milliseconds, 0 = forever)
    pub read_timeout_ms: u64,

    /// Largest frame accepted from the server (bytes)
    pub max_frame_size: usize,
}

/// Authentication mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// SHA-1 challenge/response (mysql_native_password accounts)
    Mysql41,

    /// SHA-256 challenge/response against the server's credential cache
    Sha256Memory,

    /// Clear-text password; only sensible over TLS
    Plain,
}

impl AuthMethod {
    /// Mechanism name as sent in `AuthenticateStart`
    pub fn mechanism_name(&self) -> &'static str {
        match self {
            AuthMethod::Mysql41 => "MYSQL41",
            AuthMethod::Sha256Memory => "SHA256_MEMORY",
            AuthMethod::Plain => "PLAIN",
        }
    }
}

/// TLS policy
///
/// The engine has no TLS implementation yet; `Required` fails the open and
/// `Preferred` falls back to plain text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SslMode {
    Disabled,
    Preferred,
    Required,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            user: "root".to_string(),
            password: String::new(),
            schema: None,
            auth_method: AuthMethod::Mysql41,
            ssl_mode: SslMode::Disabled,
            connect_timeout_ms: 10_000,
            read_timeout_ms: 30_000,
            max_frame_size: 16 * 1024 * 1024, // 16 MB
        }
    }
}

impl SessionConfig {
    /// Create a new config builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    /// Parse a JSON config document
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| XError::Config(format!("Invalid session config: {}", e)))
    }

    /// `host:port` string used for resolution and logging
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check the endpoint before any socket is opened
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(XError::Connection("Invalid endpoint: empty host".to_string()));
        }
        if self.port == 0 {
            return Err(XError::Connection(format!(
                "Invalid endpoint: port 0 on host '{}'",
                self.host
            )));
        }
        if self.max_frame_size < 16 {
            return Err(XError::Config(format!(
                "max_frame_size of {} bytes is too small",
                self.max_frame_size
            )));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` means wait forever
    pub fn read_timeout(&self) -> Option<Duration> {
        if self.read_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.read_timeout_ms))
        }
    }
}

/// Builder for SessionConfig
#[derive(Default)]
pub struct SessionConfigBuilder {
    config: SessionConfig,
}

impl SessionConfigBuilder {
    /// Set the server host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the account name
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.config.user = user.into();
        self
    }

    /// Set the account password
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.config.password = password.into();
        self
    }

    /// Set the default schema
    pub fn schema(mut self, schema: impl Into<String>) -> Self {
        self.config.schema = Some(schema.into());
        self
    }

    /// Set the authentication mechanism
    pub fn auth_method(mut self, method: AuthMethod) -> Self {
        self.config.auth_method = method;
        self
    }

    /// Set the TLS policy
    pub fn ssl_mode(mut self, mode: SslMode) -> Self {
        self.config.ssl_mode = mode;
        self
    }

    /// Set the connect timeout (in milliseconds)
    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    /// Set the read timeout (in milliseconds, 0 disables it)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the maximum accepted frame size (in bytes)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    pub fn build(self) -> SessionConfig {
        self.config
    }
}

/// Configuration for the reactor thread
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactorConfig {
    /// Bytes read from a source per read call; each chunk is one event
    pub read_chunk_size: usize,

    /// Readiness notifications collected by a single OS wait
    pub max_events_per_poll: usize,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 64 * 1024, // 64 KB
            max_events_per_poll: 1024,
        }
    }
}

impl ReactorConfig {
    /// Create a new config builder
    pub fn builder() -> ReactorConfigBuilder {
        ReactorConfigBuilder::default()
    }

    /// Parse a JSON config document
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| XError::Config(format!("Invalid reactor config: {}", e)))
    }
}

/// Builder for ReactorConfig
#[derive(Default)]
pub struct ReactorConfigBuilder {
    config: ReactorConfig,
}

impl ReactorConfigBuilder {
    /// Set the per-read chunk size (in bytes)
    pub fn read_chunk_size(mut self, size: usize) -> Self {
        self.config.read_chunk_size = size.max(1);
        self
    }

    /// Set the per-wait readiness capacity
    pub fn max_events_per_poll(mut self, count: usize) -> Self {
        self.config.max_events_per_poll = count.max(1);
        self
    }

    pub fn build(self) -> ReactorConfig {
        self.config
    }
}
