//! Client configuration.
//!
//! Values come from, in increasing precedence: built-in defaults, an optional
//! configuration file (any format the `config` crate recognizes by
//! extension), `SOCKETPUSH_*` environment variables and explicit
//! [`ConfigOverrides`].

use crate::error::{ClientError, Result};
use config::{Config, Environment, File};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use socketpush_protocol::{DEFAULT_SOCKET_PATH, ENGINE_IO_VERSION};
use std::path::Path;
use std::time::Duration;

/// Default acknowledgment timeout in milliseconds.
pub const DEFAULT_ACK_TIMEOUT_MS: u64 = 5_000;

/// Default transport open timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// Values that take precedence over file and environment, typically from
/// command-line flags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    /// Server base URL.
    pub endpoint: Option<String>,
    /// App scope.
    pub app_uuid: Option<String>,
    /// Acknowledgment timeout in milliseconds.
    pub ack_timeout_ms: Option<u64>,
    /// Notification API.
    pub push_api: Option<String>,
}

/// Connection settings fixed for the lifetime of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Server base URL (`http`, `https`, `ws` or `wss`).
    pub endpoint: String,
    /// App scope sent with every request.
    pub app_uuid: String,
    /// Socket.IO mount path.
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
    /// Acknowledgment timeout for commands.
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    /// Bound on the transport open phase of `connect`.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Notification API used by the push sender.
    #[serde(default)]
    pub push_api: Option<String>,
}

fn default_socket_path() -> String {
    DEFAULT_SOCKET_PATH.to_string()
}

fn default_ack_timeout_ms() -> u64 {
    DEFAULT_ACK_TIMEOUT_MS
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ClientConfig {
    /// Configuration with default timeouts.
    pub fn new(endpoint: impl Into<String>, app_uuid: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            app_uuid: app_uuid.into(),
            socket_path: default_socket_path(),
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            push_api: None,
        }
    }

    /// Load from an optional file and the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_overriding(path, &ConfigOverrides::default())
    }

    /// Like [`load`](Self::load), then apply `overrides`.
    pub fn load_overriding(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix("SOCKETPUSH"), overrides)
    }

    /// Load from an optional file and the given environment source, then
    /// apply `overrides`.
    pub fn load_with(
        path: Option<&Path>,
        env: Environment,
        overrides: &ConfigOverrides,
    ) -> Result<Self> {
        let mut builder = Config::builder()
            .set_default("socket_path", DEFAULT_SOCKET_PATH)?
            .set_default("ack_timeout_ms", DEFAULT_ACK_TIMEOUT_MS)?
            .set_default("connect_timeout_ms", DEFAULT_CONNECT_TIMEOUT_MS)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }

        let config: Self = builder
            .add_source(env.try_parsing(true))
            .set_override_option("endpoint", overrides.endpoint.clone())?
            .set_override_option("app_uuid", overrides.app_uuid.clone())?
            .set_override_option("ack_timeout_ms", overrides.ack_timeout_ms)?
            .set_override_option("push_api", overrides.push_api.clone())?
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Override the acknowledgment timeout.
    #[must_use]
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout_ms = duration_millis(timeout);
        self
    }

    /// Override the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_millis(timeout);
        self
    }

    /// Override the Socket.IO mount path.
    #[must_use]
    pub fn with_socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = path.into();
        self
    }

    /// Set the notification API.
    #[must_use]
    pub fn with_push_api(mut self, url: impl Into<String>) -> Self {
        self.push_api = Some(url.into());
        self
    }

    /// Acknowledgment timeout.
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    /// Connect timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check that the configuration can be used.
    pub fn validate(&self) -> Result<()> {
        if self.app_uuid.trim().is_empty() {
            return Err(ClientError::InvalidInput("app_uuid must not be empty".into()));
        }
        if self.ack_timeout_ms == 0 {
            return Err(ClientError::InvalidInput("ack_timeout_ms must be positive".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ClientError::InvalidInput(
                "connect_timeout_ms must be positive".into(),
            ));
        }
        if !self.socket_path.starts_with('/') {
            return Err(ClientError::InvalidInput(format!(
                "socket_path must start with '/': {}",
                self.socket_path
            )));
        }
        if let Some(api) = &self.push_api {
            Url::parse(api)
                .map_err(|e| ClientError::InvalidInput(format!("push_api: {e}")))?;
        }
        self.socket_url().map(|_| ())
    }

    /// WebSocket URL of the Socket.IO endpoint.
    ///
    /// ```
    /// use socketpush_client::ClientConfig;
    ///
    /// let config = ClientConfig::new("https://push.example.com", "app1");
    /// assert_eq!(
    ///     config.socket_url().unwrap(),
    ///     "wss://push.example.com/socket.io/?EIO=4&transport=websocket"
    /// );
    /// ```
    pub fn socket_url(&self) -> Result<String> {
        if self.endpoint.trim().is_empty() {
            return Err(ClientError::InvalidInput("endpoint must not be empty".into()));
        }
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ClientError::InvalidInput(format!("endpoint: {e}")))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::InvalidInput(format!(
                    "unsupported endpoint scheme: {other}"
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| ClientError::InvalidInput(format!("cannot use scheme {scheme}")))?;
        url.set_path(&self.socket_path);
        url.set_query(Some(&format!(
            "EIO={ENGINE_IO_VERSION}&transport=websocket"
        )));
        url.set_fragment(None);
        Ok(url.to_string())
    }
}
