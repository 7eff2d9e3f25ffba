//! Session and device configuration
//!
//! Configuration is plain data loaded from JSON. Credentials are never part
//! of it; they are handed to [`Device::add_user`](crate::device::Device::add_user).

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{NetconfError, Result};
use crate::framing::DEFAULT_MAX_FRAME_SIZE;
use crate::hello::{BASE_1_0, BASE_1_1};

/// NETCONF over SSH port
pub const DEFAULT_PORT: u16 = 830;

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_hello_timeout_ms() -> u64 {
    10_000
}

fn default_capabilities() -> Vec<String> {
    vec![BASE_1_0.to_string(), BASE_1_1.to_string()]
}

fn default_max_frame_size() -> usize {
    DEFAULT_MAX_FRAME_SIZE
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Per-session settings
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct SessionConfig {
    /// How long a request waits for its reply
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long the hello exchange may take
    #[serde(default = "default_hello_timeout_ms")]
    pub hello_timeout_ms: u64,

    /// Capabilities the client advertises. Module capabilities from the
    /// schema registry are appended at session start.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Largest inbound message accepted
    #[serde(default = "default_max_frame_size")]
    pub max_frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            hello_timeout_ms: default_hello_timeout_ms(),
            capabilities: default_capabilities(),
            max_frame_size: default_max_frame_size(),
        }
    }
}

impl SessionConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 || self.hello_timeout_ms == 0 {
            return Err(NetconfError::Config("timeouts must be non-zero".into()));
        }
        if !self
            .capabilities
            .iter()
            .any(|c| c == BASE_1_0 || c == BASE_1_1)
        {
            return Err(NetconfError::Config(
                "capabilities must include a base protocol version".into(),
            ));
        }
        if self.max_frame_size == 0 {
            return Err(NetconfError::Config("max-frame-size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Whether sessions share one transport connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChannelPolicy {
    /// One connection, one channel per session (multiplexing transports)
    Shared,
    /// A separate connection per session
    #[default]
    PerSession,
}

/// Managed device endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DeviceConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub channel_policy: ChannelPolicy,

    #[serde(default)]
    pub session: SessionConfig,
}

impl DeviceConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            channel_policy: ChannelPolicy::default(),
            session: SessionConfig::default(),
        }
    }

    /// Load a device configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Parse a device configuration from a JSON string
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: DeviceConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// `host:port`
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(NetconfError::Config("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(NetconfError::Config("port must be non-zero".into()));
        }
        self.session.validate()
    }
}

impl FromStr for DeviceConfig {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::from_json_str(r#"{"host": "192.0.2.1"}"#).unwrap();
        assert_eq!(config.port, 830);
        assert_eq!(config.channel_policy, ChannelPolicy::PerSession);
        assert_eq!(config.session, SessionConfig::default());
        assert_eq!(config.endpoint(), "192.0.2.1:830");
        assert_eq!(config.session.request_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_full_config() {
        let config: DeviceConfig = r#"{
            "host": "router1",
            "port": 2830,
            "channel-policy": "shared",
            "session": {
                "request-timeout-ms": 500,
                "capabilities": ["urn:ietf:params:netconf:base:1.0"],
                "max-frame-size": 4096
            }
        }"#
        .parse()
        .unwrap();
        assert_eq!(config.port, 2830);
        assert_eq!(config.channel_policy, ChannelPolicy::Shared);
        assert_eq!(config.session.request_timeout_ms, 500);
        assert_eq!(config.session.hello_timeout_ms, 10_000);
        assert_eq!(config.session.capabilities, vec![BASE_1_0.to_string()]);
        assert_eq!(config.session.max_frame_size, 4096);
    }

    #[test]
    fn test_rejects_invalid() {
        assert!(DeviceConfig::from_json_str(r#"{"host": ""}"#).is_err());
        assert!(DeviceConfig::from_json_str(r#"{"host": "h", "port": 0}"#).is_err());
        assert!(DeviceConfig::from_json_str(r#"{"host": "h", "password": "admin"}"#).is_err());
        assert!(DeviceConfig::from_json_str(
            r#"{"host": "h", "session": {"capabilities": ["urn:x"]}}"#
        )
        .is_err());
        assert!(matches!(
            DeviceConfig::from_json_str(r#"{"host": "h", "session": {"request-timeout-ms": 0}}"#),
            Err(NetconfError::Config(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"host": "10.0.0.1", "port": 8300}}"#).unwrap();
        let config = DeviceConfig::from_file(file.path()).unwrap();
        assert_eq!(config.endpoint(), "10.0.0.1:8300");

        assert!(matches!(
            DeviceConfig::from_file("/nonexistent/device.json"),
            Err(NetconfError::Io(_))
        ));
    }
}
