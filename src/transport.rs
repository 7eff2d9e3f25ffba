//! Transport abstraction
//!
//! A session only needs a duplex byte stream. How that stream is obtained
//! (an SSH channel, a TLS socket, a raw TCP socket) is up to a
//! [`Connector`], which returns a [`Connection`] that can open one or more
//! channels.

use std::fmt;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use crate::config::DeviceConfig;
use crate::error::{NetconfError, Result};

/// A duplex byte stream carrying one NETCONF session
pub trait ByteStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> ByteStream for T {}

/// Login credentials for a device
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// The password, for transports that authenticate
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Opens transport connections to a device
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &DeviceConfig, credentials: &Credentials) -> Result<Box<dyn Connection>>;
}

/// An open transport connection
#[async_trait]
pub trait Connection: Send {
    /// Open a channel for one session
    async fn open_channel(&mut self) -> Result<Box<dyn ByteStream>>;

    /// True when the connection can carry several channels at once
    fn multiplexes(&self) -> bool;

    async fn close(&mut self) -> Result<()>;
}

/// Plain TCP, for devices or test rigs speaking NETCONF on a raw socket.
/// Credentials are not used.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, config: &DeviceConfig, credentials: &Credentials) -> Result<Box<dyn Connection>> {
        let endpoint = config.endpoint();
        let stream = TcpStream::connect(endpoint.as_str())
            .await
            .map_err(|e| NetconfError::Transport(format!("connect to {endpoint}: {e}")))?;
        stream.set_nodelay(true)?;
        tracing::debug!(%endpoint, user = %credentials.username, "tcp connection open");
        Ok(Box::new(TcpConnection {
            stream: Some(stream),
        }))
    }
}

/// A raw socket: exactly one channel
#[derive(Debug)]
pub struct TcpConnection {
    stream: Option<TcpStream>,
}

#[async_trait]
impl Connection for TcpConnection {
    async fn open_channel(&mut self) -> Result<Box<dyn ByteStream>> {
        let stream = self.stream.take().ok_or_else(|| {
            NetconfError::Transport("raw TCP connection carries a single channel".into())
        })?;
        Ok(Box::new(stream))
    }

    fn multiplexes(&self) -> bool {
        false
    }

    async fn close(&mut self) -> Result<()> {
        // an opened channel is owned and shut down by its session
        self.stream = None;
        Ok(())
    }
}
