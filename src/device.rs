//! Managed device: credentials, transport connections and named sessions

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::config::{ChannelPolicy, DeviceConfig};
use crate::error::{NetconfError, Result};
use crate::rpc::Reply;
use crate::schema::SchemaRegistry;
use crate::session::Session;
use crate::transport::{ByteStream, Connection, Connector, Credentials};

/// A NETCONF device and the sessions open to it.
///
/// With [`ChannelPolicy::Shared`] all sessions are channels of one
/// connection; with [`ChannelPolicy::PerSession`] each session gets its own
/// connection.
pub struct Device {
    config: DeviceConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<SchemaRegistry>,
    users: Vec<Credentials>,
    /// The shared connection, or a not yet used per-session one
    connection: Option<Box<dyn Connection>>,
    session_connections: BTreeMap<String, Box<dyn Connection>>,
    sessions: BTreeMap<String, Arc<Session>>,
    connected: bool,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("endpoint", &self.config.endpoint())
            .field("users", &self.users)
            .field("sessions", &self.sessions.keys().collect::<Vec<_>>())
            .field("connected", &self.connected)
            .finish()
    }
}

impl Device {
    pub fn new(config: DeviceConfig, connector: Arc<dyn Connector>, registry: Arc<SchemaRegistry>) -> Self {
        Self {
            config,
            connector,
            registry,
            users: Vec::new(),
            connection: None,
            session_connections: BTreeMap::new(),
            sessions: BTreeMap::new(),
            connected: false,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Add login credentials; a user with the same name is replaced. The
    /// first user added is the one sessions log in with.
    pub fn add_user(&mut self, credentials: Credentials) {
        match self
            .users
            .iter_mut()
            .find(|u| u.username == credentials.username)
        {
            Some(existing) => *existing = credentials,
            None => self.users.push(credentials),
        }
    }

    fn credentials(&self) -> Result<&Credentials> {
        self.users
            .first()
            .ok_or_else(|| NetconfError::Config(format!("no credentials for {}", self.config.endpoint())))
    }

    /// Open the transport connection
    pub async fn connect(&mut self) -> Result<()> {
        if self.connected {
            return Ok(());
        }
        self.config.validate()?;
        let connection = self.connector.connect(&self.config, self.credentials()?).await?;
        if self.config.channel_policy == ChannelPolicy::Shared && !connection.multiplexes() {
            warn!(
                endpoint = %self.config.endpoint(),
                "shared channel policy on a transport without multiplexing; only one session will open"
            );
        }
        self.connection = Some(connection);
        self.connected = true;
        debug!(endpoint = %self.config.endpoint(), policy = ?self.config.channel_policy, "device connected");
        Ok(())
    }

    async fn open_channel(&mut self, name: &str) -> Result<Box<dyn ByteStream>> {
        match self.config.channel_policy {
            ChannelPolicy::Shared => {
                let connection = self
                    .connection
                    .as_mut()
                    .ok_or_else(|| NetconfError::InvalidState("device is not connected".into()))?;
                connection.open_channel().await
            }
            ChannelPolicy::PerSession => {
                let mut connection = match self.connection.take() {
                    Some(spare) => spare,
                    None => self.connector.connect(&self.config, self.credentials()?).await?,
                };
                let channel = connection.open_channel().await?;
                self.session_connections.insert(name.to_string(), connection);
                Ok(channel)
            }
        }
    }

    /// Open and establish a new named session
    pub async fn new_session(&mut self, name: &str) -> Result<Arc<Session>> {
        if !self.connected {
            return Err(NetconfError::InvalidState("device is not connected".into()));
        }
        if self.sessions.contains_key(name) {
            return Err(NetconfError::InvalidState(format!("session '{name}' already exists")));
        }

        let channel = self.open_channel(name).await?;
        let session = match Session::establish(name, channel, &self.config.session, Arc::clone(&self.registry)).await {
            Ok(session) => Arc::new(session),
            Err(e) => {
                self.release_connection(name).await;
                return Err(e);
            }
        };
        self.sessions.insert(name.to_string(), Arc::clone(&session));
        Ok(session)
    }

    /// Look up a session by name
    pub fn session(&self, name: &str) -> Option<Arc<Session>> {
        self.sessions.get(name).cloned()
    }

    pub fn session_names(&self) -> impl Iterator<Item = &str> {
        self.sessions.keys().map(String::as_str)
    }

    async fn release_connection(&mut self, name: &str) {
        if let Some(mut connection) = self.session_connections.remove(name)
            && let Err(e) = connection.close().await
        {
            debug!(session = name, error = %e, "closing session connection failed");
        }
    }

    /// Close one session and, under the per-session policy, its connection
    pub async fn close_session(&mut self, name: &str) -> Result<Reply> {
        let session = self
            .sessions
            .remove(name)
            .ok_or_else(|| NetconfError::UnknownSession(name.to_string()))?;
        let result = session.close().await;
        self.release_connection(name).await;
        result
    }

    /// Close every session, then the transport
    pub async fn close(&mut self) -> Result<()> {
        let names: Vec<String> = self.sessions.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.close_session(&name).await {
                debug!(session = %name, error = %e, "session did not close cleanly");
            }
        }
        if let Some(mut connection) = self.connection.take() {
            connection.close().await?;
        }
        self.connected = false;
        debug!(endpoint = %self.config.endpoint(), "device closed");
        Ok(())
    }
}
