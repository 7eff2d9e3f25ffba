//! NETCONF session
//!
//! A [`Session`] runs the hello exchange over a byte stream, then correlates
//! requests and replies by message id. Each request registers a oneshot
//! slot keyed by its id; a dispatch task reads framed replies and completes
//! the matching slot. Callers only ever wait on their own slot, so many
//! requests can be in flight at once and replies may arrive in any order.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{ReadHalf, WriteHalf};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

use crate::config::SessionConfig;
use crate::element::Element;
use crate::error::{NetconfError, Result};
use crate::framing::NetconfCodec;
use crate::hello::{self, Hello, Negotiated};
use crate::path::QName;
use crate::rpc::{
    Datastore, EditConfig, Filter, Operation, Reply, encode_request, read_envelope, reply_from_envelope,
};
use crate::schema::SchemaRegistry;
use crate::transport::ByteStream;

type Reader = FramedRead<ReadHalf<Box<dyn ByteStream>>, NetconfCodec>;
type Writer = FramedWrite<WriteHalf<Box<dyn ByteStream>>, NetconfCodec>;
type Slot = oneshot::Sender<Result<Reply>>;

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconnected,
    HelloSent,
    Established,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Unconnected => "unconnected",
            SessionState::HelloSent => "hello-sent",
            SessionState::Established => "established",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared with the dispatch task
struct Shared {
    name: String,
    state: Mutex<SessionState>,
    pending: Mutex<HashMap<u64, Slot>>,
    /// Why the transport went away, if it failed under us
    failure: Mutex<Option<String>>,
}

impl Shared {
    fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    fn set_state(&self, next: SessionState) {
        let mut state = lock(&self.state);
        let from = *state;
        if from != next {
            debug!(session = %self.name, %from, to = %next, "session state change");
            *state = next;
        }
    }

    fn register(&self, message_id: u64, slot: Slot) {
        lock(&self.pending).insert(message_id, slot);
    }

    fn take(&self, message_id: u64) -> Option<Slot> {
        lock(&self.pending).remove(&message_id)
    }

    fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Fail every pending request, each with its own error value
    fn fail_all(&self, make_error: impl Fn() -> NetconfError) {
        let slots: Vec<(u64, Slot)> = lock(&self.pending).drain().collect();
        for (message_id, slot) in slots {
            debug!(session = %self.name, message_id, "failing pending request");
            let _ = slot.send(Err(make_error()));
        }
    }

    /// Error for a request that found the session already closed
    fn closed_error(&self) -> NetconfError {
        match lock(&self.failure).as_ref() {
            Some(reason) => NetconfError::Transport(reason.clone()),
            None => NetconfError::SessionClosed,
        }
    }

    /// Route one inbound frame to its pending slot.
    ///
    /// A reply whose body fails to decode still goes to its caller as
    /// [`NetconfError::MalformedReply`]; only frames without a usable
    /// message-id are dropped here.
    fn deliver(&self, frame: &[u8]) {
        let (raw_id, root) = match read_envelope(frame) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(session = %self.name, error = %e, "discarding undecodable frame");
                return;
            }
        };
        let Ok(message_id) = raw_id.parse::<u64>() else {
            warn!(session = %self.name, message_id = %raw_id, "reply with foreign message-id dropped");
            return;
        };
        let Some(slot) = self.take(message_id) else {
            warn!(session = %self.name, message_id, "reply matches no pending request; dropped");
            return;
        };

        let result = reply_from_envelope(raw_id, root);
        if let Err(e) = &result {
            warn!(session = %self.name, message_id, error = %e, "malformed reply");
        }
        // the caller may have given up in the meantime
        let _ = slot.send(result);
    }

    /// Transport failure or end of stream
    fn terminate(&self, reason: &str) {
        let was_closing = matches!(self.state(), SessionState::Closing | SessionState::Closed);
        if !was_closing {
            *lock(&self.failure) = Some(reason.to_string());
        }
        self.set_state(SessionState::Closed);
        if was_closing {
            self.fail_all(|| NetconfError::SessionClosed);
        } else {
            warn!(session = %self.name, reason, "session transport failed");
            let reason = reason.to_string();
            self.fail_all(|| NetconfError::Transport(reason.clone()));
        }
    }
}

/// Owns a registered slot for the lifetime of one exchange, so a caller
/// that is cancelled mid-wait does not leave its entry behind
struct PendingGuard<'a> {
    shared: &'a Shared,
    message_id: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.shared.take(self.message_id).is_some() {
            debug!(session = %self.shared.name, message_id = self.message_id, "pending request abandoned");
        }
    }
}

async fn dispatch(mut reader: Reader, shared: Arc<Shared>) {
    let reason = loop {
        match reader.next().await {
            Some(Ok(frame)) => shared.deliver(&frame),
            Some(Err(e)) => break e.to_string(),
            None => break "connection closed by device".to_string(),
        }
    };
    shared.terminate(&reason);
}

/// An established NETCONF session
pub struct Session {
    shared: Arc<Shared>,
    negotiated: Negotiated,
    next_id: AtomicU64,
    writer: tokio::sync::Mutex<Writer>,
    reader_task: JoinHandle<()>,
    registry: Arc<SchemaRegistry>,
    request_timeout: Duration,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("name", &self.shared.name)
            .field("state", &self.shared.state())
            .field("session_id", &self.negotiated.session_id)
            .finish()
    }
}

impl Session {
    /// Run the hello exchange on `stream` and start the dispatch task.
    ///
    /// The client hello advertises the configured capabilities plus every
    /// module registered in `registry`.
    pub async fn establish(
        name: impl Into<String>,
        stream: Box<dyn ByteStream>,
        config: &SessionConfig,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        config.validate()?;
        let shared = Arc::new(Shared {
            name: name.into(),
            state: Mutex::new(SessionState::Unconnected),
            pending: Mutex::new(HashMap::new()),
            failure: Mutex::new(None),
        });

        let (read_half, write_half) = tokio::io::split(stream);
        let mut reader = FramedRead::new(read_half, NetconfCodec::new(config.max_frame_size));
        let mut writer = FramedWrite::new(write_half, NetconfCodec::new(config.max_frame_size));

        match handshake(&shared, &mut reader, &mut writer, config, &registry).await {
            Ok(negotiated) => {
                reader.decoder_mut().set_framing(negotiated.framing);
                writer.encoder_mut().set_framing(negotiated.framing);
                shared.set_state(SessionState::Established);
                debug!(
                    session = %shared.name,
                    session_id = negotiated.session_id,
                    framing = ?negotiated.framing,
                    capabilities = negotiated.capabilities.len(),
                    "session established"
                );

                let reader_task = tokio::spawn(dispatch(reader, Arc::clone(&shared)));
                Ok(Self {
                    shared,
                    negotiated,
                    next_id: AtomicU64::new(1),
                    writer: tokio::sync::Mutex::new(writer),
                    reader_task,
                    registry,
                    request_timeout: config.request_timeout(),
                })
            }
            Err(e) => {
                shared.set_state(SessionState::Closed);
                let _ = writer.close().await;
                Err(e)
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Session id assigned by the device
    pub fn session_id(&self) -> u32 {
        self.negotiated.session_id
    }

    /// Capabilities shared by client and device
    pub fn capabilities(&self) -> &[String] {
        &self.negotiated.capabilities
    }

    pub fn negotiated(&self) -> &Negotiated {
        &self.negotiated
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Number of requests waiting for a reply
    pub fn pending_requests(&self) -> usize {
        self.shared.pending_count()
    }

    /// Send `operation` and wait for its reply
    pub async fn request(&self, operation: &Operation) -> Result<Reply> {
        match self.state() {
            SessionState::Established => {}
            SessionState::Closing | SessionState::Closed => return Err(NetconfError::SessionClosed),
            state => {
                return Err(NetconfError::InvalidState(format!(
                    "session '{}' is {state}",
                    self.name()
                )));
            }
        }
        self.exchange(operation).await
    }

    async fn exchange(&self, operation: &Operation) -> Result<Reply> {
        let (tx, rx) = oneshot::channel();

        // ids are taken under the writer lock so the wire order matches
        let guard = {
            let mut writer = self.writer.lock().await;
            let message_id = self.next_id.fetch_add(1, Ordering::SeqCst);
            let bytes = encode_request(&message_id.to_string(), operation)?;
            self.shared.register(message_id, tx);
            let guard = PendingGuard {
                shared: &self.shared,
                message_id,
            };

            // the dispatch task may have failed the session since `request`
            // looked, and its `fail_all` would not have seen this slot
            if self.state() == SessionState::Closed {
                return Err(self.shared.closed_error());
            }
            debug!(session = %self.name(), message_id, operation = operation.name(), "request sent");

            if let Err(e) = writer.send(bytes).await {
                let reason = e.to_string();
                self.shared.terminate(&reason);
                self.reader_task.abort();
                return Err(NetconfError::Transport(reason));
            }
            guard
        };
        let message_id = guard.message_id;

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => {
                debug!(session = %self.name(), message_id, "request complete");
                result
            }
            // slot dropped without an answer
            Ok(Err(_)) => Err(self.shared.closed_error()),
            Err(_) => {
                drop(guard);
                warn!(session = %self.name(), message_id, "request timed out");
                Err(NetconfError::Timeout { message_id })
            }
        }
    }

    fn require(&self, capability: &str, what: &str) -> Result<()> {
        if self.negotiated.device_supports(capability) {
            Ok(())
        } else {
            Err(NetconfError::InvalidState(format!(
                "device does not support {what} ({capability})"
            )))
        }
    }

    fn require_datastore(&self, datastore: Datastore) -> Result<()> {
        match datastore {
            Datastore::Running => Ok(()),
            Datastore::Candidate => self.require(hello::CANDIDATE, "the candidate datastore"),
            Datastore::Startup => self.require(hello::STARTUP, "the startup datastore"),
        }
    }

    fn require_filter(&self, filter: Option<&Filter>) -> Result<()> {
        match filter {
            Some(Filter::XPath { .. }) => self.require(hello::XPATH, "XPath filters"),
            _ => Ok(()),
        }
    }

    /// `<get>`; the returned data is typed against the session's registry
    pub async fn get(&self, filter: Option<Filter>) -> Result<Reply> {
        self.require_filter(filter.as_ref())?;
        let mut reply = self.request(&Operation::Get { filter }).await?;
        reply.bind(&self.registry)?;
        Ok(reply)
    }

    /// `<get-config>`; the returned data is typed against the registry
    pub async fn get_config(&self, source: Datastore, filter: Option<Filter>) -> Result<Reply> {
        self.require_datastore(source)?;
        self.require_filter(filter.as_ref())?;
        let mut reply = self.request(&Operation::GetConfig { source, filter }).await?;
        reply.bind(&self.registry)?;
        Ok(reply)
    }

    /// `<edit-config>` of `config` into `target` with default options
    pub async fn edit_config(&self, target: Datastore, config: Vec<Element>) -> Result<Reply> {
        self.edit(EditConfig::new(target, config)).await
    }

    /// `<edit-config>` with explicit options. Payload nodes are checked for
    /// list keys and cardinality before anything is sent.
    pub async fn edit(&self, edit: EditConfig) -> Result<Reply> {
        self.require_datastore(edit.target)?;
        for node in &edit.config {
            node.validate(&self.registry)?;
        }
        self.request(&Operation::EditConfig(edit)).await
    }

    pub async fn copy_config(&self, target: Datastore, source: Datastore) -> Result<Reply> {
        self.require_datastore(target)?;
        self.require_datastore(source)?;
        self.request(&Operation::CopyConfig { target, source }).await
    }

    pub async fn delete_config(&self, target: Datastore) -> Result<Reply> {
        if target == Datastore::Running {
            return Err(NetconfError::InvalidState("the running datastore cannot be deleted".into()));
        }
        self.require_datastore(target)?;
        self.request(&Operation::DeleteConfig { target }).await
    }

    pub async fn lock(&self, target: Datastore) -> Result<Reply> {
        self.require_datastore(target)?;
        self.request(&Operation::Lock { target }).await
    }

    pub async fn unlock(&self, target: Datastore) -> Result<Reply> {
        self.require_datastore(target)?;
        self.request(&Operation::Unlock { target }).await
    }

    /// Commit the candidate datastore
    pub async fn commit(&self) -> Result<Reply> {
        self.require(hello::CANDIDATE, "commit")?;
        self.request(&Operation::Commit).await
    }

    pub async fn discard_changes(&self) -> Result<Reply> {
        self.require(hello::CANDIDATE, "discard-changes")?;
        self.request(&Operation::DiscardChanges).await
    }

    pub async fn validate(&self, source: Datastore) -> Result<Reply> {
        if !self.negotiated.device_supports(hello::VALIDATE)
            && !self.negotiated.device_supports("urn:ietf:params:netconf:capability:validate:1.0")
        {
            return Err(NetconfError::InvalidState("device does not support validate".into()));
        }
        self.require_datastore(source)?;
        self.request(&Operation::Validate { source }).await
    }

    /// Force another session on the device to terminate
    pub async fn kill_session(&self, session_id: u32) -> Result<Reply> {
        if session_id == self.negotiated.session_id {
            return Err(NetconfError::InvalidState("a session cannot kill itself".into()));
        }
        self.request(&Operation::KillSession { session_id }).await
    }

    /// Any other operation. Output parameters are typed against the
    /// operation's output schema when the registry knows it.
    pub async fn custom_rpc(&self, tag: QName, input: Vec<Element>) -> Result<Reply> {
        let operation = Operation::Custom {
            tag: tag.clone(),
            input,
        };
        let mut reply = self.request(&operation).await?;
        reply.bind_output(&self.registry, &tag)?;
        Ok(reply)
    }

    /// `<close-session>`, then release the transport.
    ///
    /// The session enters `Closing` at once; it is `Closed` when this
    /// returns, whatever the device answered. Requests still pending fail
    /// with [`NetconfError::SessionClosed`].
    pub async fn close(&self) -> Result<Reply> {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                SessionState::Established => {
                    debug!(session = %self.shared.name, "session state change to closing");
                    *state = SessionState::Closing;
                }
                SessionState::Closing | SessionState::Closed => return Err(NetconfError::SessionClosed),
                other => {
                    return Err(NetconfError::InvalidState(format!(
                        "session '{}' is {other}",
                        self.shared.name
                    )));
                }
            }
        }

        let result = self.exchange(&Operation::CloseSession).await;
        self.shutdown().await;
        result
    }

    /// Fail what is still pending, then shut the transport down
    async fn shutdown(&self) {
        self.shared.set_state(SessionState::Closed);
        self.shared.fail_all(|| NetconfError::SessionClosed);
        let mut writer = self.writer.lock().await;
        if let Err(e) = writer.close().await {
            debug!(session = %self.shared.name, error = %e, "transport shutdown failed");
        }
        self.reader_task.abort();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

async fn handshake(
    shared: &Shared,
    reader: &mut Reader,
    writer: &mut Writer,
    config: &SessionConfig,
    registry: &SchemaRegistry,
) -> Result<Negotiated> {
    let mut capabilities = config.capabilities.clone();
    for capability in registry.capabilities() {
        if !capabilities.contains(&capability) {
            capabilities.push(capability);
        }
    }

    writer
        .send(Hello::client(capabilities.clone()).encode())
        .await
        .map_err(|e| NetconfError::Handshake(format!("sending hello: {e}")))?;
    shared.set_state(SessionState::HelloSent);

    let frame = tokio::time::timeout(config.hello_timeout(), reader.next())
        .await
        .map_err(|_| NetconfError::Handshake("no hello from device in time".into()))?
        .ok_or_else(|| NetconfError::Handshake("connection closed before hello".into()))?
        .map_err(|e| NetconfError::Handshake(e.to_string()))?;

    let device = Hello::decode(&frame)?;
    hello::negotiate(&capabilities, &device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::Framing;
    use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

    const DEVICE_HELLO_1_0: &str = "<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\">\
        <capabilities><capability>urn:ietf:params:netconf:base:1.0</capability></capabilities>\
        <session-id>7</session-id></hello>]]>]]>";

    async fn read_until(device: &mut DuplexStream, marker: &[u8]) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut byte = [0u8; 1];
        while !seen.ends_with(marker) {
            let n = device.read(&mut byte).await.unwrap();
            assert!(n > 0, "stream closed early");
            seen.push(byte[0]);
        }
        seen
    }

    fn config(request_timeout_ms: u64) -> SessionConfig {
        SessionConfig {
            request_timeout_ms,
            hello_timeout_ms: 500,
            ..SessionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_handshake_and_ok_reply() {
        let (client, mut device) = tokio::io::duplex(4096);
        let device_task = tokio::spawn(async move {
            read_until(&mut device, b"]]>]]>").await;
            device.write_all(DEVICE_HELLO_1_0.as_bytes()).await.unwrap();
            let request = read_until(&mut device, b"]]>]]>").await;
            assert!(String::from_utf8_lossy(&request).contains("<lock><target><running/></target></lock>"));
            device
                .write_all(b"<rpc-reply message-id=\"1\"><ok/></rpc-reply>]]>]]>")
                .await
                .unwrap();
            device
        });

        let session = Session::establish("s1", Box::new(client), &config(1000), Arc::new(SchemaRegistry::new()))
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Established);
        assert_eq!(session.session_id(), 7);
        assert_eq!(session.negotiated().framing, Framing::EndOfMessage);

        let reply = session.lock(Datastore::Running).await.unwrap();
        assert!(reply.is_ok());
        assert_eq!(session.pending_requests(), 0);
        drop(device_task.await.unwrap());
    }

    #[tokio::test]
    async fn test_handshake_without_session_id_fails() {
        let (client, mut device) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            read_until(&mut device, b"]]>]]>").await;
            device
                .write_all(
                    b"<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><capabilities>\
                      <capability>urn:ietf:params:netconf:base:1.0</capability></capabilities></hello>]]>]]>",
                )
                .await
                .unwrap();
            device
        });

        let err = Session::establish("s", Box::new(client), &config(1000), Arc::new(SchemaRegistry::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::Handshake(_)), "{err:?}");
    }

    #[tokio::test]
    async fn test_handshake_timeout() {
        let (client, _device) = tokio::io::duplex(4096);
        let err = Session::establish("s", Box::new(client), &config(1000), Arc::new(SchemaRegistry::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::Handshake(_)));
    }

    #[tokio::test]
    async fn test_request_after_dispatch_failure() {
        let (client, mut device) = tokio::io::duplex(4096);
        let device_task = tokio::spawn(async move {
            read_until(&mut device, b"]]>]]>").await;
            device.write_all(DEVICE_HELLO_1_0.as_bytes()).await.unwrap();
            device
        });
        let session = Session::establish("s", Box::new(client), &config(5000), Arc::new(SchemaRegistry::new()))
            .await
            .unwrap();
        let _device = device_task.await.unwrap();

        // the reader gave up while the write side is still healthy
        session.shared.terminate("invalid chunk header");
        let err = session
            .exchange(&Operation::Lock {
                target: Datastore::Running,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, NetconfError::Transport(ref reason) if reason == "invalid chunk header"), "{err:?}");
        assert_eq!(session.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_capability_gate() {
        let (client, mut device) = tokio::io::duplex(4096);
        let device_task = tokio::spawn(async move {
            read_until(&mut device, b"]]>]]>").await;
            device.write_all(DEVICE_HELLO_1_0.as_bytes()).await.unwrap();
            device
        });
        let session = Session::establish("s", Box::new(client), &config(1000), Arc::new(SchemaRegistry::new()))
            .await
            .unwrap();
        assert!(matches!(session.commit().await, Err(NetconfError::InvalidState(_))));
        assert!(matches!(
            session.get(Some(Filter::xpath("/a"))).await,
            Err(NetconfError::InvalidState(_))
        ));
        assert!(matches!(session.kill_session(7).await, Err(NetconfError::InvalidState(_))));
        drop(device_task.await.unwrap());
    }
}
