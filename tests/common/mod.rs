//! Scripted in-memory NETCONF device for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio_util::codec::{Decoder, Encoder};

use rust_netconf::framing::{Framing, NetconfCodec};
use rust_netconf::hello::{BASE_1_0, BASE_1_1};
use rust_netconf::{
    ByteStream, Connection, Connector, Credentials, DeviceConfig, Element, NetconfError, Result,
    SchemaRegistry, read_xml,
};

pub const SYS_NS: &str = "urn:example:sys";
pub const IF_NS: &str = "urn:example:interfaces";

pub const SYS_DESCRIPTOR: &str = r#"{
    "module-name": "example-sys",
    "namespace": "urn:example:sys",
    "prefix": "sys",
    "revision": "2024-01-01",
    "nodes": [
        {"path": "/sys-info", "kind": "container", "config": false},
        {"path": "/sys-info/version", "kind": "leaf", "type": "string"},
        {"path": "/sys-info/uptime", "kind": "leaf", "type": "uint32"},
        {"path": "/reboot", "kind": "rpc"},
        {"path": "/reboot/input", "kind": "input"},
        {"path": "/reboot/input/delay", "kind": "leaf", "type": "uint16"},
        {"path": "/reboot/output", "kind": "output"},
        {"path": "/reboot/output/scheduled", "kind": "leaf", "type": "boolean"}
    ]
}"#;

pub const IF_DESCRIPTOR: &str = r#"{
    "module-name": "example-interfaces",
    "namespace": "urn:example:interfaces",
    "prefix": "if",
    "nodes": [
        {"path": "/interfaces", "kind": "container"},
        {"path": "/interfaces/interface", "kind": "list", "keys": ["name"]},
        {"path": "/interfaces/interface/name", "kind": "leaf", "type": "string"},
        {"path": "/interfaces/interface/type", "kind": "leaf", "type": {"base": "enumeration", "enums": ["ethernet", "vxlan"]}},
        {"path": "/interfaces/interface/mtu", "kind": "leaf", "type": {"base": "uint16", "range": "68..9216"}},
        {"path": "/interfaces/interface/enabled", "kind": "leaf", "type": "boolean"}
    ]
}"#;

pub fn registry() -> Arc<SchemaRegistry> {
    let mut registry = SchemaRegistry::new();
    registry.register(SYS_NS, SYS_DESCRIPTOR).unwrap();
    registry.register(IF_NS, IF_DESCRIPTOR).unwrap();
    Arc::new(registry)
}

/// A request as seen by the device
#[derive(Debug)]
pub struct Request {
    pub message_id: String,
    pub text: String,
    pub tree: Element,
}

impl Request {
    /// Name of the operation element
    pub fn operation(&self) -> &str {
        self.tree.children()[0].name()
    }
}

/// Device end of an in-memory session
pub struct FakeDevice {
    stream: DuplexStream,
    codec: NetconfCodec,
    buf: BytesMut,
}

impl FakeDevice {
    /// A connected (client stream, device) pair
    pub fn pair() -> (Box<dyn ByteStream>, FakeDevice) {
        let (client, device) = tokio::io::duplex(64 * 1024);
        (
            Box::new(client),
            FakeDevice {
                stream: device,
                codec: NetconfCodec::default(),
                buf: BytesMut::new(),
            },
        )
    }

    /// Next framed message from the client, `None` once it hung up
    pub async fn read_message(&mut self) -> Option<Vec<u8>> {
        loop {
            if let Some(msg) = self.codec.decode(&mut self.buf).unwrap() {
                return Some(msg);
            }
            let mut chunk = [0u8; 4096];
            match self.stream.read(&mut chunk).await {
                Ok(0) | Err(_) => return None,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
            }
        }
    }

    /// Send a message in the current framing
    pub async fn send(&mut self, text: &str) {
        let mut out = BytesMut::new();
        self.codec.encode(text.as_bytes().to_vec(), &mut out).unwrap();
        self.stream.write_all(&out).await.unwrap();
    }

    /// Read the client hello, answer with `capabilities` and `session_id`,
    /// and switch framing the way the client will. Returns the client hello.
    pub async fn handshake(&mut self, capabilities: &[&str], session_id: u32) -> String {
        let client_hello = String::from_utf8(self.read_message().await.expect("client hello")).unwrap();
        let caps: String = capabilities
            .iter()
            .map(|c| format!("<capability>{c}</capability>"))
            .collect();
        self.send(&format!(
            "<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"><capabilities>{caps}</capabilities>\
             <session-id>{session_id}</session-id></hello>"
        ))
        .await;
        if capabilities.contains(&BASE_1_1) && client_hello.contains(BASE_1_1) {
            self.codec.set_framing(Framing::Chunked);
        }
        client_hello
    }

    /// Handshake advertising base:1.0 only
    pub async fn handshake_1_0(&mut self) -> String {
        self.handshake(&[BASE_1_0], 1).await
    }

    /// Hang up, as a crashed device would
    pub fn hang_up(self) {
        drop(self);
    }

    pub async fn read_request(&mut self) -> Option<Request> {
        let bytes = self.read_message().await?;
        let text = String::from_utf8(bytes).unwrap();
        let tree = read_xml(&text).unwrap();
        let message_id = tree.attribute("", "message-id").unwrap().to_string();
        Some(Request {
            message_id,
            text,
            tree,
        })
    }

    pub async fn reply_ok(&mut self, message_id: &str) {
        self.send(&format!(
            "<rpc-reply xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\" message-id=\"{message_id}\"><ok/></rpc-reply>"
        ))
        .await;
    }

    /// Answer every request with `<ok/>` until close-session or hang-up
    pub async fn serve_ok(mut self) {
        while let Some(request) = self.read_request().await {
            self.reply_ok(&request.message_id).await;
            if request.operation() == "close-session" {
                break;
            }
        }
    }
}

/// Connector handing out in-memory channels, each served by an
/// auto-responding [`FakeDevice`]
#[derive(Debug, Default)]
pub struct FakeConnector {
    pub multiplexes: bool,
    pub connections: Arc<AtomicUsize>,
    pub channels: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new(multiplexes: bool) -> Self {
        Self {
            multiplexes,
            ..Self::default()
        }
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self, _config: &DeviceConfig, _credentials: &Credentials) -> Result<Box<dyn Connection>> {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            multiplexes: self.multiplexes,
            opened: 0,
            channels: Arc::clone(&self.channels),
        }))
    }
}

pub struct FakeConnection {
    multiplexes: bool,
    opened: usize,
    channels: Arc<AtomicUsize>,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn open_channel(&mut self) -> Result<Box<dyn ByteStream>> {
        if !self.multiplexes && self.opened > 0 {
            return Err(NetconfError::Transport("single channel only".into()));
        }
        self.opened += 1;
        let id = self.channels.fetch_add(1, Ordering::SeqCst) as u32 + 1;
        let (client, mut device) = FakeDevice::pair();
        tokio::spawn(async move {
            device.handshake(&[BASE_1_0, BASE_1_1], id).await;
            device.serve_ok().await;
        });
        Ok(client)
    }

    fn multiplexes(&self) -> bool {
        self.multiplexes
    }

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
