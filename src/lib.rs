//! rust-netconf - schema-aware NETCONF client core
//!
//! This library establishes NETCONF sessions to managed devices, correlates
//! RPC requests and replies over a shared byte stream, and maps between
//! wire XML/JSON and a typed YANG element tree driven by pre-built schema
//! descriptors.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_netconf::{Credentials, Device, DeviceConfig, Element, Filter, SchemaRegistry, TcpConnector};
//!
//! # async fn run() -> rust_netconf::Result<()> {
//! // Load schema descriptors once
//! let mut registry = SchemaRegistry::new();
//! registry.register_file("example-sys.json")?;
//!
//! // Connect and open a session
//! let config = DeviceConfig::from_file("router1.json")?;
//! let mut device = Device::new(config, Arc::new(TcpConnector), Arc::new(registry));
//! device.add_user(Credentials::new("operator", "secret"));
//! device.connect().await?;
//! let session = device.new_session("main").await?;
//!
//! // Fetch typed state data
//! let filter = Filter::subtree(Element::container("urn:example:sys", "sys-info"));
//! let reply = session.get(Some(filter)).await?;
//! if let Some(data) = reply.data() {
//!     println!("{}", data.to_xml_string());
//! }
//!
//! device.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod device;
pub mod element;
mod error;
pub mod framing;
pub mod hello;
mod json;
pub mod path;
pub mod rpc;
pub mod schema;
pub mod session;
pub mod transport;
pub mod types;
mod xml;

pub use config::{ChannelPolicy, DeviceConfig, SessionConfig};
pub use device::Device;
pub use element::{Attribute, Content, EditOperation, Element, NETCONF_BASE_NS};
pub use error::{NetconfError, Result};
pub use path::{InstancePath, QName, TagPath};
pub use rpc::{Datastore, Filter, Operation, Reply, ReplyContent, RpcError};
pub use schema::{SchemaNode, SchemaRegistry};
pub use session::{Session, SessionState};
pub use transport::{ByteStream, Connection, Connector, Credentials, TcpConnector};
pub use types::{TypeSpec, TypedValue, Value, YangType};
pub use xml::read_xml;
