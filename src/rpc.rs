//! RPC request encoding and reply decoding
//!
//! Requests are built as element trees and serialized with the XML codec.
//! Replies are parsed into a [`Reply`] that keeps every `<rpc-error>` as
//! data next to whatever `<ok/>`, `<data>` or output the device sent.

use std::fmt;

use crate::element::{EditOperation, Element, NETCONF_BASE_NS};
use crate::error::{NetconfError, Result};
use crate::path::{QName, TagPath};
use crate::schema::SchemaRegistry;
use crate::xml::read_xml;

/// A configuration datastore
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datastore {
    Running,
    Candidate,
    Startup,
}

impl Datastore {
    pub fn as_str(self) -> &'static str {
        match self {
            Datastore::Running => "running",
            Datastore::Candidate => "candidate",
            Datastore::Startup => "startup",
        }
    }
}

impl fmt::Display for Datastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `<filter>` for get and get-config
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Subtree filter: one or more top-level selection nodes
    Subtree(Vec<Element>),
    /// XPath filter with the prefix bindings its expression uses
    XPath {
        select: String,
        namespaces: Vec<(String, String)>,
    },
}

impl Filter {
    /// A subtree filter with a single selection node
    pub fn subtree(element: Element) -> Self {
        Filter::Subtree(vec![element])
    }

    pub fn xpath(select: impl Into<String>) -> Self {
        Filter::XPath {
            select: select.into(),
            namespaces: Vec::new(),
        }
    }
}

/// edit-config `<default-operation>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultOperation {
    Merge,
    Replace,
    None,
}

impl DefaultOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            DefaultOperation::Merge => "merge",
            DefaultOperation::Replace => "replace",
            DefaultOperation::None => "none",
        }
    }
}

/// edit-config `<test-option>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestOption {
    TestThenSet,
    Set,
    TestOnly,
}

impl TestOption {
    pub fn as_str(self) -> &'static str {
        match self {
            TestOption::TestThenSet => "test-then-set",
            TestOption::Set => "set",
            TestOption::TestOnly => "test-only",
        }
    }
}

/// edit-config `<error-option>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOption {
    StopOnError,
    ContinueOnError,
    RollbackOnError,
}

impl ErrorOption {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorOption::StopOnError => "stop-on-error",
            ErrorOption::ContinueOnError => "continue-on-error",
            ErrorOption::RollbackOnError => "rollback-on-error",
        }
    }
}

/// Arguments of an edit-config request
#[derive(Debug, Clone, PartialEq)]
pub struct EditConfig {
    pub target: Datastore,
    /// Top-level nodes placed under `<config>`
    pub config: Vec<Element>,
    pub default_operation: Option<DefaultOperation>,
    pub test_option: Option<TestOption>,
    pub error_option: Option<ErrorOption>,
}

impl EditConfig {
    pub fn new(target: Datastore, config: Vec<Element>) -> Self {
        Self {
            target,
            config,
            default_operation: None,
            test_option: None,
            error_option: None,
        }
    }
}

/// An RPC operation and its arguments
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Get { filter: Option<Filter> },
    GetConfig { source: Datastore, filter: Option<Filter> },
    EditConfig(EditConfig),
    CopyConfig { target: Datastore, source: Datastore },
    DeleteConfig { target: Datastore },
    Lock { target: Datastore },
    Unlock { target: Datastore },
    CloseSession,
    KillSession { session_id: u32 },
    Commit,
    DiscardChanges,
    Validate { source: Datastore },
    /// Any other operation: its tag and input parameters
    Custom { tag: QName, input: Vec<Element> },
}

impl Operation {
    /// The operation's element name
    pub fn name(&self) -> &str {
        match self {
            Operation::Get { .. } => "get",
            Operation::GetConfig { .. } => "get-config",
            Operation::EditConfig(_) => "edit-config",
            Operation::CopyConfig { .. } => "copy-config",
            Operation::DeleteConfig { .. } => "delete-config",
            Operation::Lock { .. } => "lock",
            Operation::Unlock { .. } => "unlock",
            Operation::CloseSession => "close-session",
            Operation::KillSession { .. } => "kill-session",
            Operation::Commit => "commit",
            Operation::DiscardChanges => "discard-changes",
            Operation::Validate { .. } => "validate",
            Operation::Custom { tag, .. } => tag.name.as_str(),
        }
    }

    fn to_element(&self) -> Result<Element> {
        let mut op = match self {
            Operation::Custom { tag, .. } => Element::new(tag.clone()),
            _ => nc(self.name()),
        };
        match self {
            Operation::Get { filter } => {
                if let Some(filter) = filter {
                    op.push_child(filter_element(filter)?)?;
                }
            }
            Operation::GetConfig { source, filter } => {
                op.push_child(datastore_element("source", *source)?)?;
                if let Some(filter) = filter {
                    op.push_child(filter_element(filter)?)?;
                }
            }
            Operation::EditConfig(edit) => {
                op.push_child(datastore_element("target", edit.target)?)?;
                if let Some(default) = edit.default_operation {
                    op.push_child(nc_leaf("default-operation", default.as_str()))?;
                }
                if let Some(test) = edit.test_option {
                    op.push_child(nc_leaf("test-option", test.as_str()))?;
                }
                if let Some(error) = edit.error_option {
                    op.push_child(nc_leaf("error-option", error.as_str()))?;
                }
                let mut config = nc("config");
                for node in &edit.config {
                    config.push_child(node.clone())?;
                }
                op.push_child(config)?;
            }
            Operation::CopyConfig { target, source } => {
                op.push_child(datastore_element("target", *target)?)?;
                op.push_child(datastore_element("source", *source)?)?;
            }
            Operation::DeleteConfig { target } | Operation::Lock { target } | Operation::Unlock { target } => {
                op.push_child(datastore_element("target", *target)?)?;
            }
            Operation::Validate { source } => {
                op.push_child(datastore_element("source", *source)?)?;
            }
            Operation::KillSession { session_id } => {
                op.push_child(nc_leaf("session-id", session_id.to_string()))?;
            }
            Operation::Custom { input, .. } => {
                for param in input {
                    op.push_child(param.clone())?;
                }
            }
            Operation::CloseSession | Operation::Commit | Operation::DiscardChanges => {}
        }
        Ok(op)
    }
}

fn nc(name: &str) -> Element {
    Element::container(NETCONF_BASE_NS, name)
}

fn nc_leaf(name: &str, text: impl Into<String>) -> Element {
    Element::text_leaf(NETCONF_BASE_NS, name, text)
}

fn datastore_element(wrapper: &str, datastore: Datastore) -> Result<Element> {
    nc(wrapper).with_child(nc(datastore.as_str()))
}

fn filter_element(filter: &Filter) -> Result<Element> {
    let mut element = nc("filter");
    match filter {
        Filter::Subtree(nodes) => {
            element.set_attribute(QName::unqualified("type"), "subtree");
            for node in nodes {
                element.push_child(node.clone())?;
            }
        }
        Filter::XPath { select, namespaces } => {
            element.set_attribute(QName::unqualified("type"), "xpath");
            element.set_attribute(QName::unqualified("select"), select.as_str());
            for (prefix, namespace) in namespaces {
                element.declare_namespace(prefix.as_str(), namespace.as_str());
            }
        }
    }
    Ok(element)
}

/// Serialize `operation` into an `<rpc>` envelope
pub fn encode_request(message_id: &str, operation: &Operation) -> Result<Vec<u8>> {
    let mut rpc = nc("rpc");
    rpc.declare_namespace("nc", NETCONF_BASE_NS);
    rpc.set_attribute(QName::unqualified("message-id"), message_id);
    rpc.push_child(operation.to_element()?)?;

    let mut out = br#"<?xml version="1.0" encoding="UTF-8"?>"#.to_vec();
    out.extend_from_slice(rpc.to_xml_string().as_bytes());
    Ok(out)
}

/// `<error-type>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorType {
    Transport,
    Rpc,
    Protocol,
    Application,
    /// A layer name outside the base protocol set, kept as sent
    Other(String),
}

impl ErrorType {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorType::Transport => "transport",
            ErrorType::Rpc => "rpc",
            ErrorType::Protocol => "protocol",
            ErrorType::Application => "application",
            ErrorType::Other(layer) => layer,
        }
    }
}

impl From<&str> for ErrorType {
    fn from(text: &str) -> Self {
        match text {
            "transport" => ErrorType::Transport,
            "rpc" => ErrorType::Rpc,
            "protocol" => ErrorType::Protocol,
            "application" => ErrorType::Application,
            other => ErrorType::Other(other.to_string()),
        }
    }
}

/// `<error-severity>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

/// `<error-tag>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorTag {
    InUse,
    InvalidValue,
    TooBig,
    MissingAttribute,
    BadAttribute,
    UnknownAttribute,
    MissingElement,
    BadElement,
    UnknownElement,
    UnknownNamespace,
    AccessDenied,
    LockDenied,
    ResourceDenied,
    RollbackFailed,
    DataExists,
    DataMissing,
    OperationNotSupported,
    OperationFailed,
    PartialOperation,
    MalformedMessage,
    /// A tag outside the base protocol set
    Other(String),
}

const ERROR_TAGS: &[(&str, ErrorTag)] = &[
    ("in-use", ErrorTag::InUse),
    ("invalid-value", ErrorTag::InvalidValue),
    ("too-big", ErrorTag::TooBig),
    ("missing-attribute", ErrorTag::MissingAttribute),
    ("bad-attribute", ErrorTag::BadAttribute),
    ("unknown-attribute", ErrorTag::UnknownAttribute),
    ("missing-element", ErrorTag::MissingElement),
    ("bad-element", ErrorTag::BadElement),
    ("unknown-element", ErrorTag::UnknownElement),
    ("unknown-namespace", ErrorTag::UnknownNamespace),
    ("access-denied", ErrorTag::AccessDenied),
    ("lock-denied", ErrorTag::LockDenied),
    ("resource-denied", ErrorTag::ResourceDenied),
    ("rollback-failed", ErrorTag::RollbackFailed),
    ("data-exists", ErrorTag::DataExists),
    ("data-missing", ErrorTag::DataMissing),
    ("operation-not-supported", ErrorTag::OperationNotSupported),
    ("operation-failed", ErrorTag::OperationFailed),
    ("partial-operation", ErrorTag::PartialOperation),
    ("malformed-message", ErrorTag::MalformedMessage),
];

impl ErrorTag {
    pub fn as_str(&self) -> &str {
        if let ErrorTag::Other(tag) = self {
            return tag;
        }
        ERROR_TAGS
            .iter()
            .find(|(_, t)| t == self)
            .map(|(name, _)| *name)
            .unwrap_or_default()
    }
}

impl From<&str> for ErrorTag {
    fn from(text: &str) -> Self {
        ERROR_TAGS
            .iter()
            .find(|(name, _)| *name == text)
            .map(|(_, tag)| tag.clone())
            .unwrap_or_else(|| ErrorTag::Other(text.to_string()))
    }
}

/// One `<rpc-error>` from a reply
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub error_type: ErrorType,
    pub tag: ErrorTag,
    pub severity: Severity,
    pub app_tag: Option<String>,
    pub path: Option<String>,
    pub message: Option<String>,
    pub info: Option<Element>,
}

impl RpcError {
    fn from_element(mut element: Element) -> Result<Self> {
        let text = |name: &str| -> Option<String> {
            element
                .find_local(name)
                .and_then(Element::value)
                .map(|v| v.original().trim().to_string())
        };

        let tag = text("error-tag")
            .filter(|t| !t.is_empty())
            .ok_or_else(|| NetconfError::MalformedReply("rpc-error without error-tag".into()))?;
        let error_type = text("error-type")
            .filter(|t| !t.is_empty())
            .map_or(ErrorType::Application, |t| ErrorType::from(t.as_str()));
        let severity = match text("error-severity").as_deref() {
            Some("warning") => Severity::Warning,
            _ => Severity::Error,
        };
        let app_tag = text("error-app-tag");
        let path = text("error-path");
        let message = text("error-message");

        let info = element
            .children()
            .iter()
            .position(|c| c.name() == "error-info")
            .and_then(|i| element.remove_child(i));

        Ok(Self {
            error_type,
            tag: ErrorTag::from(tag.as_str()),
            severity,
            app_tag,
            path,
            message,
            info,
        })
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.error_type.as_str(), self.tag.as_str())?;
        if let Some(path) = &self.path {
            write!(f, " at {path}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

/// Reply payload other than errors
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyContent {
    /// `<ok/>`
    Ok,
    /// `<data>` of get/get-config
    Data(Element),
    /// Output parameters of a custom operation
    Output(Vec<Element>),
    /// Nothing besides errors
    Empty,
}

/// A decoded `<rpc-reply>`
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub message_id: String,
    pub content: ReplyContent,
    /// Every rpc-error in document order, warnings included
    pub errors: Vec<RpcError>,
}

impl Reply {
    /// True when no error of severity `error` was reported
    pub fn is_ok(&self) -> bool {
        self.errors.iter().all(|e| e.severity == Severity::Warning)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// The `<data>` element, if any
    pub fn data(&self) -> Option<&Element> {
        match &self.content {
            ReplyContent::Data(data) => Some(data),
            _ => None,
        }
    }

    pub fn into_data(self) -> Option<Element> {
        match self.content {
            ReplyContent::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Type the leaves under `<data>` against `registry`
    pub fn bind(&mut self, registry: &SchemaRegistry) -> Result<()> {
        if let ReplyContent::Data(data) = &mut self.content {
            data.bind_children(registry)?;
        }
        Ok(())
    }

    /// Type output parameters against the output schema of `rpc`
    pub fn bind_output(&mut self, registry: &SchemaRegistry, rpc: &QName) -> Result<()> {
        if let ReplyContent::Output(elements) = &mut self.content {
            let parent: TagPath = vec![rpc.clone(), QName::new(rpc.namespace.as_str(), "output")].into();
            for element in elements {
                element.bind_under(registry, &parent)?;
            }
        }
        Ok(())
    }
}

/// Parse an `<rpc-reply>` envelope
pub fn decode_reply(bytes: &[u8]) -> Result<Reply> {
    let (message_id, root) = read_envelope(bytes)?;
    reply_from_envelope(message_id, root)
}

/// First decoding stage: the `<rpc-reply>` root and its message-id.
///
/// Once this succeeds the reply can be routed, so any later failure in
/// [`reply_from_envelope`] belongs to the request that id names.
pub(crate) fn read_envelope(bytes: &[u8]) -> Result<(String, Element)> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| NetconfError::MalformedReply(format!("reply is not UTF-8: {e}")))?;
    let root = read_xml(text).map_err(|e| NetconfError::MalformedReply(e.to_string()))?;

    if root.name() != "rpc-reply" {
        return Err(NetconfError::MalformedReply(format!(
            "expected <rpc-reply>, got '{}'",
            root.qname()
        )));
    }
    let message_id = root
        .attributes()
        .iter()
        .find(|a| a.qname.name == "message-id")
        .map(|a| a.value.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| NetconfError::MalformedReply("rpc-reply without message-id".into()))?;
    Ok((message_id, root))
}

pub(crate) fn reply_from_envelope(message_id: String, mut root: Element) -> Result<Reply> {
    let mut ok = false;
    let mut data = None;
    let mut output = Vec::new();
    let mut errors = Vec::new();
    for child in root.take_children() {
        match child.name() {
            "ok" => ok = true,
            "data" if data.is_none() => data = Some(child),
            "rpc-error" => errors.push(RpcError::from_element(child)?),
            _ => output.push(child),
        }
    }

    let content = match data {
        Some(data) => ReplyContent::Data(data),
        None if !output.is_empty() => ReplyContent::Output(output),
        None if ok => ReplyContent::Ok,
        None => ReplyContent::Empty,
    };

    Ok(Reply {
        message_id,
        content,
        errors,
    })
}

/// Mark a config node for deletion, as a convenience for edit payloads
pub fn delete_marker(mut element: Element) -> Element {
    element.set_operation(EditOperation::Delete);
    element
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SYS_NS: &str = "urn:example:sys";

    fn request_text(op: &Operation) -> String {
        String::from_utf8(encode_request("101", op).unwrap()).unwrap()
    }

    #[test]
    fn test_encode_get_with_subtree_filter() {
        let op = Operation::Get {
            filter: Some(Filter::subtree(Element::container(SYS_NS, "sys-info"))),
        };
        let text = request_text(&op);
        assert!(text.ends_with(
            "<rpc xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\" \
             xmlns:nc=\"urn:ietf:params:xml:ns:netconf:base:1.0\" message-id=\"101\">\
             <get><filter type=\"subtree\"><sys-info xmlns=\"urn:example:sys\"/></filter></get></rpc>"
        ), "{text}");
    }

    #[test]
    fn test_encode_get_config_xpath() {
        let op = Operation::GetConfig {
            source: Datastore::Candidate,
            filter: Some(Filter::XPath {
                select: "/s:sys-info/s:version".into(),
                namespaces: vec![("s".into(), SYS_NS.into())],
            }),
        };
        let text = request_text(&op);
        assert!(text.contains(
            "<get-config><source><candidate/></source>\
             <filter xmlns:s=\"urn:example:sys\" type=\"xpath\" select=\"/s:sys-info/s:version\"/></get-config>"
        ), "{text}");
    }

    #[test]
    fn test_encode_edit_config_options() {
        let mut edit = EditConfig::new(
            Datastore::Running,
            vec![delete_marker(
                Element::container("urn:example:vx", "tunnel")
                    .with_child(Element::text_leaf("urn:example:vx", "name", "vxlan-tunnel2"))
                    .unwrap(),
            )],
        );
        edit.default_operation = Some(DefaultOperation::None);
        edit.error_option = Some(ErrorOption::RollbackOnError);
        let text = request_text(&Operation::EditConfig(edit));

        assert!(text.contains("<edit-config><target><running/></target>"), "{text}");
        assert!(text.contains("<default-operation>none</default-operation>"));
        assert!(text.contains("<error-option>rollback-on-error</error-option>"));
        assert!(text.contains(
            "<config><tunnel xmlns=\"urn:example:vx\" nc:operation=\"delete\"><name>vxlan-tunnel2</name></tunnel></config>"
        ), "{text}");
    }

    #[test]
    fn test_encode_request_parses_back() {
        for op in [
            Operation::CloseSession,
            Operation::Commit,
            Operation::DiscardChanges,
            Operation::KillSession { session_id: 7 },
            Operation::Lock { target: Datastore::Running },
            Operation::CopyConfig { target: Datastore::Startup, source: Datastore::Running },
            Operation::Custom {
                tag: QName::new(SYS_NS, "reboot"),
                input: vec![Element::text_leaf(SYS_NS, "delay", "5")],
            },
        ] {
            let bytes = encode_request("9", &op).unwrap();
            let tree = read_xml(std::str::from_utf8(&bytes).unwrap()).unwrap();
            assert_eq!(tree.name(), "rpc");
            assert_eq!(tree.attribute("", "message-id"), Some("9"));
            assert_eq!(tree.children().len(), 1);
            assert_eq!(tree.children()[0].name(), op.name());
        }
    }

    #[test]
    fn test_decode_data_reply() {
        let reply = decode_reply(
            br#"<rpc-reply message-id="1" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <data><sys-info xmlns="urn:example:sys"><version>1.2.3</version></sys-info></data>
</rpc-reply>"#,
        )
        .unwrap();
        assert_eq!(reply.message_id, "1");
        assert!(reply.is_ok());
        let data = reply.data().unwrap();
        let version = data.children()[0].leaf_value(SYS_NS, "version").unwrap();
        assert_eq!(version.to_canonical_string(), "1.2.3");
    }

    #[test]
    fn test_decode_ok_reply() {
        let reply = decode_reply(br#"<rpc-reply message-id="5"><ok/></rpc-reply>"#).unwrap();
        assert_eq!(reply.content, ReplyContent::Ok);
        assert!(reply.is_ok());
    }

    #[test]
    fn test_decode_error_reply() {
        let reply = decode_reply(
            br#"<rpc-reply message-id="2" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <rpc-error>
    <error-type>application</error-type>
    <error-tag>invalid-value</error-tag>
    <error-message>bad filter</error-message>
  </rpc-error>
</rpc-reply>"#,
        )
        .unwrap();
        assert_eq!(reply.errors.len(), 1);
        let err = &reply.errors[0];
        assert_eq!(err.tag, ErrorTag::InvalidValue);
        assert_eq!(err.error_type, ErrorType::Application);
        assert_eq!(err.severity, Severity::Error);
        assert_eq!(err.message.as_deref(), Some("bad filter"));
        assert_eq!(reply.content, ReplyContent::Empty);
        assert!(!reply.is_ok());
        assert_eq!(err.to_string(), "application invalid-value: bad filter");
    }

    #[test]
    fn test_decode_keeps_partial_success() {
        let reply = decode_reply(
            br#"<rpc-reply message-id="3" xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <rpc-error>
    <error-type>protocol</error-type><error-tag>lock-denied</error-tag>
    <error-severity>warning</error-severity>
    <error-path>/sys-info</error-path>
    <error-info><session-id>12</session-id></error-info>
  </rpc-error>
  <rpc-error><error-type>rpc</error-type><error-tag>vendor-specific</error-tag></rpc-error>
  <data><sys-info xmlns="urn:example:sys"/></data>
</rpc-reply>"#,
        )
        .unwrap();
        assert_eq!(reply.errors.len(), 2);
        assert_eq!(reply.errors[0].severity, Severity::Warning);
        assert_eq!(reply.errors[0].path.as_deref(), Some("/sys-info"));
        let info = reply.errors[0].info.as_ref().unwrap();
        assert_eq!(info.find_local("session-id").unwrap().value().unwrap().original(), "12");
        assert_eq!(reply.errors[1].tag, ErrorTag::Other("vendor-specific".into()));
        assert!(reply.data().is_some());
    }

    #[test]
    fn test_decode_custom_output() {
        let reply = decode_reply(
            br#"<rpc-reply message-id="4"><uptime xmlns="urn:example:sys">42</uptime></rpc-reply>"#,
        )
        .unwrap();
        match &reply.content {
            ReplyContent::Output(out) => assert_eq!(out[0].name(), "uptime"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_malformed() {
        for bad in [
            &b"<rpc-reply><ok/></rpc-reply>"[..],
            b"<rpc-reply message-id=\"\"><ok/></rpc-reply>",
            b"<hello/>",
            b"<rpc-reply message-id=\"1\"><ok/>",
            b"<rpc-reply message-id=\"1\"><rpc-error><error-type>rpc</error-type></rpc-error></rpc-reply>",
            b"\xff\xfe",
        ] {
            assert!(
                matches!(decode_reply(bad), Err(NetconfError::MalformedReply(_))),
                "{}",
                String::from_utf8_lossy(bad)
            );
        }
    }

    #[test]
    fn test_decode_keeps_unknown_error_type() {
        let reply = decode_reply(
            br#"<rpc-reply message-id="5"><rpc-error><error-type>vendor</error-type><error-tag>in-use</error-tag></rpc-error></rpc-reply>"#,
        )
        .unwrap();
        assert_eq!(reply.errors[0].error_type, ErrorType::Other("vendor".into()));
        assert_eq!(reply.errors[0].to_string(), "vendor in-use");
    }

    #[test]
    fn test_error_tag_names() {
        assert_eq!(ErrorTag::from("data-missing"), ErrorTag::DataMissing);
        assert_eq!(ErrorTag::DataMissing.as_str(), "data-missing");
        assert_eq!(ErrorTag::from("x-y").as_str(), "x-y");
    }
}
