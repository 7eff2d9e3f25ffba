//! Hello exchange and capability negotiation

use std::sync::{Arc, LazyLock};

use crate::element::{Element, NETCONF_BASE_NS};
use crate::error::{NetconfError, Result};
use crate::framing::Framing;
use crate::types::{TypeSpec, TypedValue, YangType};
use crate::xml::read_xml;

/// NETCONF base protocol 1.0
pub const BASE_1_0: &str = "urn:ietf:params:netconf:base:1.0";
/// NETCONF base protocol 1.1 (chunked framing)
pub const BASE_1_1: &str = "urn:ietf:params:netconf:base:1.1";
pub const CANDIDATE: &str = "urn:ietf:params:netconf:capability:candidate:1.0";
pub const STARTUP: &str = "urn:ietf:params:netconf:capability:startup:1.0";
pub const VALIDATE: &str = "urn:ietf:params:netconf:capability:validate:1.1";
pub const XPATH: &str = "urn:ietf:params:netconf:capability:xpath:1.0";

/// session-id is a uint32 of at least 1
static SESSION_ID_SPEC: LazyLock<Option<Arc<TypeSpec>>> = LazyLock::new(|| {
    TypeSpec::new(YangType::Uint32)
        .with_range("1..max")
        .ok()
        .map(Arc::new)
});

/// A `<hello>` message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hello {
    pub capabilities: Vec<String>,
    /// Assigned by the device; absent in client hellos
    pub session_id: Option<u32>,
}

impl Hello {
    /// A client hello advertising `capabilities`
    pub fn client(capabilities: Vec<String>) -> Self {
        Self {
            capabilities,
            session_id: None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut capabilities = Element::container(NETCONF_BASE_NS, "capabilities");
        let mut hello = Element::container(NETCONF_BASE_NS, "hello");
        for uri in &self.capabilities {
            // a fresh container cannot reject children
            let _ = capabilities.push_child(Element::text_leaf(NETCONF_BASE_NS, "capability", uri.as_str()));
        }
        let _ = hello.push_child(capabilities);
        if let Some(id) = self.session_id {
            let _ = hello.push_child(Element::text_leaf(NETCONF_BASE_NS, "session-id", id.to_string()));
        }

        let mut out = br#"<?xml version="1.0" encoding="UTF-8"?>"#.to_vec();
        out.extend_from_slice(hello.to_xml_string().as_bytes());
        out
    }

    /// Parse a hello; failures are reported as handshake errors
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| NetconfError::Handshake(format!("hello is not UTF-8: {e}")))?;
        let root = read_xml(text).map_err(|e| NetconfError::Handshake(e.to_string()))?;
        if root.name() != "hello" || root.namespace() != NETCONF_BASE_NS {
            return Err(NetconfError::Handshake(format!(
                "expected <hello>, got '{}'",
                root.qname()
            )));
        }

        let capabilities: Vec<String> = root
            .find(NETCONF_BASE_NS, "capabilities")
            .map(|caps| {
                caps.find_all(NETCONF_BASE_NS, "capability")
                    .filter_map(Element::value)
                    .map(|v| v.original().trim().to_string())
                    .filter(|uri| !uri.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        if capabilities.is_empty() {
            return Err(NetconfError::Handshake("hello carries no capabilities".into()));
        }

        let session_id = match root.find(NETCONF_BASE_NS, "session-id") {
            Some(element) => Some(parse_session_id(element)?),
            None => None,
        };

        Ok(Self {
            capabilities,
            session_id,
        })
    }
}

fn parse_session_id(element: &Element) -> Result<u32> {
    let spec = SESSION_ID_SPEC
        .clone()
        .ok_or_else(|| NetconfError::Handshake("session-id type unavailable".into()))?;
    let text = element.value().map(|v| v.original().trim()).unwrap_or("");
    let value = TypedValue::parse(spec, text)
        .map_err(|e| NetconfError::Handshake(format!("bad session-id: {e}")))?;
    value
        .as_u64()
        .and_then(|n| u32::try_from(n).ok())
        .ok_or_else(|| NetconfError::Handshake(format!("bad session-id '{text}'")))
}

/// Result of the hello exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    pub session_id: u32,
    /// Capabilities advertised by both peers, in client order
    pub capabilities: Vec<String>,
    /// Everything the device advertised
    pub device_capabilities: Vec<String>,
    pub framing: Framing,
}

impl Negotiated {
    pub fn has(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// True when the device advertised `capability`, with or without
    /// parameters
    pub fn device_supports(&self, capability: &str) -> bool {
        self.device_capabilities.iter().any(|c| {
            c == capability
                || c.strip_prefix(capability)
                    .is_some_and(|rest| rest.starts_with('?'))
        })
    }
}

/// Intersect the client's capabilities with a device hello.
///
/// The device must assign a session-id and share at least one base
/// protocol version; base:1.1 on both sides selects chunked framing.
pub fn negotiate(client: &[String], device: &Hello) -> Result<Negotiated> {
    let session_id = device
        .session_id
        .ok_or_else(|| NetconfError::Handshake("device hello has no session-id".into()))?;

    let capabilities: Vec<String> = client
        .iter()
        .filter(|c| device.capabilities.contains(c))
        .cloned()
        .collect();

    let framing = if capabilities.iter().any(|c| c == BASE_1_1) {
        Framing::Chunked
    } else if capabilities.iter().any(|c| c == BASE_1_0) {
        Framing::EndOfMessage
    } else {
        return Err(NetconfError::Handshake(
            "no common base protocol version".into(),
        ));
    };

    Ok(Negotiated {
        session_id,
        capabilities,
        device_capabilities: device.capabilities.clone(),
        framing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    const DEVICE_HELLO: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<hello xmlns="urn:ietf:params:xml:ns:netconf:base:1.0">
  <capabilities>
    <capability>urn:ietf:params:netconf:base:1.0</capability>
    <capability>urn:ietf:params:netconf:base:1.1</capability>
    <capability>urn:ietf:params:netconf:capability:candidate:1.0</capability>
  </capabilities>
  <session-id>4</session-id>
</hello>"#;

    #[test]
    fn test_decode_device_hello() {
        let hello = Hello::decode(DEVICE_HELLO.as_bytes()).unwrap();
        assert_eq!(hello.session_id, Some(4));
        assert_eq!(hello.capabilities, caps(&[BASE_1_0, BASE_1_1, CANDIDATE]));
    }

    #[test]
    fn test_encode_decode_client_hello() {
        let hello = Hello::client(caps(&[BASE_1_0, BASE_1_1]));
        let text = String::from_utf8(hello.encode()).unwrap();
        assert!(text.contains("<capability>urn:ietf:params:netconf:base:1.1</capability>"));
        assert!(!text.contains("session-id"));
        assert_eq!(Hello::decode(text.as_bytes()).unwrap(), hello);
    }

    #[test]
    fn test_session_id_must_fit_uint32() {
        for bad in ["0", "4294967296", "-1", "abc", ""] {
            let doc = DEVICE_HELLO.replace("<session-id>4<", &format!("<session-id>{bad}<"));
            let err = Hello::decode(doc.as_bytes()).unwrap_err();
            assert!(matches!(err, NetconfError::Handshake(_)), "{bad}: {err:?}");
        }
        let doc = DEVICE_HELLO.replace("<session-id>4<", "<session-id>4294967295<");
        assert_eq!(Hello::decode(doc.as_bytes()).unwrap().session_id, Some(u32::MAX));
    }

    #[test]
    fn test_rejects_non_hello() {
        assert!(Hello::decode(b"<rpc xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"/>").is_err());
        assert!(Hello::decode(b"<hello").is_err());
        assert!(Hello::decode(b"<hello xmlns=\"urn:ietf:params:xml:ns:netconf:base:1.0\"/>").is_err());
    }

    #[test]
    fn test_negotiate_intersection() {
        let device = Hello::decode(DEVICE_HELLO.as_bytes()).unwrap();

        let n = negotiate(&caps(&[BASE_1_0, BASE_1_1, XPATH]), &device).unwrap();
        assert_eq!(n.session_id, 4);
        assert_eq!(n.capabilities, caps(&[BASE_1_0, BASE_1_1]));
        assert_eq!(n.framing, Framing::Chunked);
        assert!(!n.has(XPATH));

        let n = negotiate(&caps(&[BASE_1_0, CANDIDATE]), &device).unwrap();
        assert_eq!(n.framing, Framing::EndOfMessage);
        assert!(n.has(CANDIDATE));
        assert!(n.device_supports(BASE_1_1));
        assert!(!n.device_supports(XPATH));
    }

    #[test]
    fn test_negotiate_failures() {
        let mut device = Hello::decode(DEVICE_HELLO.as_bytes()).unwrap();
        assert!(negotiate(&caps(&[XPATH]), &device).is_err());

        device.session_id = None;
        let err = negotiate(&caps(&[BASE_1_0]), &device).unwrap_err();
        assert!(matches!(err, NetconfError::Handshake(_)));
    }
}
