//! XML reading and writing for element trees
//!
//! Reading resolves every element and attribute name to its namespace and
//! keeps the source prefixes as serialization hints. Writing emits the
//! minimal set of namespace declarations: a default `xmlns` wherever the
//! element namespace changes, and prefixed declarations for prefix hints
//! and namespaced attributes.

use quick_xml::NsReader;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{PrefixDeclaration, ResolveResult};

use crate::element::{Attribute, Content, Element, NETCONF_BASE_NS};
use crate::error::{NetconfError, Result};
use crate::path::QName;
use crate::types::TypedValue;

fn parse_err(err: impl std::fmt::Display) -> NetconfError {
    NetconfError::Parse(err.to_string())
}

fn utf8(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| NetconfError::Parse(format!("invalid UTF-8 in name: {e}")))
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<String> {
    match resolved {
        ResolveResult::Bound(ns) => utf8(ns.as_ref()),
        ResolveResult::Unbound => Ok(String::new()),
        ResolveResult::Unknown(prefix) => Err(NetconfError::Parse(format!(
            "undeclared namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

/// An element whose end tag has not been seen yet
struct Open {
    element: Element,
    text: String,
}

/// Parse an XML document into an element tree.
///
/// Every leaf is schema-less; bind the tree to a registry to type it.
pub fn read_xml(text: &str) -> Result<Element> {
    let mut reader = NsReader::from_str(text);
    let mut stack: Vec<Open> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let (resolved, event) = reader.read_resolved_event().map_err(parse_err)?;
        let namespace = match &event {
            Event::Start(_) | Event::Empty(_) => Some(namespace_of(resolved)?),
            _ => None,
        };

        match event {
            Event::Start(start) => {
                let element = open_element(&reader, namespace.unwrap_or_default(), &start)?;
                stack.push(Open {
                    element,
                    text: String::new(),
                });
            }
            Event::Empty(start) => {
                let element = open_element(&reader, namespace.unwrap_or_default(), &start)?;
                close(
                    Open {
                        element,
                        text: String::new(),
                    },
                    &mut stack,
                    &mut root,
                )?;
            }
            Event::End(_) => {
                let open = stack
                    .pop()
                    .ok_or_else(|| NetconfError::Parse("unbalanced end tag".into()))?;
                close(open, &mut stack, &mut root)?;
            }
            Event::Text(t) => {
                let unescaped = t.unescape().map_err(parse_err)?;
                match stack.last_mut() {
                    Some(top) => top.text.push_str(&unescaped),
                    None if unescaped.trim().is_empty() => {}
                    None => return Err(NetconfError::Parse("text outside the root element".into())),
                }
            }
            Event::CData(data) => {
                let top = stack
                    .last_mut()
                    .ok_or_else(|| NetconfError::Parse("CDATA outside the root element".into()))?;
                let raw = data.into_inner();
                top.text.push_str(&String::from_utf8_lossy(&raw));
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(NetconfError::Parse("document ended inside an element".into()));
    }
    root.ok_or_else(|| NetconfError::Parse("document has no root element".into()))
}

fn open_element(reader: &NsReader<&[u8]>, namespace: String, start: &BytesStart<'_>) -> Result<Element> {
    let name = start.name();
    let mut element = Element::new(QName::new(namespace, utf8(name.local_name().as_ref())?));
    element.set_prefix(name.prefix().map(|p| utf8(p.as_ref())).transpose()?);

    for attr in start.attributes() {
        let attr = attr.map_err(parse_err)?;
        let value = attr.unescape_value().map_err(parse_err)?.into_owned();

        if let Some(binding) = attr.key.as_namespace_binding() {
            let prefix = match binding {
                PrefixDeclaration::Default => String::new(),
                PrefixDeclaration::Named(p) => utf8(p)?,
            };
            element.declare_namespace(prefix, value);
            continue;
        }

        let (resolved, local) = reader.resolve_attribute(attr.key);
        let namespace = namespace_of(resolved)?;
        element.push_attribute(Attribute {
            qname: QName::new(namespace, utf8(local.as_ref())?),
            prefix: attr.key.prefix().map(|p| utf8(p.as_ref())).transpose()?,
            value,
        });
    }
    Ok(element)
}

fn close(open: Open, stack: &mut Vec<Open>, root: &mut Option<Element>) -> Result<()> {
    let Open { mut element, text } = open;

    // text beside child elements is indentation
    if element.children().is_empty() && !text.is_empty() {
        element.set_typed_value(TypedValue::untyped(text))?;
    }

    match stack.last_mut() {
        Some(parent) => {
            parent.element.push_child(element)?;
        }
        None if root.is_none() => *root = Some(element),
        None => return Err(NetconfError::Parse("more than one root element".into())),
    }
    Ok(())
}

/// In-scope namespace bindings while writing
#[derive(Default)]
struct Scope {
    bindings: Vec<(String, String)>,
    generated: usize,
}

impl Scope {
    fn lookup(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }

    fn default_namespace(&self) -> &str {
        self.lookup("").unwrap_or("")
    }

    /// A non-default prefix currently bound to `namespace`
    fn prefix_for(&self, namespace: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .filter(|(p, ns)| !p.is_empty() && ns == namespace)
            .map(|(p, _)| p.as_str())
            .find(|p| self.lookup(p) == Some(namespace))
    }
}

impl Element {
    /// Serialize this tree to an XML string
    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        let mut scope = Scope::default();
        write_element(self, &mut out, &mut scope);
        out
    }
}

fn declare(scope: &mut Scope, decls: &mut Vec<(String, String)>, prefix: &str, namespace: &str) {
    scope.bindings.push((prefix.to_string(), namespace.to_string()));
    decls.push((prefix.to_string(), namespace.to_string()));
}

fn write_element(element: &Element, out: &mut String, scope: &mut Scope) {
    let mark = scope.bindings.len();
    let mut decls: Vec<(String, String)> = Vec::new();

    for (prefix, namespace) in element.namespaces() {
        if scope.lookup(prefix) != Some(namespace.as_str()) {
            declare(scope, &mut decls, prefix, namespace);
        }
    }

    let namespace = element.namespace();
    let tag = match element.prefix() {
        Some(prefix) if !prefix.is_empty() && !namespace.is_empty() => {
            if scope.lookup(prefix) != Some(namespace) {
                declare(scope, &mut decls, prefix, namespace);
            }
            format!("{prefix}:{}", element.name())
        }
        _ => {
            if scope.default_namespace() != namespace {
                declare(scope, &mut decls, "", namespace);
            }
            element.name().to_string()
        }
    };

    let mut attrs = Vec::with_capacity(element.attributes().len());
    for attr in element.attributes() {
        let name = if attr.qname.namespace.is_empty() {
            attr.qname.name.clone()
        } else {
            let prefix = attribute_prefix(attr, scope, &mut decls);
            format!("{prefix}:{}", attr.qname.name)
        };
        attrs.push((name, attr.value.as_str()));
    }

    // default namespace declaration first
    decls.sort_by_key(|(prefix, _)| !prefix.is_empty());

    out.push('<');
    out.push_str(&tag);
    for (prefix, namespace) in &decls {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape(namespace.as_str()));
        out.push('"');
    }
    for (name, value) in attrs {
        out.push(' ');
        out.push_str(&name);
        out.push_str("=\"");
        out.push_str(&escape(value));
        out.push('"');
    }

    match element.content() {
        Content::Leaf(value) => {
            let text = value.to_canonical_string();
            if text.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                out.push_str(&escape(text.as_str()));
                write_end(out, &tag);
            }
        }
        Content::Children(children) if children.is_empty() => out.push_str("/>"),
        Content::Children(children) => {
            out.push('>');
            for child in children {
                write_element(child, out, scope);
            }
            write_end(out, &tag);
        }
    }

    scope.bindings.truncate(mark);
}

fn write_end(out: &mut String, tag: &str) {
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
}

fn attribute_prefix(attr: &Attribute, scope: &mut Scope, decls: &mut Vec<(String, String)>) -> String {
    let namespace = attr.qname.namespace.as_str();
    if let Some(prefix) = &attr.prefix
        && scope.lookup(prefix) == Some(namespace)
    {
        return prefix.clone();
    }
    if let Some(prefix) = scope.prefix_for(namespace) {
        return prefix.to_string();
    }

    let candidate = match &attr.prefix {
        Some(p) if !p.is_empty() && scope.lookup(p).is_none() => p.clone(),
        _ if namespace == NETCONF_BASE_NS && scope.lookup("nc").is_none() => "nc".to_string(),
        _ => loop {
            scope.generated += 1;
            let p = format!("ns{}", scope.generated);
            if scope.lookup(&p).is_none() {
                break p;
            }
        },
    };
    declare(scope, decls, &candidate, namespace);
    candidate
}
