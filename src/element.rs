//! Generic YANG element tree
//!
//! An [`Element`] is a namespaced node holding either a typed leaf value or
//! an ordered list of child elements, never both. Trees are built by
//! application code or parsed from XML/JSON, and can be bound to a
//! [`SchemaRegistry`] to turn schema-less text leaves into typed values.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{NetconfError, Result};
use crate::path::{InstancePath, PathStep, QName, TagPath};
use crate::schema::{NodeKind, SchemaNode, SchemaRegistry};
use crate::types::TypedValue;

/// Namespace of the NETCONF base protocol
pub const NETCONF_BASE_NS: &str = "urn:ietf:params:xml:ns:netconf:base:1.0";

/// An XML attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub qname: QName,
    /// Prefix used in the source document, if any
    pub prefix: Option<String>,
    pub value: String,
}

/// edit-config operation marker carried in the `operation` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOperation {
    Merge,
    Replace,
    Create,
    Delete,
    Remove,
}

impl EditOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            EditOperation::Merge => "merge",
            EditOperation::Replace => "replace",
            EditOperation::Create => "create",
            EditOperation::Delete => "delete",
            EditOperation::Remove => "remove",
        }
    }
}

impl FromStr for EditOperation {
    type Err = NetconfError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "merge" => Ok(Self::Merge),
            "replace" => Ok(Self::Replace),
            "create" => Ok(Self::Create),
            "delete" => Ok(Self::Delete),
            "remove" => Ok(Self::Remove),
            other => Err(NetconfError::InvalidValue(format!("unknown edit operation '{other}'"))),
        }
    }
}

impl fmt::Display for EditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Element payload
#[derive(Debug, Clone)]
pub enum Content {
    Leaf(TypedValue),
    Children(Vec<Element>),
}

/// A node in the element tree
#[derive(Debug, Clone)]
pub struct Element {
    qname: QName,
    prefix: Option<String>,
    namespaces: Vec<(String, String)>,
    attributes: Vec<Attribute>,
    content: Content,
}

impl Element {
    /// Create an empty container element
    pub fn new(qname: QName) -> Self {
        Self {
            qname,
            prefix: None,
            namespaces: Vec::new(),
            attributes: Vec::new(),
            content: Content::Children(Vec::new()),
        }
    }

    /// Create an empty container in `namespace`
    pub fn container(namespace: &str, name: &str) -> Self {
        Self::new(QName::new(namespace, name))
    }

    /// Create a leaf holding a typed value
    pub fn leaf(namespace: &str, name: &str, value: TypedValue) -> Self {
        let mut element = Self::container(namespace, name);
        element.content = Content::Leaf(value);
        element
    }

    /// Create a schema-less text leaf
    pub fn text_leaf(namespace: &str, name: &str, text: impl Into<String>) -> Self {
        Self::leaf(namespace, name, TypedValue::untyped(text))
    }

    /// Builder form of [`push_child`](Self::push_child)
    pub fn with_child(mut self, child: Element) -> Result<Self> {
        self.push_child(child)?;
        Ok(self)
    }

    pub fn qname(&self) -> &QName {
        &self.qname
    }

    pub fn name(&self) -> &str {
        &self.qname.name
    }

    pub fn namespace(&self) -> &str {
        &self.qname.namespace
    }

    /// Prefix hint used when serializing
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn set_prefix(&mut self, prefix: Option<String>) {
        self.prefix = prefix;
    }

    /// Namespace declarations `(prefix, uri)` made on this element; an empty
    /// prefix is the default namespace
    pub fn namespaces(&self) -> &[(String, String)] {
        &self.namespaces
    }

    /// Declare a namespace prefix on this element
    pub fn declare_namespace(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        let prefix = prefix.into();
        let namespace = namespace.into();
        match self.namespaces.iter_mut().find(|(p, _)| *p == prefix) {
            Some(existing) => existing.1 = namespace,
            None => self.namespaces.push((prefix, namespace)),
        }
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Value of the attribute with the given qualified name
    pub fn attribute(&self, namespace: &str, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.qname.matches(namespace, name))
            .map(|a| a.value.as_str())
    }

    /// Set an attribute, replacing an existing one in place
    pub fn set_attribute(&mut self, qname: QName, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.qname == qname) {
            Some(attr) => attr.value = value,
            None => self.attributes.push(Attribute {
                qname,
                prefix: None,
                value,
            }),
        }
    }

    pub fn remove_attribute(&mut self, namespace: &str, name: &str) -> Option<String> {
        let index = self
            .attributes
            .iter()
            .position(|a| a.qname.matches(namespace, name))?;
        Some(self.attributes.remove(index).value)
    }

    pub(crate) fn push_attribute(&mut self, attribute: Attribute) {
        self.attributes.push(attribute);
    }

    /// The edit-config operation marker, if present and valid
    pub fn operation(&self) -> Option<EditOperation> {
        self.attribute(NETCONF_BASE_NS, "operation")
            .and_then(|op| op.parse().ok())
    }

    /// Mark this element with an edit-config operation
    pub fn set_operation(&mut self, operation: EditOperation) {
        self.set_attribute(QName::new(NETCONF_BASE_NS, "operation"), operation.as_str());
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, Content::Leaf(_))
    }

    /// The leaf value, `None` for containers
    pub fn value(&self) -> Option<&TypedValue> {
        match &self.content {
            Content::Leaf(v) => Some(v),
            Content::Children(_) => None,
        }
    }

    /// Re-parse the leaf value from text; the old value survives a failure
    pub fn set_value(&mut self, text: &str) -> Result<()> {
        match &mut self.content {
            Content::Leaf(v) => v.set_value(text),
            Content::Children(_) => Err(NetconfError::InvalidState(format!(
                "'{}' is not a leaf",
                self.qname
            ))),
        }
    }

    /// Replace the content with a typed value; fails if children exist
    pub fn set_typed_value(&mut self, value: TypedValue) -> Result<()> {
        if let Content::Children(children) = &self.content
            && !children.is_empty()
        {
            return Err(NetconfError::InvalidState(format!(
                "'{}' has children and cannot hold a value",
                self.qname
            )));
        }
        self.content = Content::Leaf(value);
        Ok(())
    }

    /// Child elements in document order; empty for leaves
    pub fn children(&self) -> &[Element] {
        match &self.content {
            Content::Children(c) => c,
            Content::Leaf(_) => &[],
        }
    }

    fn children_vec_mut(&mut self) -> Result<&mut Vec<Element>> {
        match &mut self.content {
            Content::Children(c) => Ok(c),
            Content::Leaf(_) => Err(NetconfError::InvalidState(format!(
                "'{}' is a leaf and cannot have children",
                self.qname
            ))),
        }
    }

    /// Append a child, taking ownership of it
    pub fn push_child(&mut self, child: Element) -> Result<&mut Element> {
        let children = self.children_vec_mut()?;
        children.push(child);
        let last = children.len() - 1;
        Ok(&mut children[last])
    }

    /// Insert a child at `index`
    pub fn insert_child(&mut self, index: usize, child: Element) -> Result<()> {
        let children = self.children_vec_mut()?;
        if index > children.len() {
            return Err(NetconfError::InvalidState(format!(
                "index {index} out of bounds for '{}'",
                self.qname
            )));
        }
        children.insert(index, child);
        Ok(())
    }

    /// Detach and return the child at `index`
    pub fn remove_child(&mut self, index: usize) -> Option<Element> {
        match &mut self.content {
            Content::Children(c) if index < c.len() => Some(c.remove(index)),
            _ => None,
        }
    }

    /// Detach all children, leaving an empty container
    pub fn take_children(&mut self) -> Vec<Element> {
        match &mut self.content {
            Content::Children(c) => std::mem::take(c),
            Content::Leaf(_) => Vec::new(),
        }
    }

    /// First child with the given qualified name
    pub fn find(&self, namespace: &str, name: &str) -> Option<&Element> {
        self.children().iter().find(|c| c.qname.matches(namespace, name))
    }

    pub fn find_mut(&mut self, namespace: &str, name: &str) -> Option<&mut Element> {
        match &mut self.content {
            Content::Children(c) => c.iter_mut().find(|c| c.qname.matches(namespace, name)),
            Content::Leaf(_) => None,
        }
    }

    /// All children with the given qualified name
    pub fn find_all<'a>(&'a self, namespace: &'a str, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children()
            .iter()
            .filter(move |c| c.qname.matches(namespace, name))
    }

    /// First child with the given local name in any namespace
    pub fn find_local(&self, name: &str) -> Option<&Element> {
        self.children().iter().find(|c| c.qname.name == name)
    }

    /// Value of the leaf child with the given qualified name
    pub fn leaf_value(&self, namespace: &str, name: &str) -> Option<&TypedValue> {
        self.find(namespace, name).and_then(Element::value)
    }

    /// Count all elements in the subtree, including this one
    pub fn descendant_count(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(Element::descendant_count)
            .sum::<usize>()
    }

    /// Get the element addressed by `path`, relative to this element's children
    pub fn find_path(&self, path: &InstancePath) -> Option<&Element> {
        let mut current = self;
        for step in &path.steps {
            current = select(current.children(), step)?;
        }
        Some(current)
    }

    /// Set a leaf at `path`, creating intermediate containers and list
    /// entries (with their key leaves) as needed
    pub fn set_leaf_at(&mut self, path: &InstancePath, value: TypedValue) -> Result<()> {
        let Some((last, parents)) = path.steps.split_last() else {
            return Err(NetconfError::InvalidState("cannot set a value at the root".into()));
        };

        let mut current = self;
        for step in parents {
            let index = match select_index(current.children(), step) {
                Some(i) => i,
                None => {
                    if step.position.is_some() {
                        return Err(NetconfError::InvalidState(format!(
                            "no entry at position for '{}'",
                            step.qname
                        )));
                    }
                    let mut entry = Element::new(step.qname.clone());
                    for (key, key_value) in &step.keys {
                        entry.push_child(Element::text_leaf(
                            &step.qname.namespace,
                            key,
                            key_value.clone(),
                        ))?;
                    }
                    current.push_child(entry)?;
                    current.children().len() - 1
                }
            };
            current = &mut current.children_vec_mut()?[index];
        }

        match select_index(current.children(), last) {
            Some(i) => current.children_vec_mut()?[i].set_typed_value(value),
            None => {
                current.push_child(Element::leaf(&last.qname.namespace, &last.qname.name, value))?;
                Ok(())
            }
        }
    }

    /// Detach and return the element addressed by `path`
    pub fn remove_path(&mut self, path: &InstancePath) -> Option<Element> {
        let (last, parents) = path.steps.split_last()?;
        let mut current = self;
        for step in parents {
            let index = select_index(current.children(), step)?;
            current = match &mut current.content {
                Content::Children(c) => &mut c[index],
                Content::Leaf(_) => return None,
            };
        }
        let index = select_index(current.children(), last)?;
        current.remove_child(index)
    }

    /// Bind this element, as a top-level data node, to the schema
    pub fn bind(&mut self, registry: &SchemaRegistry) -> Result<()> {
        self.bind_under(registry, &TagPath::new())
    }

    /// Bind this element as a child of the schema node at `parent`, e.g.
    /// the output of an rpc
    pub fn bind_under(&mut self, registry: &SchemaRegistry, parent: &TagPath) -> Result<()> {
        let mut path = parent.clone();
        bind_at(self, registry, &mut path)
    }

    /// Bind each child as a top-level data node, for envelopes such as
    /// `<data>` or `<config>`
    pub fn bind_children(&mut self, registry: &SchemaRegistry) -> Result<()> {
        if let Content::Children(children) = &mut self.content {
            for child in children {
                child.bind(registry)?;
            }
        }
        Ok(())
    }

    /// Check list keys, cardinality and leaf restrictions of this subtree,
    /// treating this element as a top-level data node
    pub fn validate(&self, registry: &SchemaRegistry) -> Result<()> {
        let mut path = TagPath::new();
        validate_at(self, registry, &mut path)
    }

    /// Key values of a list entry in key declaration order
    pub fn list_keys<'a>(&'a self, node: &'a SchemaNode) -> Vec<(&'a str, &'a TypedValue)> {
        node.keys
            .iter()
            .filter_map(|k| {
                self.children()
                    .iter()
                    .find(|c| c.qname.name == *k && c.qname.namespace == self.qname.namespace)
                    .and_then(Element::value)
                    .map(|v| (k.as_str(), v))
            })
            .collect()
    }
}

/// Tree equality: same names, same ordered children, equal leaf values.
/// Attributes, prefixes and namespace declarations are not compared.
impl PartialEq for Element {
    fn eq(&self, other: &Self) -> bool {
        if self.qname != other.qname {
            return false;
        }
        match (&self.content, &other.content) {
            (Content::Leaf(a), Content::Leaf(b)) => a == b,
            (Content::Children(a), Content::Children(b)) => a == b,
            _ => false,
        }
    }
}

fn entry_matches(element: &Element, step: &PathStep) -> bool {
    element.qname == step.qname
        && step.keys.iter().all(|(key, expected)| {
            if key == "." {
                return element
                    .value()
                    .is_some_and(|v| v.original() == expected || v.to_canonical_string() == *expected);
            }
            element
                .find(&step.qname.namespace, key)
                .and_then(Element::value)
                .is_some_and(|v| v.original() == expected || v.to_canonical_string() == *expected)
        })
}

fn select_index(children: &[Element], step: &PathStep) -> Option<usize> {
    let mut matches = children
        .iter()
        .enumerate()
        .filter(|(_, c)| entry_matches(c, step))
        .map(|(i, _)| i);
    match step.position {
        // positions count from 1
        Some(pos) => pos.checked_sub(1).and_then(|i| matches.nth(i)),
        None => matches.next(),
    }
}

fn select<'a>(children: &'a [Element], step: &PathStep) -> Option<&'a Element> {
    select_index(children, step).map(|i| &children[i])
}

fn with_path(err: NetconfError, path: &TagPath) -> NetconfError {
    match err {
        NetconfError::InvalidValue(m) => NetconfError::InvalidValue(format!("{path}: {m}")),
        NetconfError::RestrictionViolation(m) => {
            NetconfError::RestrictionViolation(format!("{path}: {m}"))
        }
        other => other,
    }
}

fn bind_at(element: &mut Element, registry: &SchemaRegistry, path: &mut TagPath) -> Result<()> {
    path.push(element.qname.clone());
    let node = registry.resolve(path.as_slice()).cloned();

    let result = match node {
        Some(node) if node.kind.is_leafy() => bind_leaf(element, &node, path),
        Some(_) => {
            if let Content::Leaf(v) = &element.content {
                if !v.original().trim().is_empty() {
                    let err = NetconfError::InvalidValue(format!(
                        "{path}: container carries text '{}'",
                        v.original()
                    ));
                    path.pop();
                    return Err(err);
                }
                element.content = Content::Children(Vec::new());
            }
            bind_children_at(element, registry, path)
        }
        None => bind_children_at(element, registry, path),
    };
    path.pop();
    result
}

fn bind_children_at(element: &mut Element, registry: &SchemaRegistry, path: &mut TagPath) -> Result<()> {
    if let Content::Children(children) = &mut element.content {
        for child in children {
            bind_at(child, registry, path)?;
        }
    }
    Ok(())
}

fn bind_leaf(element: &mut Element, node: &SchemaNode, path: &TagPath) -> Result<()> {
    let Some(spec) = &node.type_spec else {
        return Ok(());
    };
    let typed = match &element.content {
        Content::Leaf(v) if Arc::ptr_eq(v.spec(), spec) => return Ok(()),
        Content::Leaf(v) => v.retype(Arc::clone(spec)),
        Content::Children(c) if c.is_empty() => TypedValue::parse(Arc::clone(spec), ""),
        Content::Children(_) => {
            return Err(NetconfError::InvalidValue(format!("{path}: leaf has child elements")));
        }
    };
    element.content = Content::Leaf(typed.map_err(|e| with_path(e, path))?);
    Ok(())
}

fn validate_at(element: &Element, registry: &SchemaRegistry, path: &mut TagPath) -> Result<()> {
    path.push(element.qname.clone());
    let result = validate_node(element, registry, path);
    path.pop();
    result
}

fn validate_node(element: &Element, registry: &SchemaRegistry, path: &mut TagPath) -> Result<()> {
    if let Some(value) = element.value() {
        value.check().map_err(|e| with_path(e, path))?;
    }

    if let Some(node) = registry.resolve(path.as_slice()) {
        if node.kind == NodeKind::List {
            for key in &node.keys {
                let count = element
                    .children()
                    .iter()
                    .filter(|c| c.qname.name == *key && c.qname.namespace == element.qname.namespace)
                    .count();
                if count != 1 {
                    return Err(NetconfError::InvalidValue(format!(
                        "{path}: list entry must carry exactly one '{key}' key leaf"
                    )));
                }
            }
        }
        for child_name in &node.children {
            let mut child_path = path.clone();
            child_path.push(child_name.clone());
            let Some(child_node) = registry.resolve(child_path.as_slice()) else {
                continue;
            };
            let count = element
                .children()
                .iter()
                .filter(|c| c.qname == *child_name)
                .count();
            if let Some(max) = child_node.max_occurs
                && count > max as usize
            {
                return Err(NetconfError::RestrictionViolation(format!(
                    "{child_path}: {count} instances exceed the maximum of {max}"
                )));
            }
        }
    }

    for child in element.children() {
        validate_at(child, registry, path)?;
    }
    Ok(())
}
