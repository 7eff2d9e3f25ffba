//! JSON encoding of element trees
//!
//! Member names follow the YANG JSON convention: a name is qualified as
//! `module:name` wherever its namespace differs from the parent's. Without
//! a registry the namespace URI itself is the qualifier, and reading splits
//! the qualifier off at the last `:`. Repeated siblings become arrays,
//! 64-bit integers and decimal64 are written as strings, and `empty` leaves
//! are `[null]`. Attributes go in an `"@"` member (containers) or an
//! `"@name"` sibling member (leaves).

use serde_json::{Map, Value as JsonValue};

use crate::element::{Attribute, Content, Element};
use crate::error::{NetconfError, Result};
use crate::path::{QName, TagPath};
use crate::schema::SchemaRegistry;
use crate::types::{TypedValue, Value};

impl Element {
    /// Serialize to JSON, using namespace URIs as qualifiers
    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json_value(None))?)
    }

    /// Serialize to JSON, using module names from `registry` as qualifiers
    /// and list/leaf-list kinds to decide arrays
    pub fn to_json_string_with(&self, registry: &SchemaRegistry) -> Result<String> {
        Ok(serde_json::to_string(&self.to_json_value(Some(registry)))?)
    }

    /// The JSON object `{"qualifier:name": ...}` for this element
    pub fn to_json_value(&self, registry: Option<&SchemaRegistry>) -> JsonValue {
        let mut path = TagPath::new();
        let mut object = Map::new();
        write_member(&mut object, &[self], "", registry, &mut path);
        JsonValue::Object(object)
    }

    /// Parse a JSON document with a single top-level member. With a
    /// registry, module-name qualifiers are resolved and the tree is bound.
    pub fn from_json_str(text: &str, registry: Option<&SchemaRegistry>) -> Result<Element> {
        let json: JsonValue = serde_json::from_str(text)?;
        let JsonValue::Object(object) = json else {
            return Err(NetconfError::Parse("JSON document must be an object".into()));
        };

        let mut holder = Element::new(QName::unqualified(""));
        read_members(&mut holder, &object, registry)?;
        let mut members = holder.take_children();
        if members.len() != 1 {
            return Err(NetconfError::Parse(format!(
                "expected one top-level member, found {}",
                members.len()
            )));
        }
        let mut root = members.remove(0);
        if let Some(registry) = registry {
            root.bind(registry)?;
        }
        Ok(root)
    }
}

fn qualifier(namespace: &str, registry: Option<&SchemaRegistry>) -> String {
    registry
        .and_then(|r| r.module(namespace))
        .map(|m| m.name.clone())
        .unwrap_or_else(|| namespace.to_string())
}

fn member_name(qname: &QName, parent_namespace: &str, registry: Option<&SchemaRegistry>) -> String {
    if qname.namespace.is_empty() || qname.namespace == parent_namespace {
        qname.name.clone()
    } else {
        format!("{}:{}", qualifier(&qname.namespace, registry), qname.name)
    }
}

fn leaf_json(value: &TypedValue) -> JsonValue {
    match value.value() {
        Value::Boolean(b) => JsonValue::Bool(*b),
        Value::Int8(n) => (*n).into(),
        Value::Int16(n) => (*n).into(),
        Value::Int32(n) => (*n).into(),
        Value::Uint8(n) => (*n).into(),
        Value::Uint16(n) => (*n).into(),
        Value::Uint32(n) => (*n).into(),
        Value::Empty => JsonValue::Array(vec![JsonValue::Null]),
        _ => JsonValue::String(value.to_canonical_string()),
    }
}

fn attributes_json(attributes: &[Attribute], namespace: &str, registry: Option<&SchemaRegistry>) -> JsonValue {
    let object = attributes
        .iter()
        .map(|a| (member_name(&a.qname, namespace, registry), JsonValue::String(a.value.clone())))
        .collect();
    JsonValue::Object(object)
}

/// Write every element of `group` (all sharing one name) into `object`
fn write_member(
    object: &mut Map<String, JsonValue>,
    group: &[&Element],
    parent_namespace: &str,
    registry: Option<&SchemaRegistry>,
    path: &mut TagPath,
) {
    let Some(first) = group.first() else {
        return;
    };
    let name = member_name(first.qname(), parent_namespace, registry);
    path.push(first.qname().clone());

    let multi = registry
        .and_then(|r| r.resolve(path.as_slice()))
        .is_some_and(|node| node.kind.is_multi());

    let values: Vec<JsonValue> = group
        .iter()
        .map(|element| element_json(element, registry, path))
        .collect();

    if !multi
        && let [single] = group
        && single.is_leaf()
        && !single.attributes().is_empty()
    {
        object.insert(
            format!("@{name}"),
            attributes_json(single.attributes(), single.namespace(), registry),
        );
    }

    let value = if values.len() == 1 && !multi {
        values.into_iter().next().unwrap_or(JsonValue::Null)
    } else {
        JsonValue::Array(values)
    };
    object.insert(name, value);
    path.pop();
}

fn element_json(element: &Element, registry: Option<&SchemaRegistry>, path: &mut TagPath) -> JsonValue {
    match element.content() {
        Content::Leaf(value) => leaf_json(value),
        Content::Children(children) => {
            let mut object = Map::new();
            if !element.attributes().is_empty() {
                object.insert(
                    "@".to_string(),
                    attributes_json(element.attributes(), element.namespace(), registry),
                );
            }

            // group siblings by name, keeping first-occurrence order
            let mut groups: Vec<(&QName, Vec<&Element>)> = Vec::new();
            for child in children {
                match groups.iter_mut().find(|(q, _)| *q == child.qname()) {
                    Some((_, members)) => members.push(child),
                    None => groups.push((child.qname(), vec![child])),
                }
            }
            for (_, members) in &groups {
                write_member(&mut object, members, element.namespace(), registry, path);
            }
            JsonValue::Object(object)
        }
    }
}

fn resolve_qualifier(qualifier: &str, registry: Option<&SchemaRegistry>) -> String {
    registry
        .and_then(|r| r.modules().find(|m| m.name == qualifier))
        .map(|m| m.namespace.clone())
        .unwrap_or_else(|| qualifier.to_string())
}

fn split_member(key: &str, parent_namespace: &str, registry: Option<&SchemaRegistry>) -> QName {
    match key.rsplit_once(':') {
        Some((qualifier, name)) => QName::new(resolve_qualifier(qualifier, registry), name),
        None => QName::new(parent_namespace, key),
    }
}

fn scalar_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn read_value(qname: &QName, value: &JsonValue, registry: Option<&SchemaRegistry>) -> Result<Element> {
    let mut element = Element::new(qname.clone());
    match value {
        JsonValue::Object(members) => read_members(&mut element, members, registry)?,
        JsonValue::Null => {}
        JsonValue::Array(items) if matches!(items.as_slice(), [JsonValue::Null]) => {}
        JsonValue::Array(_) => {
            return Err(NetconfError::Parse(format!("nested array under '{qname}'")));
        }
        scalar => {
            let text = scalar_text(scalar).unwrap_or_default();
            element.set_typed_value(TypedValue::untyped(text))?;
        }
    }
    Ok(element)
}

fn read_attributes(element: &mut Element, value: &JsonValue, registry: Option<&SchemaRegistry>) -> Result<()> {
    let JsonValue::Object(attrs) = value else {
        return Err(NetconfError::Parse("attribute member must be an object".into()));
    };
    for (key, value) in attrs {
        let text = scalar_text(value)
            .ok_or_else(|| NetconfError::Parse(format!("attribute '{key}' must be a scalar")))?;
        let qname = match key.rsplit_once(':') {
            Some((qualifier, name)) => QName::new(resolve_qualifier(qualifier, registry), name),
            None => QName::unqualified(key.as_str()),
        };
        element.set_attribute(qname, text);
    }
    Ok(())
}

fn read_members(parent: &mut Element, members: &Map<String, JsonValue>, registry: Option<&SchemaRegistry>) -> Result<()> {
    let namespace = parent.namespace().to_string();
    let mut leaf_attributes: Vec<(&str, &JsonValue)> = Vec::new();

    for (key, value) in members {
        if key == "@" {
            read_attributes(parent, value, registry)?;
            continue;
        }
        if let Some(target) = key.strip_prefix('@') {
            leaf_attributes.push((target, value));
            continue;
        }

        let qname = split_member(key, &namespace, registry);
        match value {
            JsonValue::Array(items) if !matches!(items.as_slice(), [JsonValue::Null]) => {
                for item in items {
                    parent.push_child(read_value(&qname, item, registry)?)?;
                }
            }
            _ => {
                parent.push_child(read_value(&qname, value, registry)?)?;
            }
        }
    }

    for (target, value) in leaf_attributes {
        let qname = split_member(target, &namespace, registry);
        let element = parent
            .find_mut(&qname.namespace, &qname.name)
            .ok_or_else(|| NetconfError::Parse(format!("attributes for missing member '{target}'")))?;
        read_attributes(element, value, registry)?;
    }
    Ok(())
}
