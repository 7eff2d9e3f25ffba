//! Schema descriptors and the schema registry
//!
//! A schema descriptor is a pre-built JSON document describing one YANG
//! module: its namespace, prefix, and the tag-paths of its data nodes with
//! their kinds, types and list keys. Descriptors are loaded once into a
//! [`SchemaRegistry`], which is append-only and read-only once shared.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{NetconfError, Result};
use crate::path::{InstancePath, QName, TagPath};
use crate::types::TypeSpec;

/// YANG node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Container,
    List,
    Leaf,
    LeafList,
    Rpc,
    Input,
    Output,
    Notification,
}

impl NodeKind {
    /// True for kinds that carry a typed value
    pub fn is_leafy(self) -> bool {
        matches!(self, NodeKind::Leaf | NodeKind::LeafList)
    }

    /// True for kinds whose instances may repeat
    pub fn is_multi(self) -> bool {
        matches!(self, NodeKind::List | NodeKind::LeafList)
    }
}

/// A schema node resolved from a descriptor
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Tag-path from the root
    pub path: TagPath,
    pub kind: NodeKind,
    /// Value type, present for leaf and leaf-list nodes
    pub type_spec: Option<Arc<TypeSpec>>,
    pub min_occurs: u32,
    /// `None` means unbounded
    pub max_occurs: Option<u32>,
    /// Key leaf names, in declaration order, for list nodes
    pub keys: Vec<String>,
    /// Direct children in registration order
    pub children: Vec<QName>,
    /// False for state (config false) nodes
    pub config: bool,
    /// Name of the module that defines the node
    pub module: String,
}

impl SchemaNode {
    /// The node's own qualified name
    pub fn qname(&self) -> Option<&QName> {
        self.path.last()
    }

    /// Check whether a key leaf is declared for this list
    pub fn is_key(&self, name: &str) -> bool {
        self.keys.iter().any(|k| k == name)
    }
}

/// Module metadata from a registered descriptor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub name: String,
    pub namespace: String,
    pub prefix: String,
    pub revision: Option<String>,
}

impl ModuleInfo {
    /// Module capability URI as advertised in a NETCONF hello
    pub fn capability(&self) -> String {
        match &self.revision {
            Some(rev) => format!("{}?module={}&revision={}", self.namespace, self.name, rev),
            None => format!("{}?module={}", self.namespace, self.name),
        }
    }
}

/// Raw descriptor structure for deserialization
#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawDescriptor {
    module_name: String,
    namespace: String,
    prefix: String,
    #[serde(default)]
    revision: Option<String>,
    /// prefix -> namespace of modules this one augments or references
    #[serde(default)]
    imports: HashMap<String, String>,
    #[serde(alias = "items")]
    nodes: Vec<RawNode>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawNode {
    path: String,
    kind: NodeKind,
    #[serde(rename = "type")]
    node_type: Option<Value>,
    #[serde(default)]
    keys: Vec<String>,
    min_elements: Option<u32>,
    max_elements: Option<u32>,
    #[serde(default = "default_config")]
    config: bool,
}

fn default_config() -> bool {
    true
}

/// Registry of schema nodes keyed by tag-path
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    modules: HashMap<String, ModuleInfo>,
    prefixes: HashMap<String, String>,
    nodes: HashMap<TagPath, Arc<SchemaNode>>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the descriptor for `namespace`.
    ///
    /// Fails if the descriptor is malformed, declares a different namespace,
    /// or the namespace is already registered. On failure nothing is inserted.
    pub fn register(&mut self, namespace: &str, source: &str) -> Result<()> {
        let raw: RawDescriptor = serde_json::from_str(source)
            .map_err(|e| NetconfError::SchemaLoad(format!("invalid descriptor: {e}")))?;
        if raw.namespace != namespace {
            return Err(NetconfError::SchemaLoad(format!(
                "descriptor declares namespace '{}', expected '{namespace}'",
                raw.namespace
            )));
        }
        self.insert(raw)
    }

    /// Register a descriptor file; the namespace is taken from the file
    pub fn register_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let content = fs::read_to_string(path.as_ref())?;
        let raw: RawDescriptor = serde_json::from_str(&content)
            .map_err(|e| NetconfError::SchemaLoad(format!("invalid descriptor: {e}")))?;
        self.insert(raw)
    }

    fn insert(&mut self, raw: RawDescriptor) -> Result<()> {
        if self.modules.contains_key(&raw.namespace) {
            return Err(NetconfError::SchemaLoad(format!(
                "namespace '{}' is already registered",
                raw.namespace
            )));
        }
        if let Some(existing) = self.prefixes.get(&raw.prefix) {
            return Err(NetconfError::SchemaLoad(format!(
                "prefix '{}' is already bound to '{existing}'",
                raw.prefix
            )));
        }

        let own_prefix = raw.prefix.clone();
        let own_namespace = raw.namespace.clone();
        let resolve = |p: &str| {
            if p == own_prefix {
                Some(own_namespace.clone())
            } else {
                raw.imports.get(p).cloned()
            }
        };

        // Staged nodes; committed only once the whole descriptor is valid
        let mut staged: HashMap<TagPath, SchemaNode> = HashMap::with_capacity(raw.nodes.len());
        let mut order: Vec<TagPath> = Vec::with_capacity(raw.nodes.len());

        for node in &raw.nodes {
            let instance = InstancePath::parse(&node.path, &raw.namespace, &resolve)
                .map_err(|e| NetconfError::SchemaLoad(format!("{}: {e}", node.path)))?;
            if instance.is_empty() || instance.steps.iter().any(|s| !s.keys.is_empty() || s.position.is_some()) {
                return Err(NetconfError::SchemaLoad(format!(
                    "'{}' is not a schema path",
                    node.path
                )));
            }
            let path = instance.tag_path();
            if staged.contains_key(&path) || self.nodes.contains_key(&path) {
                return Err(NetconfError::SchemaLoad(format!("duplicate node '{}'", node.path)));
            }

            let type_spec = match (node.kind.is_leafy(), &node.node_type) {
                (true, Some(t)) => Some(Arc::new(
                    TypeSpec::from_descriptor(t)
                        .map_err(|e| NetconfError::SchemaLoad(format!("{}: {e}", node.path)))?,
                )),
                (true, None) => {
                    return Err(NetconfError::SchemaLoad(format!("{} has no type", node.path)));
                }
                (false, Some(_)) => {
                    return Err(NetconfError::SchemaLoad(format!(
                        "{} is not a leaf but declares a type",
                        node.path
                    )));
                }
                (false, None) => None,
            };
            if !node.keys.is_empty() && node.kind != NodeKind::List {
                return Err(NetconfError::SchemaLoad(format!(
                    "{} declares keys but is not a list",
                    node.path
                )));
            }

            let (min_occurs, max_occurs) = if node.kind.is_multi() {
                (node.min_elements.unwrap_or(0), node.max_elements)
            } else {
                (0, Some(1))
            };
            if matches!(max_occurs, Some(max) if max < min_occurs) {
                return Err(NetconfError::SchemaLoad(format!(
                    "{}: max-elements below min-elements",
                    node.path
                )));
            }

            staged.insert(
                path.clone(),
                SchemaNode {
                    path: path.clone(),
                    kind: node.kind,
                    type_spec,
                    min_occurs,
                    max_occurs,
                    keys: node.keys.clone(),
                    children: Vec::new(),
                    config: node.config,
                    module: raw.module_name.clone(),
                },
            );
            order.push(path);
        }

        // Link children to parents, staging copies of already registered parents
        for path in &order {
            let Some(parent) = path.parent() else {
                continue;
            };
            if parent.is_empty() {
                continue;
            }
            let Some(child) = path.last().cloned() else {
                continue;
            };
            if !staged.contains_key(&parent) {
                let existing = self.nodes.get(&parent).ok_or_else(|| {
                    NetconfError::SchemaLoad(format!("parent of '{path}' is not defined"))
                })?;
                staged.insert(parent.clone(), SchemaNode::clone(existing));
            }
            if let Some(parent_node) = staged.get_mut(&parent) {
                if parent_node.kind.is_leafy() {
                    return Err(NetconfError::SchemaLoad(format!("'{parent}' is a leaf and cannot have children")));
                }
                parent_node.children.push(child);
            }
        }

        for path in &order {
            let Some(node) = staged.get(path) else {
                continue;
            };
            for key in &node.keys {
                let has_leaf = node.children.iter().any(|c| {
                    let mut key_path = path.clone();
                    key_path.push(c.clone());
                    c.name == *key
                        && staged
                            .get(&key_path)
                            .is_some_and(|n| n.kind == NodeKind::Leaf)
                });
                if !has_leaf {
                    return Err(NetconfError::SchemaLoad(format!(
                        "list '{path}' names key '{key}' which is not a child leaf"
                    )));
                }
            }
        }

        tracing::debug!(
            module = %raw.module_name,
            namespace = %raw.namespace,
            nodes = order.len(),
            "registered schema descriptor"
        );

        for (path, node) in staged {
            self.nodes.insert(path, Arc::new(node));
        }
        self.prefixes.insert(raw.prefix.clone(), raw.namespace.clone());
        self.modules.insert(
            raw.namespace.clone(),
            ModuleInfo {
                name: raw.module_name,
                namespace: raw.namespace,
                prefix: raw.prefix,
                revision: raw.revision,
            },
        );
        Ok(())
    }

    /// Look up the schema node for a tag-path
    pub fn resolve(&self, tag_path: &[QName]) -> Option<&Arc<SchemaNode>> {
        self.nodes.get(tag_path)
    }

    /// Module metadata for a namespace
    pub fn module(&self, namespace: &str) -> Option<&ModuleInfo> {
        self.modules.get(namespace)
    }

    /// Registered modules, in no particular order
    pub fn modules(&self) -> impl Iterator<Item = &ModuleInfo> {
        self.modules.values()
    }

    pub fn namespace_for_prefix(&self, prefix: &str) -> Option<&str> {
        self.prefixes.get(prefix).map(String::as_str)
    }

    pub fn prefix_for_namespace(&self, namespace: &str) -> Option<&str> {
        self.modules.get(namespace).map(|m| m.prefix.as_str())
    }

    /// Module capability URIs for the client hello, sorted
    pub fn capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = self.modules.values().map(ModuleInfo::capability).collect();
        caps.sort();
        caps
    }

    /// Parse an instance identifier using registered prefixes
    pub fn parse_path(&self, path: &str) -> Result<InstancePath> {
        InstancePath::parse(path, "", &|p| self.namespace_for_prefix(p).map(str::to_string))
    }

    /// Number of registered schema nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
