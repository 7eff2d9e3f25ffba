//! Qualified names, schema tag-paths and instance identifiers
//!
//! A [`TagPath`] names a schema node: the ordered sequence of namespaced tags
//! from the root. An [`InstancePath`] names a data node and may additionally
//! select list entries with key predicates, as in
//! `/if:interfaces/if:interface[if:name='eth0']/if:mtu`.

use std::borrow::Borrow;
use std::fmt;

use crate::error::{NetconfError, Result};

/// A namespace-qualified tag name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QName {
    /// Namespace URI, empty for unqualified names
    pub namespace: String,
    /// Local tag name
    pub name: String,
}

impl QName {
    /// Create a new qualified name
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a name without a namespace
    pub fn unqualified(name: impl Into<String>) -> Self {
        Self::new(String::new(), name)
    }

    /// Pairwise exact match on namespace and local name
    pub fn matches(&self, namespace: &str, name: &str) -> bool {
        self.namespace == namespace && self.name == name
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.name)
        }
    }
}

/// Ordered sequence of qualified tags identifying a schema node
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagPath(Vec<QName>);

impl TagPath {
    /// Create an empty (root) path
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tag
    pub fn push(&mut self, qname: QName) {
        self.0.push(qname);
    }

    /// Remove the last tag
    pub fn pop(&mut self) -> Option<QName> {
        self.0.pop()
    }

    /// Path of the parent node, `None` at the root
    pub fn parent(&self) -> Option<TagPath> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// The last tag of the path
    pub fn last(&self) -> Option<&QName> {
        self.0.last()
    }

    /// Number of tags
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root path
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The tags as a slice
    pub fn as_slice(&self) -> &[QName] {
        &self.0
    }
}

impl Borrow<[QName]> for TagPath {
    fn borrow(&self) -> &[QName] {
        &self.0
    }
}

impl From<Vec<QName>> for TagPath {
    fn from(tags: Vec<QName>) -> Self {
        Self(tags)
    }
}

impl FromIterator<QName> for TagPath {
    fn from_iter<I: IntoIterator<Item = QName>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for tag in &self.0 {
            write!(f, "/{}", tag)?;
        }
        Ok(())
    }
}

/// One step of an instance identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathStep {
    /// The node name at this step
    pub qname: QName,
    /// Key predicates `[name='value']`; `.` selects a leaf-list value
    pub keys: Vec<(String, String)>,
    /// Positional predicate `[n]`, 1-based
    pub position: Option<usize>,
}

impl PathStep {
    /// A step without predicates
    pub fn new(qname: QName) -> Self {
        Self {
            qname,
            keys: Vec::new(),
            position: None,
        }
    }

    /// Add a key predicate
    pub fn with_key(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.keys.push((name.into(), value.into()));
        self
    }
}

/// An instance identifier: a tag path plus list-entry predicates
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstancePath {
    /// The steps from the root
    pub steps: Vec<PathStep>,
}

impl InstancePath {
    /// Create an empty instance path
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an absolute instance identifier.
    ///
    /// Unprefixed names inherit the namespace of the preceding step, starting
    /// from `default_namespace`. Prefixes are mapped to namespaces by
    /// `resolve_prefix`.
    pub fn parse(
        path: &str,
        default_namespace: &str,
        resolve_prefix: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let path = path.trim();
        let mut rest = path
            .strip_prefix('/')
            .ok_or_else(|| NetconfError::Parse(format!("instance path must be absolute: {path}")))?;

        let mut steps = Vec::new();
        let mut namespace = default_namespace.to_string();

        while !rest.is_empty() {
            let end = rest
                .find(|c| c == '/' || c == '[')
                .unwrap_or(rest.len());
            let qname = resolve_name(&rest[..end], &namespace, resolve_prefix)?;
            namespace.clone_from(&qname.namespace);
            rest = &rest[end..];

            let mut step = PathStep::new(qname);
            while rest.starts_with('[') {
                let close = predicate_end(rest).ok_or_else(|| {
                    NetconfError::Parse(format!("unterminated predicate in {path}"))
                })?;
                parse_predicate(&rest[1..close], &mut step)?;
                rest = &rest[close + 1..];
            }
            steps.push(step);

            if let Some(next) = rest.strip_prefix('/') {
                if next.is_empty() {
                    return Err(NetconfError::Parse(format!("trailing '/' in {path}")));
                }
                rest = next;
            } else if !rest.is_empty() {
                return Err(NetconfError::Parse(format!("unexpected '{rest}' in {path}")));
            }
        }

        Ok(Self { steps })
    }

    /// Append a step
    pub fn push(&mut self, step: PathStep) {
        self.steps.push(step);
    }

    /// Check if this path is empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Get the number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// The schema tag-path with predicates stripped
    pub fn tag_path(&self) -> TagPath {
        self.steps.iter().map(|s| s.qname.clone()).collect()
    }

    /// Render with prefixes; a prefix is written wherever the namespace changes
    pub fn to_string_with(&self, prefix_of: &dyn Fn(&str) -> Option<String>) -> String {
        let mut out = String::new();
        let mut namespace = "";
        for step in &self.steps {
            out.push('/');
            let prefix = if step.qname.namespace != namespace {
                prefix_of(&step.qname.namespace)
            } else {
                None
            };
            if let Some(p) = &prefix {
                out.push_str(p);
                out.push(':');
            }
            out.push_str(&step.qname.name);
            for (key, value) in &step.keys {
                let quote = if value.contains('\'') { '"' } else { '\'' };
                out.push_str(&format!("[{key}={quote}{value}{quote}]"));
            }
            if let Some(pos) = step.position {
                out.push_str(&format!("[{pos}]"));
            }
            namespace = &step.qname.namespace;
        }
        if out.is_empty() {
            out.push('/');
        }
        out
    }
}

fn resolve_name(
    raw: &str,
    inherited: &str,
    resolve_prefix: &dyn Fn(&str) -> Option<String>,
) -> Result<QName> {
    let raw = raw.trim();
    let (namespace, name) = match raw.split_once(':') {
        Some((prefix, name)) => {
            let ns = resolve_prefix(prefix)
                .ok_or_else(|| NetconfError::Parse(format!("unknown prefix '{prefix}'")))?;
            (ns, name)
        }
        None => (inherited.to_string(), raw),
    };
    if name.is_empty() {
        return Err(NetconfError::Parse("empty node name in path".into()));
    }
    Ok(QName::new(namespace, name))
}

/// Index of the `]` closing the predicate at the start of `s`, skipping quoted text
fn predicate_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            (None, _) => {}
        }
    }
    None
}

fn parse_predicate(body: &str, step: &mut PathStep) -> Result<()> {
    let body = body.trim();
    match body.split_once('=') {
        Some((key, value)) => {
            let key = key.trim();
            let key = key.rsplit(':').next().unwrap_or(key);
            let value = value.trim();
            let unquoted = value
                .strip_prefix('\'')
                .and_then(|v| v.strip_suffix('\''))
                .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                .ok_or_else(|| {
                    NetconfError::Parse(format!("predicate value must be quoted: {body}"))
                })?;
            step.keys.push((key.to_string(), unquoted.to_string()));
        }
        None => {
            let position: usize = body
                .parse()
                .map_err(|_| NetconfError::Parse(format!("invalid predicate: [{body}]")))?;
            if position == 0 {
                return Err(NetconfError::Parse("positions are 1-based".into()));
            }
            step.position = Some(position);
        }
    }
    Ok(())
}
