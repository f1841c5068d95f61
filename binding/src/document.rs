//! # Document Tree
//!
//! In-memory YAML tree with per-node comments.
//!
//! Nodes are addressed by [`NodePath`]. A node is *virtual* while nothing is
//! stored at its path; writing to it materializes every missing ancestor.

use crate::coercion::{self, Bindable};
use crate::path::NodePath;
use errors::{CoercionError, DocumentError};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use tracing::warn;

/// Root mapping of a configuration file plus the comments attached to its
/// nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    root: Mapping,
    comments: BTreeMap<NodePath, String>,
    header: Option<String>
}

/// Read handle on one node of a [`Document`].
#[derive(Debug, Clone, Copy)]
pub struct Node<'a> {
    path: &'a NodePath,
    value: Option<&'a Value>,
    comment: Option<&'a str>
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_root(root: Mapping) -> Self {
        Self {
            root,
            comments: BTreeMap::new(),
            header: None
        }
    }

    pub fn root(&self) -> &Mapping {
        &self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn comments(&self) -> &BTreeMap<NodePath, String> {
        &self.comments
    }

    /// Comment block at the top of the file, `#` markers included.
    ///
    /// Kept apart from the first key's comment when a blank line separates
    /// the two.
    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Replace the header block with `text`, one `#` line per input line.
    /// Blank text removes the header.
    pub fn set_header(&mut self, text: &str) {
        self.header = (!text.trim().is_empty()).then(|| {
            text.lines()
                .map(|line| match line.trim_end() {
                    "" => "#".to_string(),
                    line => format!("# {line}")
                })
                .collect::<Vec<_>>()
                .join("\n")
        });
    }

    pub(crate) fn set_raw_header(&mut self, raw: String) {
        self.header = Some(raw);
    }

    /// Navigate to a node.
    ///
    /// Fails only for malformed paths; missing nodes come back virtual.
    pub fn node<'a>(&'a self, path: &'a NodePath) -> Result<Node<'a>, DocumentError> {
        path.validate()?;
        Ok(Node {
            path,
            value: lookup(&self.root, path),
            comment: self.comments.get(path).map(String::as_str)
        })
    }

    /// Store `value` at `path`, materializing virtual ancestors.
    ///
    /// An ancestor holding a non-mapping value is replaced by a mapping.
    /// Storing `Null` clears the node.
    pub fn set(&mut self, path: &NodePath, value: Value) -> Result<(), DocumentError> {
        path.validate()?;
        if value.is_null() {
            self.clear(path)?;
            return Ok(());
        }

        let Some((leaf, parents)) = path.segments().split_last() else {
            return Ok(());
        };

        let mut current = &mut self.root;
        for (depth, segment) in parents.iter().enumerate() {
            let key = key_for(current, segment);
            let entry = current
                .entry(key)
                .or_insert_with(|| Value::Mapping(Mapping::new()));
            if !entry.is_mapping() {
                warn!(
                    key = %path,
                    parent = %NodePath::from_segments(&parents[..=depth]),
                    found = coercion::kind_of(entry),
                    "Replacing non-mapping parent while writing node"
                );
            }
            current = ensure_mapping(entry);
        }

        let key = key_for(current, leaf);
        current.insert(key, value);

        let root = &self.root;
        self.comments.retain(|p, _| {
            !(p.starts_with(path) && p.len() > path.len())
                || lookup(root, p).is_some_and(|v| !v.is_null())
        });
        Ok(())
    }

    /// Remove the node at `path` together with any comments on or below it.
    ///
    /// Returns whether a value was removed; clearing a virtual node is a
    /// no-op.
    pub fn clear(&mut self, path: &NodePath) -> Result<bool, DocumentError> {
        path.validate()?;
        self.comments.retain(|p, _| !p.starts_with(path));

        let Some((leaf, parents)) = path.segments().split_last() else {
            return Ok(false);
        };

        let mut current = &mut self.root;
        for segment in parents {
            let Some(key) = existing_key(current, segment) else {
                return Ok(false);
            };
            match current.get_mut(&key) {
                Some(Value::Mapping(next)) => current = next,
                _ => return Ok(false)
            }
        }
        Ok(existing_key(current, leaf).is_some_and(|key| current.shift_remove(&key).is_some()))
    }

    /// Attach a comment to `path`. A blank comment removes the existing one.
    pub fn set_comment(&mut self, path: &NodePath, comment: &str) -> Result<(), DocumentError> {
        path.validate()?;
        if comment.trim().is_empty() {
            self.comments.remove(path);
        } else {
            self.comments.insert(path.clone(), comment.to_string());
        }
        Ok(())
    }

    pub fn comment(&self, path: &NodePath) -> Option<&str> {
        self.comments.get(path).map(String::as_str)
    }

    /// Drop comments whose node no longer holds a value.
    pub fn prune_comments(&mut self) {
        let root = &self.root;
        self.comments
            .retain(|path, _| lookup(root, path).is_some_and(|v| !v.is_null()));
    }
}

impl<'a> Node<'a> {
    pub fn path(&self) -> &'a NodePath {
        self.path
    }

    /// True while nothing is stored at this node.
    pub fn is_virtual(&self) -> bool {
        self.value.is_none_or(Value::is_null)
    }

    /// Stored value, `None` when virtual.
    pub fn raw(&self) -> Option<&'a Value> {
        self.value.filter(|v| !v.is_null())
    }

    pub fn comment(&self) -> Option<&'a str> {
        self.comment
    }

    /// Convert the node into `T`; `Ok(None)` when virtual.
    pub fn get<T: Bindable>(&self) -> Result<Option<T>, CoercionError> {
        coercion::read(self)
    }

    fn get_or<T: Bindable>(&self, default: T) -> T {
        self.raw()
            .and_then(|raw| T::from_node(raw).ok())
            .unwrap_or(default)
    }

    pub fn get_string(&self, default: &str) -> String {
        self.raw()
            .and_then(coercion::extract_string)
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&self, default: i32) -> i32 {
        self.get_or(default)
    }

    pub fn get_long(&self, default: i64) -> i64 {
        self.get_or(default)
    }

    pub fn get_boolean(&self, default: bool) -> bool {
        self.get_or(default)
    }

    pub fn get_double(&self, default: f64) -> f64 {
        self.get_or(default)
    }
}

fn lookup<'a>(root: &'a Mapping, path: &NodePath) -> Option<&'a Value> {
    let (leaf, parents) = path.segments().split_last()?;
    let mut current = root;
    for segment in parents {
        match child(current, segment) {
            Some(Value::Mapping(next)) => current = next,
            _ => return None
        }
    }
    child(current, leaf)
}

/// Key already stored in `mapping` for `segment`.
///
/// String keys match exactly. Other scalar keys (`25565:`, `true:`) match by
/// their text, so hand-written numeric keys are read and overwritten in
/// place instead of being shadowed by a quoted duplicate.
fn existing_key(mapping: &Mapping, segment: &str) -> Option<Value> {
    if mapping.contains_key(segment) {
        return Some(Value::String(segment.to_string()));
    }
    mapping
        .keys()
        .find(|key| !key.is_string() && coercion::extract_string(key).as_deref() == Some(segment))
        .cloned()
}

fn key_for(mapping: &Mapping, segment: &str) -> Value {
    existing_key(mapping, segment).unwrap_or_else(|| Value::String(segment.to_string()))
}

fn child<'a>(mapping: &'a Mapping, segment: &str) -> Option<&'a Value> {
    existing_key(mapping, segment).and_then(|key| mapping.get(&key))
}

fn ensure_mapping(value: &mut Value) -> &mut Mapping {
    if !value.is_mapping() {
        *value = Value::Mapping(Mapping::new());
    }
    match value {
        Value::Mapping(mapping) => mapping,
        _ => unreachable!("value was just replaced by a mapping")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(key: &str) -> NodePath {
        NodePath::parse(key)
    }

    #[test]
    fn test_missing_node_is_virtual() {
        let doc = Document::new();
        let key = path("server.port");
        let node = doc.node(&key).unwrap();
        assert!(node.is_virtual());
        assert!(node.raw().is_none());
        assert_eq!(node.get_int(7), 7);
    }

    #[test]
    fn test_set_materializes_ancestors() {
        let mut doc = Document::new();
        let key = path("server.network.port");
        doc.set(&key, Value::from(25565)).unwrap();

        assert!(!doc.node(&path("server")).unwrap().is_virtual());
        assert!(!doc.node(&path("server.network")).unwrap().is_virtual());
        assert_eq!(doc.node(&key).unwrap().get_int(0), 25565);
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut doc = Document::new();
        doc.set(&path("server"), Value::from("offline")).unwrap();
        doc.set(&path("server.port"), Value::from(80)).unwrap();
        assert_eq!(doc.node(&path("server.port")).unwrap().get_long(0), 80);
    }

    #[test]
    fn test_node_below_scalar_is_virtual() {
        let mut doc = Document::new();
        doc.set(&path("server"), Value::from(5)).unwrap();
        assert!(doc.node(&path("server.port")).unwrap().is_virtual());
    }

    #[test]
    fn test_set_null_clears() {
        let mut doc = Document::new();
        let key = path("a.b");
        doc.set(&key, Value::from(true)).unwrap();
        doc.set(&key, Value::Null).unwrap();
        assert!(doc.node(&key).unwrap().is_virtual());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut doc = Document::new();
        let key = path("a.b");
        doc.set(&key, Value::from(1)).unwrap();
        doc.set_comment(&key, "note").unwrap();

        assert!(doc.clear(&key).unwrap());
        assert!(doc.node(&key).unwrap().is_virtual());
        assert!(doc.comment(&key).is_none());
        assert!(!doc.clear(&key).unwrap());
        assert!(!doc.clear(&path("never.set")).unwrap());
    }

    #[test]
    fn test_clear_preserves_sibling_order() {
        let mut doc = Document::new();
        for key in ["a", "b", "c"] {
            doc.set(&path(key), Value::from(1)).unwrap();
        }
        doc.clear(&path("a")).unwrap();
        let keys: Vec<_> = doc.root().keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, ["b", "c"]);
    }

    #[test]
    fn test_malformed_path_fails_navigation() {
        let mut doc = Document::new();
        assert!(matches!(
            doc.node(&path("a..b")),
            Err(DocumentError::EmptySegment { index: 1, .. })
        ));
        assert!(doc.set(&path(""), Value::from(1)).is_err());
        assert!(doc.clear(&path("a.")).is_err());
    }

    #[test]
    fn test_explicit_null_is_virtual() {
        let root: Mapping = serde_yaml::from_str("key: ~\n").unwrap();
        let doc = Document::from_root(root);
        assert!(doc.node(&path("key")).unwrap().is_virtual());
    }

    #[test]
    fn test_typed_getters_fall_back() {
        let root: Mapping =
            serde_yaml::from_str("name: lobby\nport: high\nratio: 0.5\nflag: yes\n").unwrap();
        let doc = Document::from_root(root);
        assert_eq!(doc.node(&path("name")).unwrap().get_string("x"), "lobby");
        assert_eq!(doc.node(&path("port")).unwrap().get_int(3), 3);
        assert_eq!(doc.node(&path("ratio")).unwrap().get_double(0.0), 0.5);
        assert!(doc.node(&path("flag")).unwrap().get_boolean(false));
        assert_eq!(doc.node(&path("missing")).unwrap().get_string("x"), "x");
    }

    #[test]
    fn test_replacing_subtree_drops_nested_comments() {
        let mut doc = Document::new();
        doc.set(&path("db.host"), Value::from("localhost")).unwrap();
        doc.set_comment(&path("db"), "Database").unwrap();
        doc.set_comment(&path("db.host"), "Host").unwrap();

        doc.set(&path("db"), Value::from("sqlite")).unwrap();
        assert_eq!(doc.comment(&path("db")), Some("Database"));
        assert!(doc.comment(&path("db.host")).is_none());
    }

    #[test]
    fn test_prune_comments() {
        let mut doc = Document::new();
        doc.set_comment(&path("ghost"), "dangling").unwrap();
        doc.set(&path("real"), Value::from(1)).unwrap();
        doc.set_comment(&path("real"), "kept").unwrap();
        doc.prune_comments();
        assert_eq!(doc.comments().len(), 1);
        assert_eq!(doc.comment(&path("real")), Some("kept"));
    }

    #[test]
    fn test_rewriting_mapping_drops_comments_on_removed_children() {
        let mut doc = Document::new();
        doc.set(&path("db.host"), Value::from("localhost")).unwrap();
        doc.set(&path("db.port"), Value::from(5432)).unwrap();
        doc.set_comment(&path("db.host"), "Host").unwrap();
        doc.set_comment(&path("db.port"), "Port").unwrap();

        let mut replacement = Mapping::new();
        replacement.insert(Value::from("host"), Value::from("db.internal"));
        doc.set(&path("db"), Value::Mapping(replacement)).unwrap();

        assert_eq!(doc.comment(&path("db.host")), Some("Host"));
        assert!(doc.comment(&path("db.port")).is_none());
    }

    #[test]
    fn test_scalar_keys_match_by_text() {
        let root: Mapping =
            serde_yaml::from_str("ports:\n  25565: hand-edited\ntrue: flag\n").unwrap();
        let mut doc = Document::from_root(root);

        let key = path("ports.25565");
        assert_eq!(doc.node(&key).unwrap().get_string("default"), "hand-edited");

        doc.set(&key, Value::from("changed")).unwrap();
        let ports = doc.root().get("ports").and_then(Value::as_mapping).unwrap();
        assert_eq!(ports.len(), 1);
        let (stored_key, stored) = ports.iter().next().unwrap();
        assert_eq!(stored_key.as_u64(), Some(25565));
        assert_eq!(stored.as_str(), Some("changed"));

        assert!(doc.clear(&path("true")).unwrap());
        assert!(doc.node(&path("true")).unwrap().is_virtual());
        assert_eq!(doc.root().len(), 1);
    }

    #[test]
    fn test_string_key_wins_over_scalar_twin() {
        let root: Mapping = serde_yaml::from_str("8080: number\n'8080': text\n").unwrap();
        let doc = Document::from_root(root);
        assert_eq!(doc.node(&path("8080")).unwrap().get_string(""), "text");
    }

    #[test]
    fn test_set_header_formats_lines() {
        let mut doc = Document::new();
        doc.set_header("Server settings\n\nEdit with care");
        assert_eq!(doc.header(), Some("# Server settings\n#\n# Edit with care"));

        doc.set_header("  ");
        assert!(doc.header().is_none());
    }
}
