//! # YAML Store
//!
//! Reads and writes one configuration file.
//!
//! Documents are rendered in block style with an indent width of
//! [`INDENT`], each comment written as `# ` lines directly above its key.
//! Parsing goes through `serde_yaml`; a light line scan then recovers the
//! comment blocks that precede mapping keys so hand-written notes survive a
//! load/save cycle.

use crate::coercion::{extract_string, kind_of};
use crate::document::Document;
use crate::path::NodePath;
use errors::{BindingError, DocumentError, Operation};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Indent width of rendered documents.
pub const INDENT: usize = 2;

/// Store failure before operation context is attached.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Document(#[from] DocumentError)
}

impl StoreError {
    pub fn with_context(self, operation: Operation, path: &Path) -> BindingError {
        match self {
            StoreError::Io(source) => BindingError::Io {
                operation,
                path: path.to_path_buf(),
                source
            },
            StoreError::Document(source) => BindingError::Document {
                operation,
                path: path.to_path_buf(),
                source
            }
        }
    }
}

/// Persistence handle bound to one file.
#[derive(Debug, Clone)]
pub struct YamlStore {
    path: PathBuf
}

impl YamlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the parent directories and an empty file when missing.
    pub fn create_if_absent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(_) => {
                debug!(path = %self.path.display(), "Created empty configuration file");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => Err(e.into())
        }
    }

    /// Parse the file into a fresh document.
    pub fn load(&self) -> Result<Document, StoreError> {
        let text = fs::read_to_string(&self.path)?;
        Ok(parse_document(&text)?)
    }

    /// Render `document` and overwrite the file in place.
    pub fn save(&self, document: &Document) -> Result<(), StoreError> {
        let text = render_document(document)?;
        fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Parse YAML text into a document.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Builds the in-memory tree for a configuration file. Empty files and a
/// bare `null` document yield an empty root.
///
/// ## Usage
/// ```rust
/// use binding::{NodePath, store::parse_document};
///
/// let doc = parse_document("server:\n  # Listen port\n  port: 25565\n").unwrap();
/// let key = NodePath::parse("server.port");
/// assert_eq!(doc.node(&key).unwrap().get_int(0), 25565);
/// assert_eq!(doc.comment(&key), Some("Listen port"));
/// ```
///
/// ## Error Handling
/// - `DocumentError::Parse` for invalid YAML
/// - `DocumentError::NotAMapping` when the root is a scalar or sequence
pub fn parse_document(text: &str) -> Result<Document, DocumentError> {
    if text.trim().is_empty() {
        return Ok(Document::new());
    }

    let value: Value = serde_yaml::from_str(text).map_err(|e| DocumentError::Parse {
        reason: e.to_string()
    })?;
    let root = match value {
        Value::Null => Mapping::new(),
        Value::Mapping(mapping) => mapping,
        other => {
            return Err(DocumentError::NotAMapping {
                found: kind_of(&other).to_string()
            });
        }
    };

    let scanned = scan_comments(text);
    let mut document = Document::from_root(root);
    for (path, comment) in scanned.keyed {
        if path.validate().is_ok() {
            document.set_comment(&path, &comment)?;
        }
    }
    if let Some(header) = scanned.header {
        document.set_raw_header(header);
    }
    document.prune_comments();
    Ok(document)
}

/// Render a document as block-style YAML.
///
/// A header block is written first and separated from the body by a blank
/// line.
pub fn render_document(document: &Document) -> Result<String, DocumentError> {
    let mut out = String::new();
    if let Some(header) = document.header() {
        out.push_str(header);
        out.push_str("\n\n");
    }
    if document.is_empty() {
        out.push_str("{}\n");
    } else {
        render_mapping(document, document.root(), &NodePath::default(), 0, &mut out)?;
    }
    Ok(out)
}

fn render_mapping(
    document: &Document,
    mapping: &Mapping,
    path: &NodePath,
    indent: usize,
    out: &mut String
) -> Result<(), DocumentError> {
    let pad = " ".repeat(indent);
    for (key, value) in mapping {
        let key_text = render_key(key)?;
        let child = path.child(extract_string(key).unwrap_or_else(|| key_text.clone()));

        if let Some(comment) = document.comment(&child) {
            for line in comment.lines() {
                if line.is_empty() {
                    out.push_str(&format!("{}#\n", pad));
                } else {
                    out.push_str(&format!("{}# {}\n", pad, line));
                }
            }
        }

        if let Value::Mapping(nested) = value {
            if !nested.is_empty() {
                out.push_str(&format!("{}{}:\n", pad, key_text));
                render_mapping(document, nested, &child, indent + INDENT, out)?;
                continue;
            }
        }

        let text = serde_yaml::to_string(value).map_err(|e| DocumentError::Render {
            reason: e.to_string()
        })?;
        let lines: Vec<&str> = text.lines().collect();
        let first = lines.first().copied().unwrap_or("");
        let is_block_scalar = first.starts_with('|') || first.starts_with('>');
        let is_sequence = matches!(value, Value::Sequence(items) if !items.is_empty());

        if lines.len() <= 1 && !is_sequence {
            out.push_str(&format!("{}{}: {}\n", pad, key_text, first));
        } else if is_block_scalar {
            out.push_str(&format!("{}{}: {}\n", pad, key_text, first));
            for line in &lines[1..] {
                push_indented(out, &pad, line);
            }
        } else {
            out.push_str(&format!("{}{}:\n", pad, key_text));
            let nested_pad = " ".repeat(indent + INDENT);
            for line in &lines {
                push_indented(out, &nested_pad, line);
            }
        }
    }
    Ok(())
}

fn push_indented(out: &mut String, pad: &str, line: &str) {
    if line.is_empty() {
        out.push('\n');
    } else {
        out.push_str(pad);
        out.push_str(line);
        out.push('\n');
    }
}

fn render_key(key: &Value) -> Result<String, DocumentError> {
    let text = serde_yaml::to_string(key).map_err(|e| DocumentError::Render {
        reason: e.to_string()
    })?;
    let text = text.trim_end();
    if text.contains('\n') {
        return Err(DocumentError::Render {
            reason: format!("mapping key {:?} does not fit on one line", key)
        });
    }
    Ok(text.to_string())
}

/// Comments recovered from raw YAML text.
struct ScannedComments {
    /// Leading block split from the first key by a blank line
    header: Option<String>,
    keyed: Vec<(NodePath, String)>
}

/// Collect `#` comment blocks directly above mapping keys, plus the header
/// block at the top of the file.
///
/// Inline comments after a value and comments below the last key are not
/// recovered.
///
/// Blank lines, sequence items and document markers break a block. Paths
/// that do not resolve to a stored node are dropped by the caller.
fn scan_comments(text: &str) -> ScannedComments {
    let mut found = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut block_scalar_owner: Option<usize> = None;
    let mut preamble: Vec<&str> = Vec::new();
    let mut in_preamble = true;

    for line in text.lines() {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if in_preamble {
            if trimmed.is_empty() || trimmed.starts_with('#') {
                preamble.push(trimmed.trim_end());
            } else {
                in_preamble = false;
                // The block touching the first key stays with that key.
                let cut = preamble.iter().rposition(|l| l.is_empty()).unwrap_or(0);
                preamble.truncate(cut);
            }
        }

        if let Some(owner) = block_scalar_owner {
            if trimmed.is_empty() || indent > owner {
                continue;
            }
            block_scalar_owner = None;
        }

        if trimmed.is_empty() {
            pending.clear();
            continue;
        }
        if let Some(comment) = trimmed.strip_prefix('#') {
            pending.push(comment.strip_prefix(' ').unwrap_or(comment).trim_end().to_string());
            continue;
        }
        if trimmed == "-" || trimmed.starts_with("- ") || trimmed.starts_with("---") {
            pending.clear();
            continue;
        }
        let Some((key, rest)) = split_key(trimmed) else {
            pending.clear();
            continue;
        };

        while stack.last().is_some_and(|(depth, _)| *depth >= indent) {
            stack.pop();
        }
        stack.push((indent, key));

        if !pending.is_empty() {
            let path = NodePath::from_segments(stack.iter().map(|(_, k)| k.clone()));
            found.push((path, pending.join("\n")));
            pending.clear();
        }

        let rest = rest.trim_start();
        if rest.starts_with('|') || rest.starts_with('>') {
            block_scalar_owner = Some(indent);
        }
    }
    ScannedComments {
        header: header_block(&preamble),
        keyed: found
    }
}

fn header_block(lines: &[&str]) -> Option<String> {
    let start = lines.iter().position(|l| !l.is_empty())?;
    let end = lines.iter().rposition(|l| !l.is_empty())?;
    Some(lines[start..=end].join("\n"))
}

/// Split `key: rest` into the decoded key and the remainder.
fn split_key(line: &str) -> Option<(String, &str)> {
    let first = line.chars().next()?;
    if matches!(first, '"' | '\'') {
        let close = closing_quote(line, first)?;
        let rest = line[close + 1..].strip_prefix(':')?;
        if !(rest.is_empty() || rest.starts_with(' ')) {
            return None;
        }
        let key: String = serde_yaml::from_str(&line[..=close]).ok()?;
        return Some((key, rest));
    }
    if matches!(first, '{' | '[' | '&' | '*' | '!' | '?' | '|' | '>') {
        return None;
    }

    let end = match line.find(": ") {
        Some(pos) => pos,
        None => line.strip_suffix(':').map(str::len)?
    };
    let key = line[..end].trim_end();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), &line[end + 1..]))
}

fn closing_quote(line: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in line.char_indices().skip(1) {
        if quote == '"' && c == '\\' && !escaped {
            escaped = true;
            continue;
        }
        if c == quote && !escaped {
            return Some(i);
        }
        escaped = false;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn path(key: &str) -> NodePath {
        NodePath::parse(key)
    }

    #[test]
    fn test_parse_empty_and_null_documents() {
        assert!(parse_document("").unwrap().is_empty());
        assert!(parse_document("  \n\n").unwrap().is_empty());
        assert!(parse_document("~\n").unwrap().is_empty());
        assert!(parse_document("{}\n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_mapping_root() {
        let result = parse_document("- a\n- b\n");
        assert_eq!(
            result,
            Err(DocumentError::NotAMapping {
                found: "sequence".to_string()
            })
        );
    }

    #[test]
    fn test_parse_invalid_yaml() {
        let result = parse_document("invalid: [unmatched\n");
        assert!(matches!(result, Err(DocumentError::Parse { .. })));
    }

    #[test]
    fn test_render_empty_document() {
        assert_eq!(render_document(&Document::new()).unwrap(), "{}\n");
    }

    #[test]
    fn test_render_nested_with_comments() {
        let mut doc = Document::new();
        doc.set(&path("server.host"), Value::from("localhost")).unwrap();
        doc.set(&path("server.port"), Value::from(25565)).unwrap();
        doc.set(&path("motd"), Value::from("Welcome")).unwrap();
        doc.set_comment(&path("server"), "Network settings").unwrap();
        doc.set_comment(&path("server.port"), "Listen port\nRestart required")
            .unwrap();

        let text = render_document(&doc).unwrap();
        assert_eq!(
            text,
            "# Network settings\n\
             server:\n\
             \x20 host: localhost\n\
             \x20 # Listen port\n\
             \x20 # Restart required\n\
             \x20 port: 25565\n\
             motd: Welcome\n"
        );
    }

    #[test]
    fn test_render_sequences_and_empty_containers() {
        let mut doc = Document::new();
        doc.set(&path("worlds"), Value::from(vec!["overworld"])).unwrap();
        doc.set(&path("admins"), Value::Sequence(Vec::new())).unwrap();
        doc.set(&path("extra"), Value::Mapping(Mapping::new())).unwrap();

        let text = render_document(&doc).unwrap();
        assert_eq!(text, "worlds:\n  - overworld\nadmins: []\nextra: {}\n");
    }

    #[test]
    fn test_render_then_parse_preserves_values_and_comments() {
        let mut doc = Document::new();
        doc.set(&path("a.b.c"), Value::from(true)).unwrap();
        doc.set(&path("a.list"), Value::from(vec![1, 2, 3])).unwrap();
        doc.set(&path("a.text"), Value::from("line one\nline two")).unwrap();
        doc.set(&path("after"), Value::from(1.5)).unwrap();
        doc.set_comment(&path("a.b.c"), "Deep").unwrap();
        doc.set_comment(&path("after"), "Trailing key").unwrap();

        let text = render_document(&doc).unwrap();
        let parsed = parse_document(&text).unwrap();
        assert_eq!(parsed, doc);
    }

    #[test]
    fn test_parse_recovers_hand_written_comments() {
        let text = "\
# Header block

# Database
db:
  # Host name
  host: example.org
  \"quoted key\": 1
  # Dangling comment
list:
  - a
  # Not a key comment
  - b
";
        let doc = parse_document(text).unwrap();
        assert_eq!(doc.comment(&path("db")), Some("Database"));
        assert_eq!(doc.comment(&path("db.host")), Some("Host name"));
        assert_eq!(doc.comment(&path("list")), Some("Dangling comment"));
        assert_eq!(doc.comments().len(), 3);
        assert_eq!(doc.header(), Some("# Header block"));
    }

    #[test]
    fn test_header_block_survives_rewrite() {
        let text = "# License: MIT\n#\n# Generated once\n\n# Ports\nports:\n  25565: lobby\n";
        let doc = parse_document(text).unwrap();
        assert_eq!(doc.header(), Some("# License: MIT\n#\n# Generated once"));
        assert_eq!(doc.comment(&path("ports")), Some("Ports"));
        assert_eq!(render_document(&doc).unwrap(), text);
    }

    #[test]
    fn test_comment_touching_first_key_is_not_a_header() {
        let doc = parse_document("# Port\nport: 1\n").unwrap();
        assert!(doc.header().is_none());
        assert_eq!(doc.comment(&path("port")), Some("Port"));
    }

    #[test]
    fn test_comment_only_file_keeps_header() {
        let doc = parse_document("# nothing configured yet\n").unwrap();
        assert!(doc.is_empty());
        assert_eq!(
            render_document(&doc).unwrap(),
            "# nothing configured yet\n\n{}\n"
        );
    }

    #[test]
    fn test_inline_and_trailing_comments_are_dropped() {
        let text = "port: 1 # inline note\nhost: local\n# trailing note\n";
        let doc = parse_document(text).unwrap();
        assert!(doc.comments().is_empty());
        assert!(doc.header().is_none());
        assert_eq!(render_document(&doc).unwrap(), "port: 1\nhost: local\n");
    }

    #[test]
    fn test_scan_skips_block_scalars() {
        let text = "motd: |\n  # not a comment\n  key: not a key\n# Port\nport: 1\n";
        let doc = parse_document(text).unwrap();
        assert_eq!(doc.comment(&path("port")), Some("Port"));
        assert_eq!(doc.comments().len(), 1);
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("port: 1"), Some(("port".to_string(), " 1")));
        assert_eq!(split_key("server:"), Some(("server".to_string(), "")));
        assert_eq!(
            split_key("url: http://example.org"),
            Some(("url".to_string(), " http://example.org"))
        );
        assert_eq!(split_key("'a.b': 2"), Some(("a.b".to_string(), " 2")));
        assert_eq!(split_key("plain text"), None);
        assert_eq!(split_key("{a: 1}"), None);
    }

    #[test]
    fn test_store_create_load_save() {
        let dir = tempdir().unwrap();
        let store = YamlStore::new(dir.path().join("nested").join("settings.yml"));

        store.create_if_absent().unwrap();
        assert!(store.path().exists());
        assert!(store.load().unwrap().is_empty());

        let mut doc = Document::new();
        doc.set(&path("server.port"), Value::from(8080)).unwrap();
        store.save(&doc).unwrap();
        store.create_if_absent().unwrap();

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.node(&path("server.port")).unwrap().get_int(0), 8080);
    }

    #[test]
    fn test_store_error_context() {
        let dir = tempdir().unwrap();
        let store = YamlStore::new(dir.path().join("missing.yml"));
        let err = store
            .load()
            .unwrap_err()
            .with_context(Operation::Reload, store.path());
        assert!(matches!(
            err,
            BindingError::Io {
                operation: Operation::Reload,
                ..
            }
        ));
    }
}
