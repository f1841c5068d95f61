//! # Path Resolution
//!
//! Turns dotted keys such as `server.port` into the ordered segment
//! sequence used to navigate the document tree.
//!
//! Splitting is verbatim: there is no escaping, and empty segments are kept
//! so that malformed keys surface as a navigation error instead of silently
//! addressing a different node.

use errors::DocumentError;
use std::fmt;

/// Separator between segments of a dotted key.
pub const SEPARATOR: char = '.';

/// Ordered sequence of map keys addressing one node of a document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodePath {
    segments: Vec<String>
}

impl NodePath {
    /// Resolve a dotted key into its path.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Purpose
    /// Pure mapping from dotted key to segments; the same key always yields
    /// the same path.
    ///
    /// ## Usage
    /// ```rust
    /// use binding::NodePath;
    ///
    /// let path = NodePath::parse("server.port");
    /// assert_eq!(path.segments(), ["server", "port"]);
    /// assert_eq!(NodePath::parse("a..b").segments(), ["a", "", "b"]);
    /// ```
    pub fn parse(dotted: &str) -> Self {
        Self {
            segments: dotted.split(SEPARATOR).map(str::to_string).collect()
        }
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        Self {
            segments: segments.into_iter().map(Into::into).collect()
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Last segment, the key of this node inside its parent mapping.
    pub fn leaf(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn parent(&self) -> Option<NodePath> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec()
        })
    }

    pub fn child(&self, segment: impl Into<String>) -> NodePath {
        let mut segments = self.segments.clone();
        segments.push(segment.into());
        Self { segments }
    }

    /// True when `prefix` addresses this node or one of its ancestors.
    pub fn starts_with(&self, prefix: &NodePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Reject paths that cannot address a node.
    ///
    /// An empty path or any empty segment is malformed.
    pub fn validate(&self) -> Result<(), DocumentError> {
        if self.segments.is_empty() {
            return Err(DocumentError::EmptySegment {
                key: String::new(),
                index: 0
            });
        }
        match self.segments.iter().position(String::is_empty) {
            Some(index) => Err(DocumentError::EmptySegment {
                key: self.to_string(),
                index
            }),
            None => Ok(())
        }
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl From<&str> for NodePath {
    fn from(dotted: &str) -> Self {
        NodePath::parse(dotted)
    }
}
