//! # Binding Errors
//!
//! Error taxonomy for the YAML configuration binding engine.
//!
//! - Uses `thiserror` for structured error definitions
//! - Named fields everywhere so messages carry their own context
//! - Declaration and I/O failures are fatal for the enclosing operation;
//!   coercion failures are reported per field and usually swallowed

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Public operation that produced a [`BindingError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    Reload,
    Save,
    Set,
    Remove,
    Update
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Load => "load",
            Operation::Reload => "reload",
            Operation::Save => "save",
            Operation::Set => "set",
            Operation::Remove => "remove",
            Operation::Update => "update"
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configuration type is declared in a way the engine cannot bind.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    #[error("Invalid settings on {type_name}: {reason}")]
    InvalidSettings { type_name: String, reason: String },

    #[error("Invalid key '{key}' on {type_name}: empty path segment")]
    InvalidKey { type_name: String, key: String },

    #[error("Duplicate key '{key}' on {type_name}")]
    DuplicateKey { type_name: String, key: String },

    #[error("Overlapping keys on {type_name}: '{key}' is nested under '{parent}'")]
    OverlappingKeys {
        type_name: String,
        key: String,
        parent: String
    }
}

/// Failures raised by the document tree or its YAML serialization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Malformed key '{key}': segment {index} is empty")]
    EmptySegment { key: String, index: usize },

    #[error("Failed to parse YAML: {reason}")]
    Parse { reason: String },

    #[error("Failed to render YAML: {reason}")]
    Render { reason: String },

    #[error("Document root must be a mapping, found {found}")]
    NotAMapping { found: String }
}

/// A single value could not be converted between a node and a declared type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoercionError {
    #[error("Expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },

    #[error("Value {value} is out of range for {expected}")]
    OutOfRange { expected: String, value: String },

    #[error("Value cannot be represented in the document: {reason}")]
    Unrepresentable { reason: String }
}

impl CoercionError {
    pub fn mismatch(expected: impl fmt::Display, found: impl Into<String>) -> Self {
        CoercionError::Mismatch {
            expected: expected.to_string(),
            found: found.into()
        }
    }

    pub fn out_of_range(expected: impl fmt::Display, value: impl fmt::Display) -> Self {
        CoercionError::OutOfRange {
            expected: expected.to_string(),
            value: value.to_string()
        }
    }
}

/// Error returned by every public operation of a bound configuration.
#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    Declaration(#[from] DeclarationError),

    #[error("Failed to {operation} {}: {source}", .path.display())]
    Io {
        operation: Operation,
        path: PathBuf,
        #[source]
        source: std::io::Error
    },

    #[error("Failed to {operation} {}: {source}", .path.display())]
    Document {
        operation: Operation,
        path: PathBuf,
        #[source]
        source: DocumentError
    },

    #[error("Failed to {operation} '{key}' in {}: {source}", .path.display())]
    MalformedKey {
        operation: Operation,
        key: String,
        path: PathBuf,
        #[source]
        source: DocumentError
    },

    #[error("Failed to {operation} '{key}' in {}: {source}", .path.display())]
    Coercion {
        operation: Operation,
        key: String,
        path: PathBuf,
        #[source]
        source: CoercionError
    },

    #[error("Failed to hydrate {type_name} at '{key}': {source}")]
    Hydration {
        type_name: String,
        key: String,
        #[source]
        source: CoercionError
    }
}

impl BindingError {
    /// Operation that failed, when the error is tied to one.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            BindingError::Io { operation, .. }
            | BindingError::Document { operation, .. }
            | BindingError::MalformedKey { operation, .. }
            | BindingError::Coercion { operation, .. } => Some(*operation),
            BindingError::Declaration(_) | BindingError::Hydration { .. } => None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_carries_operation_and_path() {
        let err = BindingError::Io {
            operation: Operation::Reload,
            path: PathBuf::from("/data/server.yml"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone")
        };
        let message = err.to_string();
        assert!(message.contains("reload"));
        assert!(message.contains("/data/server.yml"));
        assert!(message.contains("gone"));
        assert_eq!(err.operation(), Some(Operation::Reload));
    }

    #[test]
    fn test_declaration_error_is_transparent() {
        let err: BindingError = DeclarationError::DuplicateKey {
            type_name: "ServerConfig".to_string(),
            key: "server.port".to_string()
        }
        .into();
        assert_eq!(err.to_string(), "Duplicate key 'server.port' on ServerConfig");
        assert_eq!(err.operation(), None);
    }

    #[test]
    fn test_malformed_key_message() {
        let err = BindingError::MalformedKey {
            operation: Operation::Set,
            key: "a..b".to_string(),
            path: PathBuf::from("cfg.yml"),
            source: DocumentError::EmptySegment {
                key: "a..b".to_string(),
                index: 1
            }
        };
        assert_eq!(
            err.to_string(),
            "Failed to set 'a..b' in cfg.yml: Malformed key 'a..b': segment 1 is empty"
        );
    }

    #[test]
    fn test_coercion_helpers() {
        assert_eq!(
            CoercionError::mismatch("integer", "text").to_string(),
            "Expected integer, found text"
        );
        assert_eq!(
            CoercionError::out_of_range("integer", 1u64 << 40).to_string(),
            "Value 1099511627776 is out of range for integer"
        );
    }
}
