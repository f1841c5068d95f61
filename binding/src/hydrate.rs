//! # Hydration
//!
//! Synchronizes the bound fields of an instance with a document.
//!
//! On initial load virtual nodes are seeded with declared defaults and
//! comments are attached before values are pulled into the instance. On
//! reload values are only pulled; keys missing from the document leave the
//! field at its current in-memory value.

use crate::coercion;
use crate::document::Document;
use crate::schema::Schema;
use errors::{BindingError, CoercionError, DeclarationError, DocumentError};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HydrationMode {
    /// Seed defaults and comments, then pull values.
    InitialLoad,
    /// Pull values only.
    Reload
}

impl HydrationMode {
    pub fn writes_defaults(self) -> bool {
        matches!(self, HydrationMode::InitialLoad)
    }
}

/// Field whose stored value did not convert to its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedField {
    pub key: String,
    pub reason: CoercionError
}

/// What one hydration pass did, key by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    pub seeded: Vec<String>,
    pub applied: Vec<String>,
    pub skipped: Vec<SkippedField>
}

/// Hydrate `instance` from `document`.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Processes fields in registration order. In `InitialLoad` mode every
/// virtual node is seeded from the field (an absent value seeds an empty
/// mapping) and declared comments are attached. In both modes each
/// concrete node is then converted and assigned to its field.
///
/// ## Error Handling
/// - A stored value that does not convert is logged and recorded in
///   [`HydrationReport::skipped`]; the field keeps its value and the pass
///   continues.
/// - A default that cannot be written aborts the pass with
///   `BindingError::Hydration`. Fields processed before it stay assigned.
pub fn hydrate<C>(
    schema: &Schema<C>,
    document: &mut Document,
    instance: &mut C,
    mode: HydrationMode
) -> Result<HydrationReport, BindingError> {
    let type_name = schema.type_name();
    let invalid_key = |key: &str, _: DocumentError| -> BindingError {
        DeclarationError::InvalidKey {
            type_name: type_name.to_string(),
            key: key.to_string()
        }
        .into()
    };

    let mut report = HydrationReport::default();
    for field in schema.fields() {
        let path = field.path();

        if mode.writes_defaults() {
            let is_virtual = document
                .node(path)
                .map_err(|e| invalid_key(field.key(), e))?
                .is_virtual();
            if is_virtual {
                let value = field
                    .seed_value(instance)
                    .map_err(|source| BindingError::Hydration {
                        type_name: type_name.to_string(),
                        key: field.key().to_string(),
                        source
                    })?;
                document
                    .set(path, coercion::seed_value(value))
                    .map_err(|e| invalid_key(field.key(), e))?;
                debug!(key = field.key(), "Seeded default value");
                report.seeded.push(field.key().to_string());
            }

            if let Some(comment) = field.comment() {
                document
                    .set_comment(path, comment)
                    .map_err(|e| invalid_key(field.key(), e))?;
            }
        }

        let node = document.node(path).map_err(|e| invalid_key(field.key(), e))?;
        let Some(raw) = node.raw() else {
            continue;
        };
        match field.apply(instance, raw) {
            Ok(()) => report.applied.push(field.key().to_string()),
            Err(reason) => {
                warn!(
                    type_name,
                    key = field.key(),
                    declared = %field.descriptor(),
                    error = %reason,
                    "Stored value does not convert; keeping current field value"
                );
                report.skipped.push(SkippedField {
                    key: field.key().to_string(),
                    reason
                });
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coercion::{Bindable, ToNode, TypeDescriptor};
    use crate::path::NodePath;
    use crate::schema::{ConfigSchema, FieldTable, Settings, describe};
    use crate::store::parse_document;
    use serde_yaml::Value;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq)]
    struct Lobby {
        name: String,
        capacity: i32,
        whitelist: Vec<String>,
        rewards: BTreeMap<String, i64>,
        spawn: Option<Value>
    }

    impl Default for Lobby {
        fn default() -> Self {
            Self {
                name: "lobby".to_string(),
                capacity: 64,
                whitelist: vec!["admin".to_string()],
                rewards: BTreeMap::new(),
                spawn: None
            }
        }
    }

    impl ConfigSchema for Lobby {
        fn settings() -> Settings {
            Settings::new("lobby.yml")
        }

        fn bind(fields: &mut FieldTable<Self>) {
            fields
                .field("lobby.name", |c| &c.name, |c| &mut c.name)
                .comment("Display name");
            fields.field("lobby.capacity", |c| &c.capacity, |c| &mut c.capacity);
            fields.field("whitelist", |c| &c.whitelist, |c| &mut c.whitelist);
            fields.field("rewards", |c| &c.rewards, |c| &mut c.rewards);
            fields.field("spawn", |c| &c.spawn, |c| &mut c.spawn);
        }
    }

    fn path(key: &str) -> NodePath {
        NodePath::parse(key)
    }

    #[test]
    fn test_initial_load_seeds_empty_document() {
        let schema = describe::<Lobby>().unwrap();
        let mut doc = Document::new();
        let mut lobby = Lobby::default();

        let report = hydrate(&schema, &mut doc, &mut lobby, HydrationMode::InitialLoad).unwrap();

        assert_eq!(report.seeded.len(), 5);
        assert!(report.skipped.is_empty());
        assert_eq!(lobby.name, "lobby");
        assert_eq!(lobby.whitelist, vec!["admin".to_string()]);
        assert_eq!(doc.node(&path("lobby.capacity")).unwrap().get_int(0), 64);
        assert_eq!(doc.comment(&path("lobby.name")), Some("Display name"));
        // Absent values materialize as empty mappings.
        assert_eq!(
            doc.node(&path("spawn")).unwrap().raw(),
            Some(&Value::Mapping(Default::default()))
        );
        assert_eq!(lobby.spawn, Some(Value::Mapping(Default::default())));
    }

    #[test]
    fn test_initial_load_backfills_without_override() {
        let schema = describe::<Lobby>().unwrap();
        let mut doc = parse_document("lobby:\n  name: arena\n").unwrap();
        let mut lobby = Lobby::default();

        let report = hydrate(&schema, &mut doc, &mut lobby, HydrationMode::InitialLoad).unwrap();

        assert_eq!(lobby.name, "arena");
        assert_eq!(lobby.capacity, 64);
        assert!(!report.seeded.contains(&"lobby.name".to_string()));
        assert!(report.seeded.contains(&"lobby.capacity".to_string()));
        assert_eq!(doc.node(&path("lobby.name")).unwrap().get_string(""), "arena");
    }

    #[test]
    fn test_conversion_failure_keeps_default() {
        let schema = describe::<Lobby>().unwrap();
        let mut doc =
            parse_document("lobby:\n  capacity: lots\nwhitelist:\n  - [nested]\n").unwrap();
        let mut lobby = Lobby::default();

        let report = hydrate(&schema, &mut doc, &mut lobby, HydrationMode::InitialLoad).unwrap();

        assert_eq!(lobby.capacity, 64);
        assert_eq!(lobby.whitelist, vec!["admin".to_string()]);
        let skipped: Vec<_> = report.skipped.iter().map(|s| s.key.as_str()).collect();
        assert_eq!(skipped, ["lobby.capacity", "whitelist"]);
    }

    #[test]
    fn test_reload_pulls_only() {
        let schema = describe::<Lobby>().unwrap();
        let mut doc = parse_document("lobby:\n  capacity: 10\n").unwrap();
        let mut lobby = Lobby::default();
        lobby.name = "in-memory".to_string();

        let report = hydrate(&schema, &mut doc, &mut lobby, HydrationMode::Reload).unwrap();

        assert!(report.seeded.is_empty());
        assert_eq!(report.applied, ["lobby.capacity"]);
        assert_eq!(lobby.capacity, 10);
        assert_eq!(lobby.name, "in-memory");
        assert!(doc.node(&path("lobby.name")).unwrap().is_virtual());
        assert!(doc.comment(&path("lobby.name")).is_none());
    }

    #[derive(Debug, Default, PartialEq)]
    struct Opaque;

    impl ToNode for Opaque {
        fn to_node(&self) -> Result<Value, CoercionError> {
            Err(CoercionError::Unrepresentable {
                reason: "opaque handle".to_string()
            })
        }
    }

    impl Bindable for Opaque {
        fn descriptor() -> TypeDescriptor {
            TypeDescriptor::Structured("Opaque")
        }

        fn from_node(_value: &Value) -> Result<Self, CoercionError> {
            Ok(Opaque)
        }
    }

    #[derive(Debug, Default)]
    struct WithOpaque {
        first: i32,
        handle: Opaque
    }

    impl ConfigSchema for WithOpaque {
        fn settings() -> Settings {
            Settings::new("opaque.yml")
        }

        fn bind(fields: &mut FieldTable<Self>) {
            fields.field("first", |c| &c.first, |c| &mut c.first);
            fields.field("handle", |c| &c.handle, |c| &mut c.handle);
        }
    }

    #[test]
    fn test_unwritable_default_aborts_initial_load() {
        let schema = describe::<WithOpaque>().unwrap();
        let mut doc = Document::new();
        let mut instance = WithOpaque::default();

        let err = hydrate(&schema, &mut doc, &mut instance, HydrationMode::InitialLoad).unwrap_err();

        assert!(matches!(err, BindingError::Hydration { ref key, .. } if key == "handle"));
        // Work done before the failing field stays visible.
        assert!(!doc.node(&path("first")).unwrap().is_virtual());
    }

    #[test]
    fn test_reload_never_writes_defaults() {
        let schema = describe::<WithOpaque>().unwrap();
        let mut doc = parse_document("handle: anything\n").unwrap();
        let mut instance = WithOpaque::default();

        let report = hydrate(&schema, &mut doc, &mut instance, HydrationMode::Reload).unwrap();

        assert_eq!(report.applied, ["handle"]);
        assert!(doc.node(&path("first")).unwrap().is_virtual());
    }
}
