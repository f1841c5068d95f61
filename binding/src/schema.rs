//! # Field Descriptor Model
//!
//! Describes which fields of a configuration type are persisted, where they
//! live in the document and how their values cross the node boundary.
//!
//! Each configuration type registers its fields once, in declaration
//! order, through [`ConfigSchema::bind`]. [`describe`] turns that
//! registration into an immutable [`Schema`] after checking the keys.

use crate::coercion::{Bindable, ToNode, TypeDescriptor};
use crate::path::NodePath;
use errors::{CoercionError, DeclarationError};
use serde_yaml::Value;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::path::{Component, Path, PathBuf};
use validator::Validate;

/// File placement of a configuration type.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Names the backing file and, optionally, a subdirectory of the base
/// directory handed to [`BoundConfig::load`](crate::BoundConfig::load).
///
/// ## Validation
/// - `name`: non-empty, a plain file name (no separators, not `.`/`..`)
/// - `data_dir`: empty, or a relative path that stays under the base
///   directory
#[derive(Debug, Clone, PartialEq, Eq, Validate)]
pub struct Settings {
    #[validate(length(min = 1), custom(function = "validate_file_name"))]
    pub name: String,

    #[validate(custom(function = "validate_data_dir"))]
    pub data_dir: String
}

impl Settings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_dir: String::new()
        }
    }

    pub fn in_dir(mut self, data_dir: impl Into<String>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    /// Backing file path under `base_dir`.
    pub fn resolve(&self, base_dir: &Path) -> PathBuf {
        if self.data_dir.trim().is_empty() {
            base_dir.join(&self.name)
        } else {
            base_dir.join(&self.data_dir).join(&self.name)
        }
    }
}

fn validate_file_name(value: &str) -> Result<(), validator::ValidationError> {
    if value == "." || value == ".." || value.contains(['/', '\\']) {
        return Err(validator::ValidationError::new("name must be a plain file name"));
    }
    Ok(())
}

fn validate_data_dir(value: &str) -> Result<(), validator::ValidationError> {
    let path = Path::new(value);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(validator::ValidationError::new(
            "data_dir must be relative to the base directory"
        ));
    }
    Ok(())
}

/// A configuration type bound to a YAML file.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Replaces runtime reflection: the type states its file placement and
/// registers its persisted fields. `Default` provides the instance whose
/// field values act as declared defaults.
///
/// ## Usage
/// ```rust
/// use binding::{ConfigSchema, FieldTable, Settings};
///
/// #[derive(Debug, Clone)]
/// struct ServerConfig {
///     port: u16,
///     motd: String
/// }
///
/// impl Default for ServerConfig {
///     fn default() -> Self {
///         Self { port: 25565, motd: "Welcome".to_string() }
///     }
/// }
///
/// impl ConfigSchema for ServerConfig {
///     fn settings() -> Settings {
///         Settings::new("server.yml")
///     }
///
///     fn bind(fields: &mut FieldTable<Self>) {
///         fields
///             .field("server.port", |c| &c.port, |c| &mut c.port)
///             .comment("Port the server listens on");
///         fields.field("motd", |c| &c.motd, |c| &mut c.motd);
///     }
/// }
///
/// let schema = binding::describe::<ServerConfig>().unwrap();
/// assert_eq!(schema.fields().len(), 2);
/// ```
pub trait ConfigSchema: Default + Send + Sync + 'static {
    fn settings() -> Settings;

    fn bind(fields: &mut FieldTable<Self>);
}

type PushFn<C> = Box<dyn Fn(&C) -> Result<Value, CoercionError> + Send + Sync>;
type PullFn<C> = Box<dyn Fn(&mut C, &Value) -> Result<(), CoercionError> + Send + Sync>;

/// One persisted field of a configuration type.
pub struct BoundField<C> {
    key: String,
    path: NodePath,
    descriptor: TypeDescriptor,
    comment: Option<String>,
    default: Option<Result<Value, CoercionError>>,
    push: PushFn<C>,
    pull: PullFn<C>
}

impl<C> BoundField<C> {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &NodePath {
        &self.path
    }

    pub fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    /// Value to seed into a virtual node: the explicit default when one was
    /// registered, otherwise the field's value in `instance`.
    pub fn seed_value(&self, instance: &C) -> Result<Value, CoercionError> {
        match &self.default {
            Some(default) => default.clone(),
            None => self.current_value(instance)
        }
    }

    /// Current in-memory value converted to a node value.
    pub fn current_value(&self, instance: &C) -> Result<Value, CoercionError> {
        (self.push)(instance)
    }

    /// Convert `raw` to the declared type and assign it to the field.
    ///
    /// On error the field is left untouched.
    pub fn apply(&self, instance: &mut C, raw: &Value) -> Result<(), CoercionError> {
        (self.pull)(instance, raw)
    }

    pub fn info(&self) -> FieldInfo {
        FieldInfo {
            key: self.key.clone(),
            path: self.path.clone(),
            descriptor: self.descriptor.clone(),
            comment: self.comment.clone()
        }
    }
}

impl<C> fmt::Debug for BoundField<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundField")
            .field("key", &self.key)
            .field("descriptor", &self.descriptor)
            .field("comment", &self.comment)
            .field("has_default", &self.default.is_some())
            .finish()
    }
}

/// Plain description of a bound field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub key: String,
    pub path: NodePath,
    pub descriptor: TypeDescriptor,
    pub comment: Option<String>
}

/// Registration table filled by [`ConfigSchema::bind`].
pub struct FieldTable<C> {
    fields: Vec<BoundField<C>>
}

impl<C: 'static> FieldTable<C> {
    fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Register a field at a dotted key.
    pub fn field<T>(
        &mut self,
        key: &str,
        get: fn(&C) -> &T,
        get_mut: fn(&mut C) -> &mut T
    ) -> FieldBuilder<'_, C, T>
    where
        T: Bindable + 'static
    {
        self.fields.push(BoundField {
            key: key.to_string(),
            path: NodePath::parse(key),
            descriptor: T::descriptor(),
            comment: None,
            default: None,
            push: Box::new(move |instance: &C| get(instance).to_node()),
            pull: Box::new(move |instance: &mut C, raw: &Value| {
                *get_mut(instance) = T::from_node(raw)?;
                Ok(())
            })
        });
        let index = self.fields.len() - 1;
        FieldBuilder {
            field: &mut self.fields[index],
            _marker: PhantomData
        }
    }
}

/// Chained options for a field being registered.
pub struct FieldBuilder<'a, C, T> {
    field: &'a mut BoundField<C>,
    _marker: PhantomData<fn() -> T>
}

impl<C, T: Bindable> FieldBuilder<'_, C, T> {
    /// Comment written above the key when the document is seeded. Blank
    /// text is ignored.
    pub fn comment(self, text: &str) -> Self {
        if !text.trim().is_empty() {
            self.field.comment = Some(text.to_string());
        }
        self
    }

    /// Seed value used instead of the field's value in a fresh instance.
    pub fn default_value(self, value: T) -> Self {
        self.field.default = Some(value.to_node());
        self
    }
}

/// Validated field descriptors of one configuration type.
pub struct Schema<C> {
    type_name: &'static str,
    settings: Settings,
    fields: Vec<BoundField<C>>
}

impl<C> Schema<C> {
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Fields in registration order.
    pub fn fields(&self) -> &[BoundField<C>] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&BoundField<C>> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn infos(&self) -> Vec<FieldInfo> {
        self.fields.iter().map(BoundField::info).collect()
    }
}

impl<C> fmt::Debug for Schema<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("settings", &self.settings)
            .field("fields", &self.fields)
            .finish()
    }
}

/// Build the schema of `C`.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Runs the type's registration once and checks it.
///
/// ## Error Handling
/// Returns `DeclarationError` for:
/// - Invalid settings
/// - A key with an empty segment
/// - The same key registered twice
/// - A key nested under another bound key (both would own one node)
pub fn describe<C: ConfigSchema>() -> Result<Schema<C>, DeclarationError> {
    let type_name = std::any::type_name::<C>();
    let settings = C::settings();
    settings
        .validate()
        .map_err(|e| DeclarationError::InvalidSettings {
            type_name: type_name.to_string(),
            reason: e.to_string()
        })?;

    let mut table = FieldTable::new();
    C::bind(&mut table);
    let fields = table.fields;

    let mut seen = HashSet::new();
    for field in &fields {
        if field.path.validate().is_err() {
            return Err(DeclarationError::InvalidKey {
                type_name: type_name.to_string(),
                key: field.key.clone()
            });
        }
        if !seen.insert(&field.path) {
            return Err(DeclarationError::DuplicateKey {
                type_name: type_name.to_string(),
                key: field.key.clone()
            });
        }
    }

    for field in &fields {
        let parent = fields
            .iter()
            .find(|other| other.path.len() < field.path.len() && field.path.starts_with(&other.path));
        if let Some(parent) = parent {
            return Err(DeclarationError::OverlappingKeys {
                type_name: type_name.to_string(),
                key: field.key.clone(),
                parent: parent.key.clone()
            });
        }
    }

    Ok(Schema {
        type_name,
        settings,
        fields
    })
}
