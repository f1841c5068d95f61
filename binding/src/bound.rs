//! # Bound Configuration Lifecycle
//!
//! Owns one configuration instance, its document and its backing file.
//!
//! # Concurrency
//! Document and instance live behind one `parking_lot::RwLock`. `reload`,
//! `save`, `set`, `remove` and `update` hold the write lock for their whole
//! duration, file I/O included, so mutations on one file are serialized.
//! Reads share the lock and never observe a half-swapped document.
//! Separate instances never contend.

use crate::coercion::{Bindable, ToNode};
use crate::document::{Document, Node};
use crate::hydrate::{HydrationMode, HydrationReport, hydrate};
use crate::path::NodePath;
use crate::schema::{ConfigSchema, Schema, describe};
use crate::store::YamlStore;
use errors::{BindingError, DocumentError, Operation};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, warn};

struct State<C> {
    document: Document,
    value: C
}

/// A configuration instance kept in sync with its YAML file.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Entry point of the binding engine: loads a [`ConfigSchema`] type from
/// disk, seeding the file with declared defaults and comments, and exposes
/// keyed reads and writes on the underlying document.
///
/// ## Usage
/// ```rust,no_run
/// use binding::{BoundConfig, ConfigSchema, FieldTable, Settings};
///
/// #[derive(Debug, Default)]
/// struct Limits {
///     max_players: i32
/// }
///
/// impl ConfigSchema for Limits {
///     fn settings() -> Settings {
///         Settings::new("limits.yml")
///     }
///
///     fn bind(fields: &mut FieldTable<Self>) {
///         fields
///             .field("limits.max-players", |c| &c.max_players, |c| &mut c.max_players)
///             .default_value(20);
///     }
/// }
///
/// fn main() -> Result<(), binding::BindingError> {
///     let limits = BoundConfig::<Limits>::load("./data")?;
///     println!("max players: {}", limits.read().max_players);
///     limits.set("limits.max-players", 40)?;
///     limits.reload()?;
///     Ok(())
/// }
/// ```
///
/// ## Error Handling
/// Declaration and I/O failures abort the operation and carry the file path
/// and operation name. Values that fail to convert during hydration are
/// logged and leave the field unchanged.
pub struct BoundConfig<C> {
    store: YamlStore,
    schema: Schema<C>,
    state: RwLock<State<C>>
}

impl<C: ConfigSchema> BoundConfig<C> {
    /// Load `C` from its file under `base_dir`, creating the file if needed.
    ///
    /// Virtual nodes are seeded with declared defaults and comments, stored
    /// values are pulled into a fresh `C::default()`, and the document is
    /// written back.
    pub fn load(base_dir: impl AsRef<Path>) -> Result<Self, BindingError> {
        let schema = describe::<C>()?;
        let store = YamlStore::new(schema.settings().resolve(base_dir.as_ref()));
        let context = |e: crate::store::StoreError| e.with_context(Operation::Load, store.path());

        store.create_if_absent().map_err(context)?;
        let mut document = store.load().map_err(context)?;
        let mut value = C::default();

        let report = hydrate(&schema, &mut document, &mut value, HydrationMode::InitialLoad)?;
        store.save(&document).map_err(context)?;

        info!(
            path = %store.path().display(),
            type_name = schema.type_name(),
            seeded = report.seeded.len(),
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Loaded configuration"
        );

        Ok(Self {
            store,
            schema,
            state: RwLock::new(State { document, value })
        })
    }

    pub fn file_path(&self) -> &Path {
        self.store.path()
    }

    pub fn schema(&self) -> &Schema<C> {
        &self.schema
    }

    /// Shared access to the bound instance.
    ///
    /// The lock is not reentrant: calling a mutating method on this thread
    /// while the guard is alive deadlocks.
    pub fn read(&self) -> MappedRwLockReadGuard<'_, C> {
        RwLockReadGuard::map(self.state.read(), |state| &state.value)
    }

    pub fn snapshot(&self) -> C
    where
        C: Clone
    {
        self.state.read().value.clone()
    }

    /// Shared access to the current document.
    ///
    /// Same locking caveat as [`read`](Self::read).
    pub fn document(&self) -> MappedRwLockReadGuard<'_, Document> {
        RwLockReadGuard::map(self.state.read(), |state| &state.document)
    }

    /// Re-parse the file and pull its values into the instance.
    ///
    /// Keys missing from the file leave their fields at the current
    /// in-memory value. On a parse failure the previous document is kept.
    pub fn reload(&self) -> Result<HydrationReport, BindingError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        state.document = self
            .store
            .load()
            .map_err(|e| e.with_context(Operation::Reload, self.store.path()))?;
        let report = hydrate(
            &self.schema,
            &mut state.document,
            &mut state.value,
            HydrationMode::Reload
        )?;

        info!(
            path = %self.store.path().display(),
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            "Reloaded configuration"
        );
        Ok(report)
    }

    /// Write the current document to disk.
    pub fn save(&self) -> Result<(), BindingError> {
        let state = self.state.write();
        self.persist(&state.document, Operation::Save)
    }

    /// True when a value is stored at `key`.
    pub fn exists(&self, key: &str) -> bool {
        self.with_node(key, false, |node| !node.is_virtual())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.with_node(key, default.to_string(), |node| node.get_string(default))
    }

    pub fn get_int(&self, key: &str, default: i32) -> i32 {
        self.with_node(key, default, |node| node.get_int(default))
    }

    pub fn get_long(&self, key: &str, default: i64) -> i64 {
        self.with_node(key, default, |node| node.get_long(default))
    }

    pub fn get_boolean(&self, key: &str, default: bool) -> bool {
        self.with_node(key, default, |node| node.get_boolean(default))
    }

    pub fn get_double(&self, key: &str, default: f64) -> f64 {
        self.with_node(key, default, |node| node.get_double(default))
    }

    /// Typed read of any [`Bindable`] type; `None` when missing or when the
    /// stored value does not convert.
    pub fn get<T: Bindable>(&self, key: &str) -> Option<T> {
        self.with_node(key, None, |node| match node.get::<T>() {
            Ok(value) => value,
            Err(e) => {
                debug!(key, error = %e, "Stored value does not convert");
                None
            }
        })
    }

    /// Store `value` at `key` and persist the document.
    ///
    /// Bound fields are not touched; they pick the value up on the next
    /// [`reload`](Self::reload).
    pub fn set<T: ToNode>(&self, key: &str, value: T) -> Result<(), BindingError> {
        let path = NodePath::parse(key);
        let raw = value.to_node().map_err(|source| BindingError::Coercion {
            operation: Operation::Set,
            key: key.to_string(),
            path: self.store.path().to_path_buf(),
            source
        })?;

        let mut state = self.state.write();
        state
            .document
            .set(&path, raw)
            .map_err(|source| self.malformed_key(Operation::Set, key, source))?;
        self.persist(&state.document, Operation::Set)
    }

    /// Clear the value at `key` and persist the document. Clearing a key
    /// that holds nothing is a no-op apart from the write.
    pub fn remove(&self, key: &str) -> Result<(), BindingError> {
        let path = NodePath::parse(key);
        let mut state = self.state.write();
        let removed = state
            .document
            .clear(&path)
            .map_err(|source| self.malformed_key(Operation::Remove, key, source))?;
        debug!(key, removed, "Removed key");
        self.persist(&state.document, Operation::Remove)
    }

    /// Mutate the instance, write every bound field into the document and
    /// persist it.
    pub fn update<F>(&self, mutate: F) -> Result<(), BindingError>
    where
        F: FnOnce(&mut C)
    {
        let mut guard = self.state.write();
        let state = &mut *guard;
        mutate(&mut state.value);

        for field in self.schema.fields() {
            let raw = field
                .current_value(&state.value)
                .map_err(|source| BindingError::Coercion {
                    operation: Operation::Update,
                    key: field.key().to_string(),
                    path: self.store.path().to_path_buf(),
                    source
                })?;
            state
                .document
                .set(field.path(), raw)
                .map_err(|source| self.malformed_key(Operation::Update, field.key(), source))?;
        }
        self.persist(&state.document, Operation::Update)
    }

    fn persist(&self, document: &Document, operation: Operation) -> Result<(), BindingError> {
        self.store
            .save(document)
            .map_err(|e| e.with_context(operation, self.store.path()))?;
        debug!(path = %self.store.path().display(), %operation, "Saved configuration");
        Ok(())
    }

    fn with_node<R>(&self, key: &str, fallback: R, read: impl FnOnce(&Node<'_>) -> R) -> R {
        let path = NodePath::parse(key);
        let state = self.state.read();
        match state.document.node(&path) {
            Ok(node) => read(&node),
            Err(e) => {
                warn!(key, error = %e, "Malformed key; using fallback");
                fallback
            }
        }
    }

    fn malformed_key(&self, operation: Operation, key: &str, source: DocumentError) -> BindingError {
        BindingError::MalformedKey {
            operation,
            key: key.to_string(),
            path: self.store.path().to_path_buf(),
            source
        }
    }
}

impl<C> fmt::Debug for BoundConfig<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundConfig")
            .field("path", &self.store.path())
            .field("schema", &self.schema)
            .finish()
    }
}
