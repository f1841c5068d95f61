//! # YAML Configuration Binding
//!
//! Binds plain Rust structs to YAML files.
//!
//! This crate provides:
//! - Dot-separated key resolution over a YAML document tree
//! - Conversion between document nodes and declared field types
//! - Field registration with defaults and per-key comments
//! - Default seeding on first load and pull-only reloads
//! - Keyed reads and writes on the live document
//! - Hot reload driven by file system events
//!
//! # Best Practices
//!
//! - Uses `validator` crate for file placement validation
//! - Structured `tracing` events for every lifecycle step
//! - Thread-safe configuration access through `parking_lot` locks

pub mod bound;
pub mod coercion;
pub mod document;
pub mod hot_reload;
pub mod hydrate;
pub mod path;
pub mod schema;
pub mod store;

pub use bound::BoundConfig;
pub use coercion::{Bindable, ToNode, TypeDescriptor};
pub use document::{Document, Node};
pub use errors::{BindingError, CoercionError, DeclarationError, DocumentError, Operation};
pub use hot_reload::{ConfigReloadEvent, watch_bound_config};
pub use hydrate::{HydrationMode, HydrationReport, SkippedField, hydrate};
pub use path::NodePath;
pub use schema::{
    BoundField, ConfigSchema, FieldBuilder, FieldInfo, FieldTable, Schema, Settings, describe,
};
pub use serde_yaml::Value;
pub use store::YamlStore;
pub use validator::Validate;
