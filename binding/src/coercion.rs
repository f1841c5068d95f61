//! # Type Coercion
//!
//! Bidirectional conversion between raw document values and the declared
//! types of bound fields.
//!
//! Primitive types go through dedicated, lenient scalar extraction (a
//! quoted `"8080"` still reads as an integer). Containers recurse through
//! their element types, so a `Vec<String>` is converted element-wise.
//! Anything else that implements serde can opt in with
//! [`bindable_via_serde!`](crate::bindable_via_serde), which routes through
//! `serde_yaml`'s structural converter.

use crate::document::Node;
use errors::CoercionError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Number, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Semantic type of a bound field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    Text,
    Integer,
    Long,
    Unsigned,
    Boolean,
    Double,
    Float,
    List(Box<TypeDescriptor>),
    Map(Box<TypeDescriptor>, Box<TypeDescriptor>),
    Optional(Box<TypeDescriptor>),
    Structured(&'static str),
    Any
}

impl TypeDescriptor {
    /// Primitive types read through direct scalar extraction.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeDescriptor::Text
                | TypeDescriptor::Integer
                | TypeDescriptor::Long
                | TypeDescriptor::Unsigned
                | TypeDescriptor::Boolean
                | TypeDescriptor::Double
                | TypeDescriptor::Float
        )
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDescriptor::Text => f.write_str("text"),
            TypeDescriptor::Integer => f.write_str("integer"),
            TypeDescriptor::Long => f.write_str("long"),
            TypeDescriptor::Unsigned => f.write_str("unsigned"),
            TypeDescriptor::Boolean => f.write_str("boolean"),
            TypeDescriptor::Double => f.write_str("double"),
            TypeDescriptor::Float => f.write_str("float"),
            TypeDescriptor::List(element) => write!(f, "list<{}>", element),
            TypeDescriptor::Map(key, value) => write!(f, "map<{}, {}>", key, value),
            TypeDescriptor::Optional(inner) => write!(f, "optional<{}>", inner),
            TypeDescriptor::Structured(name) => f.write_str(name),
            TypeDescriptor::Any => f.write_str("any")
        }
    }
}

/// A type that can be stored in and read back from a document node.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Acts as the converter registry keyed by Rust type: every implementation
/// knows its [`TypeDescriptor`] and how to cross the node boundary in both
/// directions. The write direction lives in the [`ToNode`] supertrait.
///
/// ## Usage
/// ```rust
/// use binding::{Bindable, TypeDescriptor, Value};
///
/// let node = Value::from(vec!["a", "b"]);
/// let list = Vec::<String>::from_node(&node).unwrap();
/// assert_eq!(list, vec!["a".to_string(), "b".to_string()]);
/// assert_eq!(Vec::<String>::descriptor().to_string(), "list<text>");
/// ```
pub trait Bindable: ToNode + Sized {
    fn descriptor() -> TypeDescriptor;

    fn from_node(value: &Value) -> Result<Self, CoercionError>;
}

/// Write half of [`Bindable`].
///
/// Also implemented for `str`, so borrowed text can be written with
/// [`BoundConfig::set`](crate::BoundConfig::set) without an allocation at
/// the call site.
pub trait ToNode {
    fn to_node(&self) -> Result<Value, CoercionError>;
}

/// Short name of a raw value's shape, used in error messages.
pub fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value"
    }
}

/// Value written to a node when the field has nothing to seed.
///
/// Absent values become an empty mapping so the node always materializes.
pub fn seed_value(value: Value) -> Value {
    match value {
        Value::Null => Value::Mapping(Mapping::new()),
        other => other
    }
}

/// Read a node as `T`.
///
/// `Ok(None)` when the node is virtual or holds nothing; callers treat an
/// `Err` the same way after logging it.
pub fn read<T: Bindable>(node: &Node<'_>) -> Result<Option<T>, CoercionError> {
    match node.raw() {
        Some(raw) => T::from_node(raw).map(Some),
        None => Ok(None)
    }
}

fn untagged(value: &Value) -> &Value {
    match value {
        Value::Tagged(tagged) => untagged(&tagged.value),
        other => other
    }
}

pub fn extract_string(value: &Value) -> Option<String> {
    match untagged(value) {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None
    }
}

pub fn extract_i64(value: &Value) -> Option<i64> {
    match untagged(value) {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None
    }
}

pub fn extract_u64(value: &Value) -> Option<u64> {
    match untagged(value) {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None
    }
}

pub fn extract_f64(value: &Value) -> Option<f64> {
    match untagged(value) {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None
    }
}

pub fn extract_bool(value: &Value) -> Option<bool> {
    match untagged(value) {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None
        },
        _ => None
    }
}

impl ToNode for str {
    fn to_node(&self) -> Result<Value, CoercionError> {
        Ok(Value::String(self.to_string()))
    }
}

impl<T: ToNode + ?Sized> ToNode for &T {
    fn to_node(&self) -> Result<Value, CoercionError> {
        (**self).to_node()
    }
}

impl ToNode for String {
    fn to_node(&self) -> Result<Value, CoercionError> {
        Ok(Value::String(self.clone()))
    }
}

impl Bindable for String {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Text
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        extract_string(value).ok_or_else(|| CoercionError::mismatch(Self::descriptor(), kind_of(value)))
    }
}

impl ToNode for bool {
    fn to_node(&self) -> Result<Value, CoercionError> {
        Ok(Value::Bool(*self))
    }
}

impl Bindable for bool {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Boolean
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        extract_bool(value).ok_or_else(|| CoercionError::mismatch(Self::descriptor(), kind_of(value)))
    }
}

macro_rules! bindable_signed {
    ($($ty:ty => $descriptor:ident),+ $(,)?) => {$(
        impl ToNode for $ty {
            fn to_node(&self) -> Result<Value, CoercionError> {
                Ok(Value::Number(Number::from(*self as i64)))
            }
        }

        impl Bindable for $ty {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::$descriptor
            }

            fn from_node(value: &Value) -> Result<Self, CoercionError> {
                let wide = extract_i64(value)
                    .ok_or_else(|| CoercionError::mismatch(Self::descriptor(), kind_of(value)))?;
                <$ty>::try_from(wide).map_err(|_| CoercionError::out_of_range(Self::descriptor(), wide))
            }
        }
    )+};
}

macro_rules! bindable_unsigned {
    ($($ty:ty),+ $(,)?) => {$(
        impl ToNode for $ty {
            fn to_node(&self) -> Result<Value, CoercionError> {
                Ok(Value::Number(Number::from(*self as u64)))
            }
        }

        impl Bindable for $ty {
            fn descriptor() -> TypeDescriptor {
                TypeDescriptor::Unsigned
            }

            fn from_node(value: &Value) -> Result<Self, CoercionError> {
                let wide = extract_u64(value)
                    .ok_or_else(|| CoercionError::mismatch(Self::descriptor(), kind_of(value)))?;
                <$ty>::try_from(wide).map_err(|_| CoercionError::out_of_range(Self::descriptor(), wide))
            }
        }
    )+};
}

bindable_signed!(i8 => Integer, i16 => Integer, i32 => Integer, i64 => Long, isize => Long);
bindable_unsigned!(u8, u16, u32, u64, usize);

impl ToNode for f64 {
    fn to_node(&self) -> Result<Value, CoercionError> {
        Ok(Value::Number(Number::from(*self)))
    }
}

impl Bindable for f64 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Double
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        extract_f64(value).ok_or_else(|| CoercionError::mismatch(Self::descriptor(), kind_of(value)))
    }
}

impl ToNode for f32 {
    fn to_node(&self) -> Result<Value, CoercionError> {
        Ok(Value::Number(Number::from(f64::from(*self))))
    }
}

impl Bindable for f32 {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Float
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        let wide = extract_f64(value)
            .ok_or_else(|| CoercionError::mismatch(Self::descriptor(), kind_of(value)))?;
        if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
            return Err(CoercionError::out_of_range(Self::descriptor(), wide));
        }
        Ok(wide as f32)
    }
}

impl ToNode for Value {
    fn to_node(&self) -> Result<Value, CoercionError> {
        Ok(self.clone())
    }
}

impl Bindable for Value {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Any
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        Ok(value.clone())
    }
}

impl<T: ToNode> ToNode for Option<T> {
    fn to_node(&self) -> Result<Value, CoercionError> {
        match self {
            Some(inner) => inner.to_node(),
            None => Ok(Value::Null)
        }
    }
}

impl<T: Bindable> Bindable for Option<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Optional(Box::new(T::descriptor()))
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        match untagged(value) {
            Value::Null => Ok(None),
            _ => T::from_node(value).map(Some)
        }
    }
}

impl<T: ToNode> ToNode for Vec<T> {
    fn to_node(&self) -> Result<Value, CoercionError> {
        self.iter()
            .map(ToNode::to_node)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Sequence)
    }
}

impl<T: Bindable> Bindable for Vec<T> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::List(Box::new(T::descriptor()))
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        match untagged(value) {
            Value::Sequence(items) => items.iter().map(T::from_node).collect(),
            other => Err(CoercionError::mismatch(Self::descriptor(), kind_of(other)))
        }
    }
}

fn map_entries<V: Bindable>(
    value: &Value,
    expected: TypeDescriptor
) -> Result<Vec<(String, V)>, CoercionError> {
    let Value::Mapping(mapping) = untagged(value) else {
        return Err(CoercionError::mismatch(expected, kind_of(value)));
    };
    mapping
        .iter()
        .map(|(k, v)| {
            let key = extract_string(k).ok_or_else(|| CoercionError::mismatch("text key", kind_of(k)))?;
            Ok((key, V::from_node(v)?))
        })
        .collect()
}

impl<V: ToNode> ToNode for BTreeMap<String, V> {
    fn to_node(&self) -> Result<Value, CoercionError> {
        let mut mapping = Mapping::new();
        for (key, value) in self {
            mapping.insert(Value::String(key.clone()), value.to_node()?);
        }
        Ok(Value::Mapping(mapping))
    }
}

impl<V: Bindable> Bindable for BTreeMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map(Box::new(TypeDescriptor::Text), Box::new(V::descriptor()))
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        Ok(map_entries(value, Self::descriptor())?.into_iter().collect())
    }
}

// Sorted so the rendered document does not churn between saves.
impl<V: ToNode> ToNode for HashMap<String, V> {
    fn to_node(&self) -> Result<Value, CoercionError> {
        let mut keys: Vec<&String> = self.keys().collect();
        keys.sort();
        let mut mapping = Mapping::new();
        for key in keys {
            mapping.insert(Value::String(key.clone()), self[key].to_node()?);
        }
        Ok(Value::Mapping(mapping))
    }
}

impl<V: Bindable> Bindable for HashMap<String, V> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::Map(Box::new(TypeDescriptor::Text), Box::new(V::descriptor()))
    }

    fn from_node(value: &Value) -> Result<Self, CoercionError> {
        Ok(map_entries(value, Self::descriptor())?.into_iter().collect())
    }
}

/// Structural conversion of a serde type into a node value.
pub fn serialize_structured<T: Serialize>(value: &T) -> Result<Value, CoercionError> {
    serde_yaml::to_value(value).map_err(|e| CoercionError::Unrepresentable {
        reason: e.to_string()
    })
}

/// Structural conversion of a node value into a serde type.
pub fn deserialize_structured<T: DeserializeOwned>(
    value: &Value,
    type_name: &str
) -> Result<T, CoercionError> {
    serde_yaml::from_value(value.clone())
        .map_err(|e| CoercionError::mismatch(type_name, format!("{} ({})", kind_of(value), e)))
}

/// Implement [`Bindable`] and [`ToNode`] for serde types through the structural converter.
///
/// ```rust
/// use binding::{Bindable, Value, bindable_via_serde};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// #[serde(rename_all = "lowercase")]
/// enum Difficulty {
///     Easy,
///     Hard
/// }
///
/// bindable_via_serde!(Difficulty);
///
/// let node = Value::String("hard".to_string());
/// assert_eq!(Difficulty::from_node(&node).unwrap(), Difficulty::Hard);
/// ```
#[macro_export]
macro_rules! bindable_via_serde {
    ($($ty:ty),+ $(,)?) => {$(
        impl $crate::ToNode for $ty {
            fn to_node(&self) -> ::std::result::Result<$crate::Value, $crate::CoercionError> {
                $crate::coercion::serialize_structured(self)
            }
        }

        impl $crate::Bindable for $ty {
            fn descriptor() -> $crate::TypeDescriptor {
                $crate::TypeDescriptor::Structured(stringify!($ty))
            }

            fn from_node(value: &$crate::Value) -> ::std::result::Result<Self, $crate::CoercionError> {
                $crate::coercion::deserialize_structured(value, stringify!($ty))
            }
        }
    )+};
}
