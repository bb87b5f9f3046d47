//! The remote API's request/response struct graph.
//!
//! Every field of an [`ApiStruct`] is a [`Field`]: either absent or present
//! with a value. A present zero (`Present(Int64(0))`) and an omitted field
//! (`Absent`) are different requests to most remote APIs, so the distinction
//! is carried in the type instead of being inferred from sentinel values.

use std::collections::BTreeMap;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

/// Presence of an optional field.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    /// The field is omitted.
    #[default]
    Absent,
    /// The field is present with a value (which may be a zero value).
    Present(T),
}

impl<T> Field<T> {
    /// Whether the field is present.
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    /// Whether the field is absent.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// Borrow the value.
    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Self::Present(v) => Field::Present(v),
            Self::Absent => Field::Absent,
        }
    }

    /// Convert into an `Option`.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Self::Present(v),
            None => Self::Absent,
        }
    }
}

/// A value in the struct graph.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiValue {
    /// A string.
    String(String),
    /// A 64-bit signed integer.
    Int64(i64),
    /// A 64-bit unsigned integer.
    UInt64(u64),
    /// A 64-bit float.
    Float64(f64),
    /// A boolean.
    Bool(bool),
    /// An array.
    List(Vec<ApiValue>),
    /// A string-keyed map.
    Map(BTreeMap<String, ApiValue>),
    /// A nested struct.
    Struct(ApiStruct),
}

impl ApiValue {
    /// A short name for the kind of value, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int64(_) => "int64",
            Self::UInt64(_) => "uint64",
            Self::Float64(_) => "float64",
            Self::Bool(_) => "bool",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Struct(_) => "struct",
        }
    }

    /// Render as JSON, omitting absent struct fields.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::from(s.as_str()),
            Self::Int64(n) => serde_json::Value::from(*n),
            Self::UInt64(n) => serde_json::Value::from(*n),
            Self::Float64(n) => serde_json::Value::from(*n),
            Self::Bool(b) => serde_json::Value::from(*b),
            Self::List(items) => items.iter().map(ApiValue::to_json).collect(),
            Self::Map(entries) => serde_json::Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Self::Struct(s) => s.to_json(),
        }
    }
}

impl Serialize for ApiValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::String(s) => serializer.serialize_str(s),
            Self::Int64(n) => serializer.serialize_i64(*n),
            Self::UInt64(n) => serializer.serialize_u64(*n),
            Self::Float64(n) => serializer.serialize_f64(*n),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::List(items) => items.serialize(serializer),
            Self::Map(entries) => entries.serialize(serializer),
            Self::Struct(s) => s.serialize(serializer),
        }
    }
}

/// A request or response struct, keyed by API field name.
///
/// Two structs are equal when they have the same present fields; an explicit
/// `Absent` entry equals a field that was never set.
#[derive(Debug, Clone, Default)]
pub struct ApiStruct {
    fields: BTreeMap<String, Field<ApiValue>>,
}

impl ApiStruct {
    /// Create an empty struct with every field absent.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field's presence explicitly.
    pub fn set(&mut self, name: impl Into<String>, field: Field<ApiValue>) {
        self.fields.insert(name.into(), field);
    }

    /// Set a field to a present value.
    pub fn insert(&mut self, name: impl Into<String>, value: ApiValue) {
        self.set(name, Field::Present(value));
    }

    /// Builder form of [`ApiStruct::insert`].
    pub fn with(mut self, name: impl Into<String>, value: ApiValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Look up a field. Fields never set are absent.
    pub fn get(&self, name: &str) -> Field<&ApiValue> {
        match self.fields.get(name) {
            Some(field) => field.as_ref(),
            None => Field::Absent,
        }
    }

    /// Iterate over present fields.
    pub fn present(&self) -> impl Iterator<Item = (&str, &ApiValue)> {
        self.fields.iter().filter_map(|(name, field)| match field {
            Field::Present(v) => Some((name.as_str(), v)),
            Field::Absent => None,
        })
    }

    /// Number of present fields.
    pub fn present_len(&self) -> usize {
        self.present().count()
    }

    /// Render as a JSON object containing only present fields.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.present()
                .map(|(name, value)| (name.to_string(), value.to_json()))
                .collect(),
        )
    }
}

impl PartialEq for ApiStruct {
    fn eq(&self, other: &Self) -> bool {
        self.present().eq(other.present())
    }
}

impl Serialize for ApiStruct {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.present_len()))?;
        for (name, value) in self.present() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
