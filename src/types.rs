//! The declarative attribute tree.
//!
//! A resource's user-declared configuration is an [`AttrMap`]: attribute names
//! mapped to [`AttrValue`]s. An attribute that is not declared is simply not in
//! the map; there is no null value.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A mapping from attribute name to value.
pub type AttrMap = BTreeMap<String, AttrValue>;

/// A single value in the declarative attribute tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    /// A boolean value.
    Bool(bool),
    /// A platform integer. Narrowed or widened by the marshaler to the
    /// width the target field declares.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string value.
    String(String),
    /// An ordered sequence.
    List(Vec<AttrValue>),
    /// An unordered, value-deduplicated set.
    Set(AttrSet),
    /// A nested mapping.
    Map(AttrMap),
}

impl AttrValue {
    /// Create a string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Create a list value.
    pub fn list(values: impl IntoIterator<Item = AttrValue>) -> Self {
        Self::List(values.into_iter().collect())
    }

    /// Create a set value, dropping duplicates.
    pub fn set(values: impl IntoIterator<Item = AttrValue>) -> Self {
        Self::Set(values.into_iter().collect())
    }

    /// Create a nested mapping from `(name, value)` pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, AttrValue)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// A short name for the kind of value, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Set(_) => "set",
            Self::Map(_) => "map",
        }
    }

    /// Borrow as a string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow as a nested mapping, if this is one.
    pub fn as_map(&self) -> Option<&AttrMap> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

/// An unordered collection of distinct values.
///
/// Insertion order is kept for iteration but ignored by equality.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<AttrValue>", into = "Vec<AttrValue>")]
pub struct AttrSet {
    items: Vec<AttrValue>,
}

impl AttrSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value. Returns `false` if an equal value was already present.
    pub fn insert(&mut self, value: AttrValue) -> bool {
        if self.items.contains(&value) {
            return false;
        }
        self.items.push(value);
        true
    }

    /// Whether the set contains a value equal to `value`.
    pub fn contains(&self, value: &AttrValue) -> bool {
        self.items.contains(value)
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over the values.
    pub fn iter(&self) -> std::slice::Iter<'_, AttrValue> {
        self.items.iter()
    }
}

impl PartialEq for AttrSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|v| other.contains(v))
    }
}

impl FromIterator<AttrValue> for AttrSet {
    fn from_iter<I: IntoIterator<Item = AttrValue>>(iter: I) -> Self {
        let mut set = AttrSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl From<Vec<AttrValue>> for AttrSet {
    fn from(values: Vec<AttrValue>) -> Self {
        values.into_iter().collect()
    }
}

impl From<AttrSet> for Vec<AttrValue> {
    fn from(set: AttrSet) -> Self {
        set.items
    }
}

impl<'a> IntoIterator for &'a AttrSet {
    type Item = &'a AttrValue;
    type IntoIter = std::slice::Iter<'a, AttrValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_deduplicates() {
        let set = AttrSet::from(vec!["a".into(), "b".into(), "a".into()]);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&"a".into()));
        assert!(set.contains(&"b".into()));
    }

    #[test]
    fn test_set_equality_ignores_order() {
        let left = AttrValue::set(["sg-1".into(), "sg-2".into()]);
        let right = AttrValue::set(["sg-2".into(), "sg-1".into()]);
        assert_eq!(left, right);

        let list_left = AttrValue::list(["sg-1".into(), "sg-2".into()]);
        let list_right = AttrValue::list(["sg-2".into(), "sg-1".into()]);
        assert_ne!(list_left, list_right);
    }

    #[test]
    fn test_set_insert_reports_duplicates() {
        let mut set = AttrSet::new();
        assert!(set.insert(AttrValue::Int(1)));
        assert!(!set.insert(AttrValue::Int(1)));
        assert!(set.insert(AttrValue::Int(2)));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(AttrValue::from(true).type_name(), "bool");
        assert_eq!(AttrValue::from(3).type_name(), "int");
        assert_eq!(AttrValue::from("x").type_name(), "string");
        assert_eq!(AttrValue::map([("k", AttrValue::Int(1))]).type_name(), "map");
    }

    #[test]
    fn test_deserialize_from_json() {
        let value: AttrValue = serde_json::from_value(serde_json::json!({
            "name": "web",
            "count": 2,
            "ratio": 0.5,
            "ids": ["a", "b"]
        }))
        .unwrap();

        let map = value.as_map().unwrap();
        assert_eq!(map["name"], AttrValue::string("web"));
        assert_eq!(map["count"], AttrValue::Int(2));
        assert_eq!(map["ratio"], AttrValue::Float(0.5));
        assert_eq!(map["ids"], AttrValue::list(["a".into(), "b".into()]));
    }
}
