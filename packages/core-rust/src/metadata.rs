//! Key/value metadata carried by a [`Tag`](crate::Tag).

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

/// Errors from converting a structured value into [`Metadata`].
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("metadata must serialize to an object, got {kind}")]
    NotAnObject { kind: &'static str },
    #[error("metadata could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Key-unique string mapping attached to a tag.
///
/// Uses `BTreeMap` so iteration (and therefore tag encoding) is deterministic
/// regardless of insertion order. Writing an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Creates an empty mapping.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Values are rendered with `Display`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.insert(key, value.to_string());
        self
    }

    /// Inserts or overwrites `key`. Returns the previous value, if any.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    /// Inserts `key` only when it is not already present.
    ///
    /// Returns `true` when the value was inserted.
    pub fn insert_if_absent(&mut self, key: &str, value: &str) -> bool {
        match self.0.entry(key.to_string()) {
            btree_map::Entry::Occupied(_) => false,
            btree_map::Entry::Vacant(slot) => {
                slot.insert(value.to_string());
                true
            }
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Flattens the top-level fields of a serializable value into metadata.
    ///
    /// `null` fields are skipped, strings are taken verbatim, numbers and
    /// booleans use their JSON rendering, and nested arrays/objects are kept
    /// as compact JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::NotAnObject`] when `value` does not serialize
    /// to a JSON object, or [`MetadataError::Serialize`] when serialization
    /// itself fails.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self, MetadataError> {
        let fields = match serde_json::to_value(value)? {
            serde_json::Value::Object(fields) => fields,
            other => {
                return Err(MetadataError::NotAnObject {
                    kind: json_kind(&other),
                })
            }
        };

        let mut metadata = Self::new();
        for (key, field) in fields {
            let rendered = match field {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            metadata.insert(key, rendered);
        }
        Ok(metadata)
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Metadata {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl<K: Into<String>, V: Into<String>> From<Vec<(K, V)>> for Metadata {
    fn from(pairs: Vec<(K, V)>) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for Metadata {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl IntoIterator for Metadata {
    type Item = (String, String);
    type IntoIter = btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Metadata {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
