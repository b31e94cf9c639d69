use std::fmt;

use serde::Serialize;

use crate::metadata::Metadata;

/// Name plus key/value metadata describing the operation in progress.
///
/// The encoded form (`Products [Action=List, Feature=Catalog]`) is what ends
/// up in SQL comments, so encoding is a pure function of the fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Tag {
    /// Logical unit (module, feature, controller) the tag represents.
    pub name: String,
    /// Key/value pairs; keys are unique.
    pub metadata: Metadata,
}

impl Tag {
    /// Creates a tag with no metadata. An empty name is allowed.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Metadata::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(name: impl Into<String>, metadata: impl Into<Metadata>) -> Self {
        Self {
            name: name.into(),
            metadata: metadata.into(),
        }
    }

    /// Sets `key`, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key, value);
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key)
    }

    /// Copies every pair from `other` whose key is not already set here.
    pub fn merge_missing(&mut self, other: &Metadata) {
        for (key, value) in other.iter() {
            self.metadata.insert_if_absent(key, value);
        }
    }

    /// Canonical string form.
    ///
    /// Returns the bare name when there is no metadata, otherwise
    /// `name [k1=v1, k2=v2]`. Keys and values are not escaped.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.metadata.is_empty() {
            return Ok(());
        }

        f.write_str(" [")?;
        for (i, (key, value)) in self.metadata.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str("]")
    }
}
