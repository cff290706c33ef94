//! Feature values for the resolution engine
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].
#![allow(clippy::return_self_not_must_use)] // Fluent builders return Self for chaining.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map;
use std::fmt;

/// A declared or resolved feature value
///
/// Well-known features are always scalars. Custom extension features such as
/// `(abc).d_e` are stored as nested mappings so they can be merged structurally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Scalar token (e.g. `OPEN`, `LEGACY_BEST_EFFORT`)
    Scalar(String),

    /// Nested mapping produced by an extension path
    Nested(FeatureSet),
}

/// Mapping of feature key to value, ordered by key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureSet {
    entries: BTreeMap<String, FeatureValue>,
}

impl FeatureValue {
    /// Create a scalar value
    pub fn scalar(token: impl Into<String>) -> Self {
        Self::Scalar(token.into())
    }

    /// The scalar token, if this is a scalar
    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            Self::Nested(_) => None,
        }
    }

    /// The nested mapping, if this is one
    pub fn as_nested(&self) -> Option<&FeatureSet> {
        match self {
            Self::Scalar(_) => None,
            Self::Nested(set) => Some(set),
        }
    }
}

impl From<&str> for FeatureValue {
    fn from(token: &str) -> Self {
        Self::Scalar(token.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(token: String) -> Self {
        Self::Scalar(token)
    }
}

impl From<FeatureSet> for FeatureValue {
    fn from(set: FeatureSet) -> Self {
        Self::Nested(set)
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(s) => f.write_str(s),
            Self::Nested(set) => write!(f, "{set}"),
        }
    }
}

impl FeatureSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set holding exactly one key
    pub fn single(key: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        let mut set = Self::new();
        set.insert(key, value);
        set
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value, replacing any previous value wholesale
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<FeatureValue>,
    ) -> Option<FeatureValue> {
        self.entries.insert(key.into(), value.into())
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<FeatureValue> {
        self.entries.remove(key)
    }

    /// Get a value by key
    pub fn get(&self, key: &str) -> Option<&FeatureValue> {
        self.entries.get(key)
    }

    /// Get a scalar token by key
    pub fn get_scalar(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(FeatureValue::as_scalar)
    }

    /// Follow a key path through nested mappings (e.g. `["(abc)", "d_e"]`)
    pub fn get_path(&self, path: &[&str]) -> Option<&FeatureValue> {
        let (first, rest) = path.split_first()?;
        let mut current = self.get(first)?;
        for key in rest {
            current = current.as_nested()?.get(key)?;
        }
        Some(current)
    }

    /// Check if a key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of top-level keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set has no keys
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Iterate over entries in key order
    pub fn iter(&self) -> btree_map::Iter<'_, String, FeatureValue> {
        self.entries.iter()
    }

    /// Deep-merge `overrides` into this set.
    ///
    /// Where both sides hold a nested mapping for a key the mappings merge
    /// recursively; in every other case the override replaces the base value.
    /// Keys that only exist in `self` are kept.
    pub fn merge(&mut self, overrides: &FeatureSet) {
        for (key, value) in &overrides.entries {
            if let (Some(FeatureValue::Nested(base)), FeatureValue::Nested(nested)) =
                (self.entries.get_mut(key), value)
            {
                base.merge(nested);
                continue;
            }
            self.entries.insert(key.clone(), value.clone());
        }
    }

    /// Non-mutating form of [`FeatureSet::merge`]
    pub fn merged(&self, overrides: &FeatureSet) -> FeatureSet {
        let mut result = self.clone();
        result.merge(overrides);
        result
    }
}

impl<'a> IntoIterator for &'a FeatureSet {
    type Item = (&'a String, &'a FeatureValue);
    type IntoIter = btree_map::Iter<'a, String, FeatureValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for FeatureSet
where
    K: Into<String>,
    V: Into<FeatureValue>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = Self::new();
        for (key, value) in iter {
            set.insert(key, value);
        }
        set
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}
