//! Raw option store
//!
//! Captures `option features.* = v;` statements and inline `[features.* = v]`
//! options exactly as declared, normalized into the nested [`FeatureSet`] shape the
//! resolver merges. Block statements and inline brackets share one precedence tier:
//! both land in the same per-entity store, later declarations winning.

use crate::feature::{FeatureSet, FeatureValue};
use crate::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::trace;

/// Leading path segment that marks an option as a feature
pub const FEATURES_OPTION: &str = "features";

static SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\(\.?[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*\)|[A-Za-z_][A-Za-z0-9_]*)$")
        .expect("option segment pattern is valid")
});

/// Options declared directly on one entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredOptions {
    /// Normalized `features.*` options
    features: FeatureSet,

    /// Every other option, keyed by its path as written
    plain: BTreeMap<String, String>,
}

impl DeclaredOptions {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one option statement.
    ///
    /// `features.*` paths are normalized and deep-merged into the feature set;
    /// anything else is kept verbatim as a plain option.
    pub fn declare(&mut self, path: &str, value: &str) -> Result<()> {
        match normalize_feature_option(path, value)? {
            Some(features) => {
                trace!("declared feature option {} = {}", path, value);
                self.features.merge(&features);
            }
            None => {
                split_path(path)?;
                self.plain.insert(path.trim().to_string(), unquote(value));
            }
        }
        Ok(())
    }

    /// The entity's own feature options
    #[must_use]
    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Plain (non-feature) options
    #[must_use]
    pub fn plain(&self) -> &BTreeMap<String, String> {
        &self.plain
    }

    /// Get a plain option by path
    #[must_use]
    pub fn get_plain(&self, path: &str) -> Option<&str> {
        self.plain.get(path).map(String::as_str)
    }

    /// Whether nothing was declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty() && self.plain.is_empty()
    }
}

/// Normalize a single option statement into a one-key feature mapping.
///
/// `features.json_format = v` becomes `{json_format: v}` and
/// `features.(abc).d_e = v` becomes `{(abc): {d_e: v}}`. Returns `None` when the
/// path does not name a feature.
pub fn normalize_feature_option(path: &str, value: &str) -> Result<Option<FeatureSet>> {
    let segments = split_path(path)?;
    let Some((head, keys)) = segments.split_first() else {
        return Err(Error::invalid_option_path(path, "empty path"));
    };
    if *head != FEATURES_OPTION {
        return Ok(None);
    }

    let Some((first, nested)) = keys.split_first() else {
        return Err(Error::invalid_option_path(path, "missing feature name"));
    };

    let mut leaf = FeatureValue::Scalar(unquote(value));
    for key in nested.iter().rev() {
        leaf = FeatureValue::Nested(FeatureSet::single(*key, leaf));
    }

    Ok(Some(FeatureSet::single(*first, leaf)))
}

/// Split a dotted option path, keeping parenthesized extension names whole
fn split_path(path: &str) -> Result<Vec<&str>> {
    let path = path.trim();
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in path.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::invalid_option_path(path, "unbalanced ')'"))?;
            }
            '.' if depth == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::invalid_option_path(path, "unbalanced '('"));
    }
    segments.push(&path[start..]);

    for segment in &segments {
        if segment.is_empty() {
            return Err(Error::invalid_option_path(path, "empty segment"));
        }
        if !SEGMENT.is_match(segment) {
            return Err(Error::invalid_option_path(
                path,
                format!("invalid segment '{segment}'"),
            ));
        }
    }

    Ok(segments)
}

fn unquote(value: &str) -> String {
    let value = value.trim();
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_key() {
        let set = normalize_feature_option("features.json_format", "LEGACY_BEST_EFFORT")
            .unwrap()
            .unwrap();
        assert_eq!(set, FeatureSet::single("json_format", "LEGACY_BEST_EFFORT"));
    }

    #[test]
    fn test_extension_path_nests() {
        let set = normalize_feature_option("features.(abc).d_e", "deeply_nested_false")
            .unwrap()
            .unwrap();
        assert_eq!(
            set,
            FeatureSet::single("(abc)", FeatureSet::single("d_e", "deeply_nested_false"))
        );
    }

    #[test]
    fn test_dotted_extension_name_stays_whole() {
        let set = normalize_feature_option("features.(foo.bar).a.b", "x")
            .unwrap()
            .unwrap();
        assert_eq!(set.keys().collect::<Vec<_>>(), vec!["(foo.bar)"]);
        assert_eq!(
            set.get_path(&["(foo.bar)", "a", "b"]),
            Some(&FeatureValue::from("x"))
        );
    }

    #[test]
    fn test_non_feature_option() {
        assert!(normalize_feature_option("java_package", "\"com.example\"")
            .unwrap()
            .is_none());
        assert!(normalize_feature_option("(mo_single_msg).nested.value", "x")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["features", "features.", "features..x", "features.(abc", "features.abc)", "features.1abc", ""] {
            let result = normalize_feature_option(path, "v");
            assert!(
                matches!(result, Err(Error::InvalidOptionPath { .. })),
                "expected InvalidOptionPath for {path:?}, got {result:?}"
            );
        }
    }

    #[test]
    fn test_declare_merges_statements() {
        let mut options = DeclaredOptions::new();
        options.declare("features.(abc).d_e", "one").unwrap();
        options.declare("features.(abc).f", "two").unwrap();
        options.declare("features.(abc).d_e", "three").unwrap();
        options.declare("features.enum_type", "CLOSED").unwrap();

        let features = options.features();
        assert_eq!(features.get_path(&["(abc)", "d_e"]), Some(&FeatureValue::from("three")));
        assert_eq!(features.get_path(&["(abc)", "f"]), Some(&FeatureValue::from("two")));
        assert_eq!(features.get_scalar("enum_type"), Some("CLOSED"));
    }

    #[test]
    fn test_plain_options_are_kept() {
        let mut options = DeclaredOptions::new();
        options.declare("java_package", "\"com.example\"").unwrap();
        options.declare("deprecated", "true").unwrap();

        assert!(options.features().is_empty());
        assert_eq!(options.get_plain("java_package"), Some("com.example"));
        assert_eq!(options.get_plain("deprecated"), Some("true"));
        assert!(!options.is_empty());
    }

    #[test]
    fn test_quoted_feature_value() {
        let set = normalize_feature_option("features.(mo).value", "\"x\"")
            .unwrap()
            .unwrap();
        assert_eq!(set.get_path(&["(mo)", "value"]), Some(&FeatureValue::from("x")));
    }
}
