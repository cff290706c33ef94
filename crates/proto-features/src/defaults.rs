//! Feature defaults per edition or syntax

use crate::{Error, Result};
use proto_ir::FeatureSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const ENUM_TYPE: &str = "enum_type";
pub const FIELD_PRESENCE: &str = "field_presence";
pub const JSON_FORMAT: &str = "json_format";
pub const MESSAGE_ENCODING: &str = "message_encoding";
pub const REPEATED_FIELD_ENCODING: &str = "repeated_field_encoding";
pub const UTF8_VALIDATION: &str = "utf8_validation";

/// Keys present in every resolved feature set
pub const WELL_KNOWN_FEATURES: [&str; 6] = [
    ENUM_TYPE,
    FIELD_PRESENCE,
    JSON_FORMAT,
    MESSAGE_ENCODING,
    REPEATED_FIELD_ENCODING,
    UTF8_VALIDATION,
];

/// Editions with a defaults row. `proto2` and `proto3` are treated as
/// pseudo-editions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Edition {
    #[serde(rename = "proto2")]
    Proto2,
    #[serde(rename = "proto3")]
    Proto3,
    #[serde(rename = "2023")]
    Edition2023,
}

impl Edition {
    pub const ALL: [Edition; 3] = [Edition::Proto2, Edition::Proto3, Edition::Edition2023];

    /// Identifier as written in `syntax = ...;` or `edition = ...;`
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Edition::Proto2 => "proto2",
            Edition::Proto3 => "proto3",
            Edition::Edition2023 => "2023",
        }
    }

    /// Whether this comes from a `syntax` statement rather than `edition`
    #[must_use]
    pub fn is_syntax(self) -> bool {
        matches!(self, Edition::Proto2 | Edition::Proto3)
    }

    /// The defaults row, in [`WELL_KNOWN_FEATURES`] order
    #[must_use]
    pub fn default_row(self) -> [&'static str; 6] {
        match self {
            Edition::Proto2 => [
                "CLOSED",
                "EXPLICIT",
                "LEGACY_BEST_EFFORT",
                "LENGTH_PREFIXED",
                "EXPANDED",
                "NONE",
            ],
            Edition::Proto3 => [
                "OPEN",
                "IMPLICIT",
                "ALLOW",
                "LENGTH_PREFIXED",
                "PACKED",
                "VERIFY",
            ],
            Edition::Edition2023 => [
                "OPEN",
                "EXPLICIT",
                "ALLOW",
                "LENGTH_PREFIXED",
                "PACKED",
                "VERIFY",
            ],
        }
    }

    /// Baseline feature set for this edition
    #[must_use]
    pub fn defaults(self) -> FeatureSet {
        WELL_KNOWN_FEATURES
            .into_iter()
            .zip(self.default_row())
            .collect()
    }
}

impl FromStr for Edition {
    type Err = Error;

    fn from_str(identifier: &str) -> Result<Self> {
        let trimmed = identifier.trim().trim_matches('"');
        Edition::ALL
            .into_iter()
            .find(|e| e.as_str() == trimmed)
            .ok_or_else(|| Error::UnknownEditionOrSyntax(identifier.to_string()))
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Defaults row for an edition or syntax identifier
pub fn feature_defaults(identifier: &str) -> Result<FeatureSet> {
    Ok(identifier.parse::<Edition>()?.defaults())
}
