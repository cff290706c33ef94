//! Typed view over the six well-known features

use crate::defaults::{
    ENUM_TYPE, FIELD_PRESENCE, JSON_FORMAT, MESSAGE_ENCODING, REPEATED_FIELD_ENCODING,
    UTF8_VALIDATION,
};
use crate::{Error, Result};
use proto_ir::FeatureSet;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! feature_enum {
    ($(#[$meta:meta])* $name:ident, $key:expr, { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $token)]
                $variant,
            )+
        }

        impl $name {
            /// Feature key this enum is read from
            pub const KEY: &'static str = $key;

            /// Parse the token written in an option statement
            pub fn parse(token: &str) -> Result<Self> {
                match token {
                    $($token => Ok(Self::$variant),)+
                    other => Err(Error::invalid_feature_value($key, other)),
                }
            }

            /// Token as written in an option statement
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $token,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

feature_enum!(
    /// `enum_type`
    EnumType, ENUM_TYPE, {
        Open => "OPEN",
        Closed => "CLOSED",
    }
);

feature_enum!(
    /// `field_presence`
    FieldPresence, FIELD_PRESENCE, {
        Explicit => "EXPLICIT",
        Implicit => "IMPLICIT",
        LegacyRequired => "LEGACY_REQUIRED",
    }
);

feature_enum!(
    /// `json_format`
    JsonFormat, JSON_FORMAT, {
        Allow => "ALLOW",
        LegacyBestEffort => "LEGACY_BEST_EFFORT",
    }
);

feature_enum!(
    /// `message_encoding`
    MessageEncoding, MESSAGE_ENCODING, {
        LengthPrefixed => "LENGTH_PREFIXED",
        Delimited => "DELIMITED",
    }
);

feature_enum!(
    /// `repeated_field_encoding`
    RepeatedFieldEncoding, REPEATED_FIELD_ENCODING, {
        Packed => "PACKED",
        Expanded => "EXPANDED",
    }
);

feature_enum!(
    /// `utf8_validation`
    Utf8Validation, UTF8_VALIDATION, {
        Verify => "VERIFY",
        None => "NONE",
    }
);

/// The well-known part of a resolved feature set.
///
/// Custom (parenthesized) features are not represented here; read them from the
/// [`FeatureSet`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WellKnownFeatures {
    pub enum_type: EnumType,
    pub field_presence: FieldPresence,
    pub json_format: JsonFormat,
    pub message_encoding: MessageEncoding,
    pub repeated_field_encoding: RepeatedFieldEncoding,
    pub utf8_validation: Utf8Validation,
}

impl WellKnownFeatures {
    /// Read the six well-known keys out of a resolved set.
    ///
    /// Fails with [`Error::MissingFeature`] if a key is absent (only possible for a
    /// set that did not come from the resolver) and with
    /// [`Error::InvalidFeatureValue`] for a token outside the key's value space.
    pub fn from_set(features: &FeatureSet) -> Result<Self> {
        Ok(Self {
            enum_type: EnumType::parse(scalar(features, EnumType::KEY)?)?,
            field_presence: FieldPresence::parse(scalar(features, FieldPresence::KEY)?)?,
            json_format: JsonFormat::parse(scalar(features, JsonFormat::KEY)?)?,
            message_encoding: MessageEncoding::parse(scalar(features, MessageEncoding::KEY)?)?,
            repeated_field_encoding: RepeatedFieldEncoding::parse(scalar(
                features,
                RepeatedFieldEncoding::KEY,
            )?)?,
            utf8_validation: Utf8Validation::parse(scalar(features, Utf8Validation::KEY)?)?,
        })
    }

    /// Repeated scalar fields use the packed wire encoding
    #[must_use]
    pub fn is_packed(&self) -> bool {
        self.repeated_field_encoding == RepeatedFieldEncoding::Packed
    }

    /// Singular fields track presence (explicit or legacy required)
    #[must_use]
    pub fn has_explicit_presence(&self) -> bool {
        self.field_presence != FieldPresence::Implicit
    }

    #[must_use]
    pub fn is_closed_enum(&self) -> bool {
        self.enum_type == EnumType::Closed
    }

    #[must_use]
    pub fn validates_utf8(&self) -> bool {
        self.utf8_validation == Utf8Validation::Verify
    }

    /// Message fields use the group-like delimited encoding
    #[must_use]
    pub fn is_delimited(&self) -> bool {
        self.message_encoding == MessageEncoding::Delimited
    }
}

fn scalar<'a>(features: &'a FeatureSet, key: &str) -> Result<&'a str> {
    match features.get(key) {
        Some(value) => value
            .as_scalar()
            .ok_or_else(|| Error::invalid_feature_value(key, value.to_string())),
        None => Err(Error::MissingFeature(key.to_string())),
    }
}
