#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # proto-features
//!
//! Edition feature resolution for protobuf declaration trees.
//!
//! Every declaration inherits the resolved features of its lexical parent and
//! deep-merges its own declared options on top:
//! defaults row → file → message → nested message / field / oneof / enum → enum value
//!
//! ## Example Usage
//!
//! ```rust
//! use proto_features::{ResolveAll, resolve_all};
//! use proto_ir::{EntityId, Root};
//!
//! let mut root = Root::new("2023");
//! root.declare_option(EntityId::ROOT, "features.json_format", "LEGACY_BEST_EFFORT").unwrap();
//! let message = root.add_message(EntityId::ROOT, "Message").unwrap();
//!
//! let resolution = root.resolve_all().unwrap();
//! let features = resolution.features(message).unwrap();
//! assert_eq!(features.get_scalar("json_format"), Some("LEGACY_BEST_EFFORT"));
//! assert_eq!(features.get_scalar("enum_type"), Some("OPEN"));
//! # let _ = resolve_all(&root).unwrap();
//! ```

pub mod defaults;
pub mod inheritance;
pub mod loader;
pub mod registry;
pub mod resolver;
pub mod typed;

pub use defaults::{Edition, WELL_KNOWN_FEATURES, feature_defaults};
pub use inheritance::{deep_merge, inheritance_chain};
pub use loader::ManifestLoader;
pub use registry::ResolutionRegistry;
pub use resolver::{Resolution, ResolveAll, resolve_all, resolve_entity, resolve_enum_value};
pub use typed::{
    EnumType, FieldPresence, JsonFormat, MessageEncoding, RepeatedFieldEncoding, Utf8Validation,
    WellKnownFeatures,
};

use thiserror::Error;

/// Errors that can occur while resolving features
#[derive(Error, Debug)]
pub enum Error {
    #[error("unknown edition or syntax '{0}'")]
    UnknownEditionOrSyntax(String),

    #[error("lexical parent cycle detected at '{0}'")]
    CycleDetected(String),

    #[error("missing feature '{0}'")]
    MissingFeature(String),

    #[error("invalid value '{value}' for feature '{key}'")]
    InvalidFeatureValue { key: String, value: String },

    #[error("Manifest not found: {0}")]
    NotFound(String),

    #[error("Invalid manifest format: {0}")]
    InvalidFormat(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Tree(#[from] proto_ir::Error),
}

impl Error {
    /// Build an invalid-value error for a well-known feature
    pub fn invalid_feature_value(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidFeatureValue {
            key: key.into(),
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
