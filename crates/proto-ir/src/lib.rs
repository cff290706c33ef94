#![deny(warnings)]
#![deny(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

//! # proto-ir
//!
//! In-memory declaration tree for protobuf schemas.
//!
//! The tree is produced by an external `.proto` parser (or a manifest loader) and
//! holds every message, enum, service, field, oneof and extension together with the
//! raw options each of them declares. Entities live in a single arena owned by
//! [`Root`]; the lexical parent of an entity is an [`EntityId`] into that arena.

/// Feature values and the deep-merge rule over them.
pub mod feature;
/// Lookup of names across nested scopes.
pub mod lookup;
/// Entity model: ids, kinds and per-kind declaration data.
pub mod node;
/// Raw option capture and `features.*` path normalization.
pub mod options;
/// The arena-backed declaration tree.
pub mod root;
/// Visitor walks and cursor navigation over the tree.
pub mod traversal;

/// Feature value primitives.
pub use feature::{FeatureSet, FeatureValue};
/// Entity primitives.
pub use node::{Declaration, Declared, Entity, EntityId, EntityKind, EnumValue};
/// Per-entity declared options.
pub use options::DeclaredOptions;
/// Declaration tree.
pub use root::Root;
/// Traversal entry points.
pub use traversal::{Cursor, Traversal, walk};

use thiserror::Error;

/// Errors that can occur when building or querying a declaration tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("'{name}' not found from scope '{scope}'")]
    LookupNotFound { name: String, scope: String },

    #[error("'{name}' is a {found}, expected {expected}")]
    KindMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("duplicate name '{name}' in scope '{scope}'")]
    DuplicateName { name: String, scope: String },

    #[error("invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid option path '{path}': {reason}")]
    InvalidOptionPath { path: String, reason: String },

    #[error("entity #{index} does not belong to this tree")]
    InvalidEntity { index: usize },
}

impl Error {
    /// Build a lookup failure with the scope the search started from.
    pub fn lookup_not_found(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::LookupNotFound {
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Build a kind mismatch for a name that resolved to the wrong entity kind.
    pub fn kind_mismatch(name: impl Into<String>, expected: EntityKind, found: EntityKind) -> Self {
        Self::KindMismatch {
            name: name.into(),
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }

    /// Build a duplicate-name error for a namespace that already holds `name`.
    pub fn duplicate_name(name: impl Into<String>, scope: impl Into<String>) -> Self {
        Self::DuplicateName {
            name: name.into(),
            scope: scope.into(),
        }
    }

    /// Build an invalid-name error.
    pub fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Build an invalid option path error with the offending path.
    pub fn invalid_option_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidOptionPath {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Crate-local result type for tree operations.
pub type Result<T> = std::result::Result<T, Error>;
