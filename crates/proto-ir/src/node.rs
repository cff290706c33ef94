//! Entity types for the declaration tree
#![allow(clippy::must_use_candidate)] // Accessors are clear at call sites without #[must_use].

use crate::feature::FeatureSet;
use crate::options::DeclaredOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Handle to an entity in a [`crate::Root`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(usize);

impl EntityId {
    /// The root (file) entity of every tree
    pub const ROOT: EntityId = EntityId(0);

    /// Id for an arena position. Ids are only meaningful for the tree that
    /// produced them; [`crate::Root::get`] rejects out-of-range ids.
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// Kinds of declarations in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// The file itself (tree root)
    File,

    /// A package segment
    Namespace,

    /// `message`
    Message,

    /// `enum`
    Enum,

    /// `oneof` inside a message
    OneOf,

    /// `service`
    Service,

    /// `rpc` inside a service
    Method,

    /// Regular message field
    Field,

    /// Field declared in an `extend` block
    Extension,
}

impl EntityKind {
    /// Whether entities of this kind own a child name index
    pub fn is_namespace(self) -> bool {
        matches!(
            self,
            Self::File | Self::Namespace | Self::Message | Self::Service
        )
    }

    /// Lower-case name used in messages and reports
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Namespace => "namespace",
            Self::Message => "message",
            Self::Enum => "enum",
            Self::OneOf => "oneof",
            Self::Service => "service",
            Self::Method => "method",
            Self::Field => "field",
            Self::Extension => "extension",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared value of an enum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumValue {
    pub(crate) name: String,
    pub(crate) number: i32,
    pub(crate) parent: EntityId,
    pub(crate) options: DeclaredOptions,
}

impl EnumValue {
    /// Value name (e.g. `ONE`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared number
    pub fn number(&self) -> i32 {
        self.number
    }

    /// Enum this value belongs to
    pub fn parent(&self) -> EntityId {
        self.parent
    }

    /// Options declared inline on the value
    pub fn options(&self) -> &DeclaredOptions {
        &self.options
    }
}

/// Per-kind declaration data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declaration {
    File,
    Namespace,
    Message,
    Enum {
        values: Vec<EnumValue>,
    },
    OneOf {
        /// Member fields, in declaration order
        members: Vec<EntityId>,
    },
    Service,
    Method {
        input_type: String,
        output_type: String,
    },
    Field {
        number: u32,
        type_name: String,
        /// Containing oneof, if any. Not the inheritance parent.
        oneof: Option<EntityId>,
    },
    Extension {
        number: u32,
        type_name: String,
        /// The message being extended
        extendee: EntityId,
    },
}

impl Declaration {
    /// Entity kind of this declaration
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::File => EntityKind::File,
            Self::Namespace => EntityKind::Namespace,
            Self::Message => EntityKind::Message,
            Self::Enum { .. } => EntityKind::Enum,
            Self::OneOf { .. } => EntityKind::OneOf,
            Self::Service => EntityKind::Service,
            Self::Method { .. } => EntityKind::Method,
            Self::Field { .. } => EntityKind::Field,
            Self::Extension { .. } => EntityKind::Extension,
        }
    }
}

/// A declaration in the tree
#[derive(Debug, Clone)]
pub struct Entity {
    pub(crate) name: String,
    pub(crate) full_name: String,
    /// Inheritance edge; `None` only for the root
    pub(crate) parent: Option<EntityId>,
    /// Namespace the entity is registered under for lookups
    pub(crate) scope: Option<EntityId>,
    pub(crate) declaration: Declaration,
    pub(crate) options: DeclaredOptions,
    /// Lexical children in declaration order
    pub(crate) children: Vec<EntityId>,
    /// Names registered under this entity
    pub(crate) index: HashMap<String, EntityId>,
}

impl Entity {
    pub(crate) fn new(name: String, full_name: String, declaration: Declaration) -> Self {
        Self {
            name,
            full_name,
            parent: None,
            scope: None,
            declaration,
            options: DeclaredOptions::new(),
            children: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Simple name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fully qualified name with a leading dot (empty for the root)
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Entity kind
    pub fn kind(&self) -> EntityKind {
        self.declaration.kind()
    }

    /// Per-kind data
    pub fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    /// Namespace this entity is registered under. Differs from the lexical
    /// parent for extension fields and oneof members.
    pub fn scope(&self) -> Option<EntityId> {
        self.scope
    }

    /// Own declared options (features and plain)
    pub fn options(&self) -> &DeclaredOptions {
        &self.options
    }

    /// Lexical children in declaration order
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Look up a name registered directly under this entity
    pub fn child(&self, name: &str) -> Option<EntityId> {
        self.index.get(name).copied()
    }

    /// Declared enum values; empty for non-enums
    pub fn enum_values(&self) -> &[EnumValue] {
        match &self.declaration {
            Declaration::Enum { values } => values,
            _ => &[],
        }
    }

    /// Find a declared enum value by name
    pub fn enum_value(&self, name: &str) -> Option<&EnumValue> {
        self.enum_values().iter().find(|v| v.name == name)
    }

    /// Field number for fields and extensions
    pub fn field_number(&self) -> Option<u32> {
        match &self.declaration {
            Declaration::Field { number, .. } | Declaration::Extension { number, .. } => {
                Some(*number)
            }
            _ => None,
        }
    }
}

/// What the feature resolver needs from a declaration: its own declared
/// features and the entity it inherits from.
pub trait Declared {
    /// Features declared on this declaration only
    fn own_features(&self) -> &FeatureSet;

    /// Lexical parent; `None` for the root
    fn lexical_parent(&self) -> Option<EntityId>;
}

impl Declared for Entity {
    fn own_features(&self) -> &FeatureSet {
        self.options.features()
    }

    fn lexical_parent(&self) -> Option<EntityId> {
        self.parent
    }
}

impl Declared for EnumValue {
    fn own_features(&self) -> &FeatureSet {
        self.options.features()
    }

    fn lexical_parent(&self) -> Option<EntityId> {
        Some(self.parent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_kinds() {
        assert!(EntityKind::File.is_namespace());
        assert!(EntityKind::Namespace.is_namespace());
        assert!(EntityKind::Message.is_namespace());
        assert!(EntityKind::Service.is_namespace());
        assert!(!EntityKind::Enum.is_namespace());
        assert!(!EntityKind::OneOf.is_namespace());
        assert!(!EntityKind::Field.is_namespace());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(serde_json::to_string(&EntityKind::OneOf).unwrap(), "\"one_of\"");
        assert_eq!(EntityKind::OneOf.to_string(), "oneof");
    }

    #[test]
    fn test_enum_value_accessors() {
        let entity = Entity::new(
            "SomeEnum".to_string(),
            ".SomeEnum".to_string(),
            Declaration::Enum {
                values: vec![EnumValue {
                    name: "ONE".to_string(),
                    number: 1,
                    parent: EntityId::new(1),
                    options: DeclaredOptions::new(),
                }],
            },
        );

        assert_eq!(entity.kind(), EntityKind::Enum);
        assert_eq!(entity.enum_values().len(), 1);
        assert_eq!(entity.enum_value("ONE").map(EnumValue::number), Some(1));
        assert!(entity.enum_value("TWO").is_none());
        assert!(entity.field_number().is_none());
        assert_eq!(entity.enum_values()[0].lexical_parent(), Some(EntityId::new(1)));
    }
}
