//! Arena-backed declaration tree
#![allow(clippy::must_use_candidate)] // Builder/accessor API intentionally omits pervasive #[must_use].

use crate::node::{Declaration, Entity, EntityId, EntityKind, EnumValue};
use crate::options::DeclaredOptions;
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::trace;

/// Revisions are drawn from one process-wide sequence, so two distinct trees
/// never report the same revision.
static NEXT_REVISION: AtomicU64 = AtomicU64::new(1);

fn next_revision() -> u64 {
    NEXT_REVISION.fetch_add(1, Ordering::Relaxed)
}

/// Root of a declaration tree: one `.proto` file
///
/// Owns every entity in a flat arena. Index 0 is the file itself.
#[derive(Debug, Clone)]
pub struct Root {
    /// Edition or syntax identifier (`proto2`, `proto3`, `2023`)
    edition: String,

    /// All entities; `EntityId` indexes into this
    entities: Vec<Entity>,

    /// Innermost package namespace, if a package was declared
    package: Option<EntityId>,

    /// Fresh value from the process-wide sequence on creation and on every mutation
    revision: u64,
}

impl Root {
    /// Create an empty file tree for the given edition or syntax
    pub fn new(edition: impl Into<String>) -> Self {
        Self {
            edition: edition.into(),
            entities: vec![Entity::new(String::new(), String::new(), Declaration::File)],
            package: None,
            revision: next_revision(),
        }
    }

    /// Edition or syntax identifier
    pub fn edition(&self) -> &str {
        &self.edition
    }

    /// Change the edition or syntax identifier
    pub fn set_edition(&mut self, edition: impl Into<String>) {
        self.edition = edition.into();
        self.touch();
    }

    /// Mutation stamp; resolution snapshots record it to detect staleness.
    /// A clone shares its source's revision until either of them changes.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Number of entities, including the root
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Always false: a tree contains at least its root
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get an entity, failing for ids from another tree
    pub fn get(&self, id: EntityId) -> Result<&Entity> {
        self.entities
            .get(id.index())
            .ok_or(Error::InvalidEntity { index: id.index() })
    }

    /// Get an entity if the id belongs to this tree
    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index())
    }

    /// The root entity
    pub fn root_entity(&self) -> &Entity {
        &self.entities[EntityId::ROOT.index()]
    }

    /// All entity ids in arena order (parents are usually, but not necessarily,
    /// before their children)
    pub fn ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        (0..self.entities.len()).map(EntityId::new)
    }

    /// All entities with their ids
    pub fn entities(&self) -> impl Iterator<Item = (EntityId, &Entity)> {
        self.entities
            .iter()
            .enumerate()
            .map(|(i, e)| (EntityId::new(i), e))
    }

    /// Scope top-level declarations belong to: the innermost package namespace,
    /// or the root when no package was declared
    pub fn package_scope(&self) -> EntityId {
        self.package.unwrap_or(EntityId::ROOT)
    }

    /// Declare the file's package, creating one namespace per segment
    pub fn set_package(&mut self, package: &str) -> Result<EntityId> {
        if self.package.is_some() {
            return Err(Error::invalid_name(package, "package already declared"));
        }
        let mut scope = EntityId::ROOT;
        for segment in package.split('.') {
            let existing = self.get(scope)?.child(segment);
            scope = match existing {
                Some(id) if self.get(id)?.kind() == EntityKind::Namespace => id,
                _ => self.add_namespace(scope, segment)?,
            };
        }
        self.package = Some(scope);
        Ok(scope)
    }

    /// Add a namespace under the root or another namespace
    pub fn add_namespace(&mut self, parent: EntityId, name: &str) -> Result<EntityId> {
        self.expect_kind(parent, &[EntityKind::File, EntityKind::Namespace])?;
        self.insert(parent, parent, name, Declaration::Namespace)
    }

    /// Add a message under a file, namespace, message or service
    pub fn add_message(&mut self, parent: EntityId, name: &str) -> Result<EntityId> {
        self.expect_kind(
            parent,
            &[
                EntityKind::File,
                EntityKind::Namespace,
                EntityKind::Message,
                EntityKind::Service,
            ],
        )?;
        self.insert(parent, parent, name, Declaration::Message)
    }

    /// Add an enum under a file, namespace or message
    pub fn add_enum(&mut self, parent: EntityId, name: &str) -> Result<EntityId> {
        self.expect_kind(
            parent,
            &[EntityKind::File, EntityKind::Namespace, EntityKind::Message],
        )?;
        self.insert(parent, parent, name, Declaration::Enum { values: Vec::new() })
    }

    /// Append a value to an enum
    pub fn add_enum_value(&mut self, enum_id: EntityId, name: &str, number: i32) -> Result<()> {
        self.expect_kind(enum_id, &[EntityKind::Enum])?;
        validate_simple_name(name)?;
        let entity = &mut self.entities[enum_id.index()];
        let full_name = entity.full_name.clone();
        let Declaration::Enum { values } = &mut entity.declaration else {
            return Err(Error::invalid_name(name, "not an enum"));
        };
        if values.iter().any(|v| v.name == name) {
            return Err(Error::duplicate_name(name, full_name));
        }
        values.push(EnumValue {
            name: name.to_string(),
            number,
            parent: enum_id,
            options: DeclaredOptions::new(),
        });
        self.touch();
        Ok(())
    }

    /// Add a oneof to a message
    pub fn add_oneof(&mut self, message: EntityId, name: &str) -> Result<EntityId> {
        self.expect_kind(message, &[EntityKind::Message])?;
        self.insert(
            message,
            message,
            name,
            Declaration::OneOf {
                members: Vec::new(),
            },
        )
    }

    /// Add a regular field to a message
    pub fn add_field(
        &mut self,
        message: EntityId,
        name: &str,
        number: u32,
        type_name: &str,
    ) -> Result<EntityId> {
        self.expect_kind(message, &[EntityKind::Message])?;
        self.insert(
            message,
            message,
            name,
            Declaration::Field {
                number,
                type_name: type_name.to_string(),
                oneof: None,
            },
        )
    }

    /// Add a field inside a oneof. The field still belongs to, and inherits
    /// from, the enclosing message.
    pub fn add_oneof_field(
        &mut self,
        oneof: EntityId,
        name: &str,
        number: u32,
        type_name: &str,
    ) -> Result<EntityId> {
        self.expect_kind(oneof, &[EntityKind::OneOf])?;
        let message = self
            .get(oneof)?
            .parent
            .ok_or(Error::InvalidEntity {
                index: oneof.index(),
            })?;
        let id = self.insert(
            message,
            message,
            name,
            Declaration::Field {
                number,
                type_name: type_name.to_string(),
                oneof: Some(oneof),
            },
        )?;
        if let Declaration::OneOf { members } = &mut self.entities[oneof.index()].declaration {
            members.push(id);
        }
        Ok(id)
    }

    /// Add a service under a file or namespace
    pub fn add_service(&mut self, parent: EntityId, name: &str) -> Result<EntityId> {
        self.expect_kind(parent, &[EntityKind::File, EntityKind::Namespace])?;
        self.insert(parent, parent, name, Declaration::Service)
    }

    /// Add an rpc method to a service
    pub fn add_method(
        &mut self,
        service: EntityId,
        name: &str,
        input_type: &str,
        output_type: &str,
    ) -> Result<EntityId> {
        self.expect_kind(service, &[EntityKind::Service])?;
        self.insert(
            service,
            service,
            name,
            Declaration::Method {
                input_type: input_type.to_string(),
                output_type: output_type.to_string(),
            },
        )
    }

    /// Add a field from an `extend <extendee> { ... }` block written inside
    /// `container`.
    ///
    /// `extendee` is resolved from `container` and must name a message. The field
    /// inherits features from `container` but is registered for lookup under the
    /// extended message, e.g. `.Message.bar`.
    pub fn add_extension(
        &mut self,
        container: EntityId,
        extendee: &str,
        name: &str,
        number: u32,
        type_name: &str,
    ) -> Result<EntityId> {
        self.expect_kind(
            container,
            &[EntityKind::File, EntityKind::Namespace, EntityKind::Message],
        )?;
        let target = self.lookup_kind(container, extendee, EntityKind::Message)?;
        self.insert(
            container,
            target,
            name,
            Declaration::Extension {
                number,
                type_name: type_name.to_string(),
                extendee: target,
            },
        )
    }

    /// Record an `option <path> = <value>;` statement or inline bracket option
    pub fn declare_option(&mut self, id: EntityId, path: &str, value: &str) -> Result<()> {
        self.get(id)?;
        self.entities[id.index()].options.declare(path, value)?;
        self.touch();
        Ok(())
    }

    /// Record an inline option on an enum value
    pub fn declare_enum_value_option(
        &mut self,
        enum_id: EntityId,
        value_name: &str,
        path: &str,
        value: &str,
    ) -> Result<()> {
        self.expect_kind(enum_id, &[EntityKind::Enum])?;
        let entity = &mut self.entities[enum_id.index()];
        let full_name = entity.full_name.clone();
        let Declaration::Enum { values } = &mut entity.declaration else {
            return Err(Error::invalid_name(value_name, "not an enum"));
        };
        let enum_value = values
            .iter_mut()
            .find(|v| v.name == value_name)
            .ok_or_else(|| Error::lookup_not_found(value_name, full_name))?;
        enum_value.options.declare(path, value)?;
        self.touch();
        Ok(())
    }

    /// Re-point an entity's lexical parent.
    ///
    /// Only checks that both ids exist. Callers editing the tree by hand can
    /// create a cycle here; the resolver reports it instead of looping.
    pub fn set_lexical_parent(&mut self, id: EntityId, parent: EntityId) -> Result<()> {
        self.get(parent)?;
        let old = self
            .get(id)?
            .parent
            .ok_or_else(|| Error::invalid_name(".", "the root has no parent"))?;
        self.entities[old.index()].children.retain(|c| *c != id);
        self.entities[parent.index()].children.push(id);
        self.entities[id.index()].parent = Some(parent);
        self.touch();
        Ok(())
    }

    /// Regular fields of a message (including oneof members), in declaration order
    pub fn fields(&self, message: EntityId) -> Result<Vec<EntityId>> {
        self.expect_kind(message, &[EntityKind::Message])?;
        Ok(self
            .get(message)?
            .children
            .iter()
            .copied()
            .filter(|c| self.entities[c.index()].kind() == EntityKind::Field)
            .collect())
    }

    /// Extension fields registered against a message, wherever they were declared
    pub fn extension_fields(&self, message: EntityId) -> Result<Vec<EntityId>> {
        self.expect_kind(message, &[EntityKind::Message])?;
        let mut fields: Vec<EntityId> = self
            .get(message)?
            .index
            .values()
            .copied()
            .filter(|c| self.entities[c.index()].kind() == EntityKind::Extension)
            .collect();
        fields.sort();
        Ok(fields)
    }

    fn insert(
        &mut self,
        parent: EntityId,
        scope: EntityId,
        name: &str,
        declaration: Declaration,
    ) -> Result<EntityId> {
        validate_simple_name(name)?;
        let scope_entity = self.get(scope)?;
        if scope_entity.index.contains_key(name) {
            return Err(Error::duplicate_name(name, display_name(scope_entity)));
        }

        let full_name = format!("{}.{}", scope_entity.full_name, name);
        let id = EntityId::new(self.entities.len());
        trace!("adding {} {} as #{}", declaration.kind(), full_name, id.index());

        let mut entity = Entity::new(name.to_string(), full_name, declaration);
        entity.parent = Some(parent);
        entity.scope = Some(scope);
        self.entities.push(entity);
        self.entities[parent.index()].children.push(id);
        self.entities[scope.index()].index.insert(name.to_string(), id);
        self.touch();
        Ok(id)
    }

    pub(crate) fn expect_kind(&self, id: EntityId, allowed: &[EntityKind]) -> Result<()> {
        let entity = self.get(id)?;
        let kind = entity.kind();
        if allowed.contains(&kind) {
            Ok(())
        } else {
            Err(Error::kind_mismatch(display_name(entity), allowed[0], kind))
        }
    }

    fn touch(&mut self) {
        self.revision = next_revision();
    }
}

/// Name used in error messages; the root has an empty full name
pub(crate) fn display_name(entity: &Entity) -> String {
    if entity.full_name.is_empty() {
        ".".to_string()
    } else {
        entity.full_name.clone()
    }
}

fn validate_simple_name(name: &str) -> Result<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => Err(Error::invalid_name(name, "empty name")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            Err(Error::invalid_name(name, "must start with a letter or '_'"))
        }
        _ if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') => {
            Err(Error::invalid_name(name, "must be a simple identifier"))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Declared;

    #[test]
    fn test_full_names() {
        let mut root = Root::new("2023");
        let message = root.add_message(EntityId::ROOT, "Message").unwrap();
        let nested = root.add_message(message, "Nested").unwrap();
        let field = root.add_field(nested, "count", 9, "int64").unwrap();

        assert_eq!(root.get(message).unwrap().full_name(), ".Message");
        assert_eq!(root.get(nested).unwrap().full_name(), ".Message.Nested");
        assert_eq!(root.get(field).unwrap().full_name(), ".Message.Nested.count");
        assert_eq!(root.root_entity().full_name(), "");
    }

    #[test]
    fn test_package_namespaces() {
        let mut root = Root::new("proto3");
        let scope = root.set_package("foo.bar").unwrap();
        let message = root.add_message(scope, "Message").unwrap();

        assert_eq!(root.package_scope(), scope);
        assert_eq!(root.get(scope).unwrap().kind(), EntityKind::Namespace);
        assert_eq!(root.get(message).unwrap().full_name(), ".foo.bar.Message");
        assert!(root.set_package("other").is_err());
    }

    #[test]
    fn test_oneof_field_parent_is_message() {
        let mut root = Root::new("2023");
        let message = root.add_message(EntityId::ROOT, "Message").unwrap();
        let oneof = root.add_oneof(message, "SomeOneOf").unwrap();
        let a = root.add_oneof_field(oneof, "a", 13, "int32").unwrap();

        let field = root.get(a).unwrap();
        assert_eq!(field.lexical_parent(), Some(message));
        assert_eq!(field.scope(), Some(message));
        assert_eq!(
            field.declaration(),
            &Declaration::Field {
                number: 13,
                type_name: "int32".to_string(),
                oneof: Some(oneof),
            }
        );
        assert_eq!(
            root.get(oneof).unwrap().declaration(),
            &Declaration::OneOf { members: vec![a] }
        );
        assert_eq!(root.fields(message).unwrap(), vec![a]);
    }

    #[test]
    fn test_extension_registered_under_extendee() {
        let mut root = Root::new("2023");
        let message = root.add_message(EntityId::ROOT, "Message").unwrap();
        let other = root.add_message(EntityId::ROOT, "Other").unwrap();
        let bar = root
            .add_extension(other, "Message", "bar", 10, "int32")
            .unwrap();

        let entity = root.get(bar).unwrap();
        assert_eq!(entity.full_name(), ".Message.bar");
        assert_eq!(entity.lexical_parent(), Some(other));
        assert_eq!(entity.scope(), Some(message));
        assert_eq!(root.get(message).unwrap().child("bar"), Some(bar));
        assert_eq!(root.get(other).unwrap().children(), &[bar]);
        assert_eq!(root.extension_fields(message).unwrap(), vec![bar]);
        assert!(root.fields(message).unwrap().is_empty());
    }

    #[test]
    fn test_extension_of_non_message() {
        let mut root = Root::new("2023");
        root.add_enum(EntityId::ROOT, "SomeEnum").unwrap();
        let result = root.add_extension(EntityId::ROOT, "SomeEnum", "bar", 10, "int32");
        assert!(matches!(result, Err(Error::KindMismatch { .. })));

        let result = root.add_extension(EntityId::ROOT, "Missing", "bar", 10, "int32");
        assert!(matches!(result, Err(Error::LookupNotFound { .. })));
    }

    #[test]
    fn test_duplicate_names() {
        let mut root = Root::new("2023");
        let message = root.add_message(EntityId::ROOT, "Message").unwrap();
        assert!(matches!(
            root.add_enum(EntityId::ROOT, "Message"),
            Err(Error::DuplicateName { .. })
        ));
        root.add_field(message, "a", 1, "int32").unwrap();
        assert!(root.add_field(message, "a", 2, "int32").is_err());

        let some_enum = root.add_enum(EntityId::ROOT, "SomeEnum").unwrap();
        root.add_enum_value(some_enum, "ONE", 1).unwrap();
        assert!(root.add_enum_value(some_enum, "ONE", 2).is_err());
    }

    #[test]
    fn test_invalid_parents_and_names() {
        let mut root = Root::new("2023");
        let message = root.add_message(EntityId::ROOT, "Message").unwrap();
        let field = root.add_field(message, "a", 1, "int32").unwrap();

        assert!(matches!(
            root.add_message(field, "Nested"),
            Err(Error::KindMismatch { .. })
        ));
        assert!(matches!(
            root.add_field(EntityId::ROOT, "b", 2, "int32"),
            Err(Error::KindMismatch { .. })
        ));
        assert!(matches!(
            root.add_message(EntityId::ROOT, "bad.name"),
            Err(Error::InvalidName { .. })
        ));
        assert!(matches!(
            root.get(EntityId::new(99)),
            Err(Error::InvalidEntity { index: 99 })
        ));
    }

    #[test]
    fn test_distinct_trees_never_share_a_revision() {
        let first = Root::new("2023");
        let second = Root::new("2023");
        assert_ne!(first.revision(), second.revision());

        let mut copy = first.clone();
        assert_eq!(copy.revision(), first.revision());
        copy.add_message(EntityId::ROOT, "Message").unwrap();
        assert_ne!(copy.revision(), first.revision());
        assert_ne!(copy.revision(), second.revision());
    }

    #[test]
    fn test_declare_options_bump_revision() {
        let mut root = Root::new("2023");
        let some_enum = root.add_enum(EntityId::ROOT, "SomeEnum").unwrap();
        root.add_enum_value(some_enum, "ONE", 1).unwrap();
        let before = root.revision();

        root.declare_option(some_enum, "features.enum_type", "CLOSED")
            .unwrap();
        root.declare_enum_value_option(some_enum, "ONE", "features.(abc).x", "y")
            .unwrap();

        assert!(root.revision() > before);
        let entity = root.get(some_enum).unwrap();
        assert_eq!(entity.own_features().get_scalar("enum_type"), Some("CLOSED"));
        let one = entity.enum_value("ONE").unwrap();
        assert_eq!(one.own_features().len(), 1);
        assert!(matches!(
            root.declare_enum_value_option(some_enum, "TWO", "features.enum_type", "OPEN"),
            Err(Error::LookupNotFound { .. })
        ));
    }

    #[test]
    fn test_set_lexical_parent_moves_child() {
        let mut root = Root::new("2023");
        let a = root.add_message(EntityId::ROOT, "A").unwrap();
        let b = root.add_message(EntityId::ROOT, "B").unwrap();

        root.set_lexical_parent(b, a).unwrap();

        assert_eq!(root.get(b).unwrap().lexical_parent(), Some(a));
        assert_eq!(root.get(a).unwrap().children(), &[b]);
        assert_eq!(root.root_entity().children(), &[a]);
        assert!(root.set_lexical_parent(EntityId::ROOT, a).is_err());
    }
}
