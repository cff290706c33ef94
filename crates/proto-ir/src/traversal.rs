//! Traversal and cursor APIs for navigating the declaration tree

use crate::node::{Entity, EntityId, EntityKind};
use crate::root::Root;
use crate::{Error, Result};

/// Trait for walking the tree
pub trait Traversal {
    /// Visit an entity; called before any of its children
    fn visit(&mut self, root: &Root, id: EntityId, entity: &Entity);

    /// Called when entering an entity with children
    fn enter(&mut self, _root: &Root, _id: EntityId) {}

    /// Called when leaving an entity with children
    fn leave(&mut self, _root: &Root, _id: EntityId) {}

    /// Returns true if traversal should continue
    fn should_continue(&self) -> bool {
        true
    }
}

/// Walk the tree from the root in declaration order, parents before children.
///
/// Follows lexical children only, so entities detached by a hand-made parent
/// cycle are not reached.
pub fn walk<T: Traversal>(root: &Root, visitor: &mut T) {
    let mut on_path = vec![false; root.len()];
    walk_recursive(root, EntityId::ROOT, visitor, &mut on_path);
}

fn walk_recursive<T: Traversal>(root: &Root, id: EntityId, visitor: &mut T, on_path: &mut [bool]) {
    if !visitor.should_continue() || on_path[id.index()] {
        return;
    }
    let Some(entity) = root.entity(id) else {
        return;
    };

    visitor.visit(root, id, entity);

    if !entity.children().is_empty() {
        on_path[id.index()] = true;
        visitor.enter(root, id);
        for child in entity.children() {
            walk_recursive(root, *child, visitor, on_path);
        }
        visitor.leave(root, id);
        on_path[id.index()] = false;
    }
}

/// A cursor positioned on one entity, offering scoped lookups from there
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    root: &'a Root,
    id: EntityId,
    entity: &'a Entity,
}

impl<'a> Cursor<'a> {
    /// Cursor at the root
    pub fn new(root: &'a Root) -> Self {
        Self {
            root,
            id: EntityId::ROOT,
            entity: root.root_entity(),
        }
    }

    /// Cursor at a given entity
    pub fn at(root: &'a Root, id: EntityId) -> Result<Self> {
        Ok(Self {
            root,
            id,
            entity: root.get(id)?,
        })
    }

    /// Current entity id
    #[must_use]
    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Current entity
    #[must_use]
    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// Kind of the current entity
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.entity.kind()
    }

    /// Move to the lexical parent
    #[must_use]
    pub fn parent(&self) -> Option<Cursor<'a>> {
        self.entity
            .parent
            .and_then(|id| Cursor::at(self.root, id).ok())
    }

    /// Move to a name registered directly under the current entity
    pub fn child(&self, name: &str) -> Result<Cursor<'a>> {
        let id = self
            .entity
            .child(name)
            .ok_or_else(|| Error::lookup_not_found(name, self.entity.full_name()))?;
        Cursor::at(self.root, id)
    }

    /// Scoped lookup from the current entity
    pub fn lookup(&self, name: &str) -> Result<Cursor<'a>> {
        Cursor::at(self.root, self.root.lookup_from(self.id, name)?)
    }

    /// Scoped lookup requiring a message
    pub fn lookup_message(&self, name: &str) -> Result<Cursor<'a>> {
        Cursor::at(self.root, self.root.lookup_message(self.id, name)?)
    }

    /// Scoped lookup requiring an enum
    pub fn lookup_enum(&self, name: &str) -> Result<Cursor<'a>> {
        Cursor::at(self.root, self.root.lookup_enum(self.id, name)?)
    }

    /// Scoped lookup requiring a service
    pub fn lookup_service(&self, name: &str) -> Result<Cursor<'a>> {
        Cursor::at(self.root, self.root.lookup_service(self.id, name)?)
    }

    /// Search the subtree below the current entity
    pub fn find(&self, name: &str) -> Result<Cursor<'a>> {
        Cursor::at(self.root, self.root.find_descendant(self.id, name)?)
    }
}

impl Root {
    /// Cursor positioned on the root
    #[must_use]
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }
}
