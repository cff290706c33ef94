//! Name resolution across nested scopes
//!
//! A name with a leading `.` is absolute and resolves segment by segment from the
//! root. Any other name is tried in full against the starting scope, then against
//! each enclosing lexical parent up to the root; the first hit wins.

use crate::node::{EntityId, EntityKind};
use crate::root::{Root, display_name};
use crate::{Error, Result};
use tracing::trace;

impl Root {
    /// Resolve a name from the root scope
    pub fn lookup(&self, name: &str) -> Result<EntityId> {
        self.lookup_from(EntityId::ROOT, name)
    }

    /// Resolve a name starting at `scope` and walking outward
    pub fn lookup_from(&self, scope: EntityId, name: &str) -> Result<EntityId> {
        let start = self.get(scope)?;

        if let Some(absolute) = name.strip_prefix('.') {
            let segments = split_name(name, absolute)?;
            return self
                .resolve_segments(EntityId::ROOT, &segments)
                .ok_or_else(|| Error::lookup_not_found(name, "."));
        }

        let segments = split_name(name, name)?;
        let mut current = Some(scope);
        // A hand-edited tree may contain a parent cycle; never walk more than
        // the number of entities.
        let mut remaining = self.len();
        while let (Some(id), true) = (current, remaining > 0) {
            if let Some(found) = self.resolve_segments(id, &segments) {
                trace!("resolved {} from {} to #{}", name, display_name(start), found.index());
                return Ok(found);
            }
            current = self.entity(id).and_then(|e| e.parent);
            remaining -= 1;
        }

        Err(Error::lookup_not_found(name, display_name(start)))
    }

    /// Resolve a name and require a specific kind
    pub fn lookup_kind(&self, scope: EntityId, name: &str, kind: EntityKind) -> Result<EntityId> {
        let id = self.lookup_from(scope, name)?;
        let found = self.get(id)?.kind();
        if found == kind {
            Ok(id)
        } else {
            Err(Error::kind_mismatch(name, kind, found))
        }
    }

    /// Resolve a message name from `scope`
    pub fn lookup_message(&self, scope: EntityId, name: &str) -> Result<EntityId> {
        self.lookup_kind(scope, name, EntityKind::Message)
    }

    /// Resolve an enum name from `scope`
    pub fn lookup_enum(&self, scope: EntityId, name: &str) -> Result<EntityId> {
        self.lookup_kind(scope, name, EntityKind::Enum)
    }

    /// Resolve a service name from `scope`
    pub fn lookup_service(&self, scope: EntityId, name: &str) -> Result<EntityId> {
        self.lookup_kind(scope, name, EntityKind::Service)
    }

    /// Depth-first search of `scope` and everything lexically below it, in
    /// declaration order. Unlike [`Root::lookup_from`] this never looks outward.
    pub fn find_descendant(&self, scope: EntityId, name: &str) -> Result<EntityId> {
        let start = self.get(scope)?;
        let relative = name.strip_prefix('.').unwrap_or(name);
        let segments = split_name(name, relative)?;

        let mut stack = vec![scope];
        let mut visited = vec![false; self.len()];
        while let Some(id) = stack.pop() {
            if std::mem::replace(&mut visited[id.index()], true) {
                continue;
            }
            if let Some(found) = self.resolve_segments(id, &segments) {
                return Ok(found);
            }
            if let Some(entity) = self.entity(id) {
                stack.extend(entity.children().iter().rev().copied());
            }
        }

        Err(Error::lookup_not_found(name, display_name(start)))
    }

    fn resolve_segments(&self, start: EntityId, segments: &[&str]) -> Option<EntityId> {
        segments
            .iter()
            .try_fold(start, |current, segment| self.entity(current)?.child(segment))
    }
}

fn split_name<'a>(name: &str, path: &'a str) -> Result<Vec<&'a str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(Error::invalid_name(name, "empty name segment"));
    }
    Ok(segments)
}
