//! Feature inheritance and merge logic

use crate::{Error, Result};
use proto_ir::{Declared, EntityId, FeatureSet, Root};
use std::collections::HashSet;

/// Deep-merge `overrides` on top of `base`.
///
/// Nested mappings (custom extension features) merge key by key; scalars, and
/// therefore all well-known features, are replaced wholesale. Keys only present
/// in `base` pass through.
#[must_use]
pub fn deep_merge(base: &FeatureSet, overrides: &FeatureSet) -> FeatureSet {
    base.merged(overrides)
}

/// Build the inheritance chain of an entity, ordered from the root down to the
/// entity itself.
///
/// Fails with [`Error::CycleDetected`] when the lexical parents loop back on
/// themselves, which only a hand-edited tree can do.
pub fn inheritance_chain(root: &Root, id: EntityId) -> Result<Vec<EntityId>> {
    let mut chain = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(id);

    while let Some(next) = current {
        if !visited.insert(next) {
            return Err(Error::CycleDetected(
                root.get(next)?.full_name().to_string(),
            ));
        }
        chain.push(next);
        current = root.get(next)?.lexical_parent();
    }

    chain.reverse();
    Ok(chain)
}

/// Fold a chain's own declared features over a base set, root first
pub fn apply_inheritance_chain(
    base: &FeatureSet,
    root: &Root,
    chain: &[EntityId],
) -> Result<FeatureSet> {
    let mut result = base.clone();
    for id in chain {
        result.merge(root.get(*id)?.own_features());
    }
    Ok(result)
}

/// Whether making `parent` the lexical parent of `child` would close a cycle.
///
/// Lets callers check before [`Root::set_lexical_parent`].
#[must_use]
pub fn would_create_cycle(root: &Root, child: EntityId, parent: EntityId) -> bool {
    if child == parent {
        return true;
    }

    let mut visited = HashSet::new();
    let mut current = Some(parent);
    while let Some(id) = current {
        if id == child || !visited.insert(id) {
            return true;
        }
        current = root.entity(id).and_then(Declared::lexical_parent);
    }

    false
}
