//! Top-down feature resolution
//!
//! [`resolve_all`] computes the effective feature set of every entity in one pass
//! and returns it as an immutable [`Resolution`] snapshot. The tree itself is
//! never modified, so a snapshot can be shared freely and re-running the pass on
//! an unchanged tree yields an identical snapshot.

use crate::defaults::Edition;
use crate::inheritance::{apply_inheritance_chain, deep_merge, inheritance_chain};
use crate::typed::WellKnownFeatures;
use crate::{Error, Result};
use proto_ir::{Declared, EntityId, EntityKind, FeatureSet, Root};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, trace};

/// Resolved features for one tree, as of one revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    edition: Edition,
    revision: u64,
    /// Indexed by `EntityId`
    features: Vec<FeatureSet>,
    /// Enum id → value name → resolved features
    values: BTreeMap<EntityId, BTreeMap<String, FeatureSet>>,
}

impl Resolution {
    /// Edition the defaults were taken from
    #[must_use]
    pub fn edition(&self) -> Edition {
        self.edition
    }

    /// Tree revision this snapshot was computed from
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Whether this snapshot was computed from `root` in its present state.
    /// Revisions are unique per tree, so another tree is never current.
    #[must_use]
    pub fn is_current(&self, root: &Root) -> bool {
        root.revision() == self.revision && root.len() == self.features.len()
    }

    /// Number of resolved entities
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Always false once resolved: the root is always present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Resolved features of an entity
    #[must_use]
    pub fn features(&self, id: EntityId) -> Option<&FeatureSet> {
        self.features.get(id.index())
    }

    /// Resolved features of the file itself
    #[must_use]
    pub fn file_features(&self) -> &FeatureSet {
        &self.features[EntityId::ROOT.index()]
    }

    /// Resolved features of every value of an enum, keyed by value name
    #[must_use]
    pub fn values_features(&self, enum_id: EntityId) -> Option<&BTreeMap<String, FeatureSet>> {
        self.values.get(&enum_id)
    }

    /// Resolved features of a single enum value
    #[must_use]
    pub fn value_features(&self, enum_id: EntityId, value: &str) -> Option<&FeatureSet> {
        self.values.get(&enum_id)?.get(value)
    }

    /// Typed view of an entity's well-known features
    pub fn well_known(&self, id: EntityId) -> Result<WellKnownFeatures> {
        let features = self
            .features(id)
            .ok_or(proto_ir::Error::InvalidEntity { index: id.index() })?;
        WellKnownFeatures::from_set(features)
    }

    /// Iterate over every entity id with its resolved features
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &FeatureSet)> {
        self.features
            .iter()
            .enumerate()
            .map(|(i, set)| (EntityId::new(i), set))
    }
}

/// Resolution entry point on the tree itself
pub trait ResolveAll {
    /// Resolve every entity; see [`resolve_all`]
    fn resolve_all(&self) -> Result<Resolution>;
}

impl ResolveAll for Root {
    fn resolve_all(&self) -> Result<Resolution> {
        resolve_all(self)
    }
}

/// Run the full resolution pass over a tree.
///
/// 1. The root resolves to its edition's defaults merged with its own options.
/// 2. Every other entity resolves to its lexical parent's result merged with its
///    own options.
/// 3. Every enum value resolves against its enum, independently of its siblings.
///
/// Fails with [`Error::UnknownEditionOrSyntax`] before resolving anything when the
/// edition has no defaults row, and with [`Error::CycleDetected`] when a
/// hand-edited tree has a parent cycle.
pub fn resolve_all(root: &Root) -> Result<Resolution> {
    let edition: Edition = root.edition().parse()?;
    debug!(
        "resolving {} entities (edition {}, revision {})",
        root.len(),
        edition,
        root.revision()
    );

    let mut resolved: Vec<Option<FeatureSet>> = vec![None; root.len()];
    resolved[EntityId::ROOT.index()] =
        Some(deep_merge(&edition.defaults(), root.root_entity().own_features()));

    for id in root.ids() {
        if resolved[id.index()].is_some() {
            continue;
        }

        // Climb to the nearest resolved ancestor, then resolve back down.
        let mut pending = Vec::new();
        let mut on_path = HashSet::new();
        let mut current = id;
        let mut base = loop {
            if let Some(set) = &resolved[current.index()] {
                break set.clone();
            }
            if !on_path.insert(current) {
                return Err(Error::CycleDetected(
                    root.get(current)?.full_name().to_string(),
                ));
            }
            pending.push(current);
            current = root
                .get(current)?
                .lexical_parent()
                .ok_or(proto_ir::Error::InvalidEntity {
                    index: current.index(),
                })?;
        };

        while let Some(next) = pending.pop() {
            let entity = root.get(next)?;
            base = deep_merge(&base, entity.own_features());
            trace!("resolved {} {}", entity.kind(), entity.full_name());
            resolved[next.index()] = Some(base.clone());
        }
    }

    let features: Vec<FeatureSet> = resolved.into_iter().flatten().collect();

    let mut values = BTreeMap::new();
    for (id, entity) in root.entities() {
        if entity.kind() != EntityKind::Enum {
            continue;
        }
        let enum_features = &features[id.index()];
        let per_value = entity
            .enum_values()
            .iter()
            .map(|v| (v.name().to_string(), deep_merge(enum_features, v.own_features())))
            .collect();
        values.insert(id, per_value);
    }

    Ok(Resolution {
        edition,
        revision: root.revision(),
        features,
        values,
    })
}

/// Resolve a single entity on demand by folding its inheritance chain.
///
/// Produces the same set as [`resolve_all`] would for `id`, without resolving
/// the rest of the tree.
pub fn resolve_entity(root: &Root, id: EntityId) -> Result<FeatureSet> {
    let edition: Edition = root.edition().parse()?;
    let chain = inheritance_chain(root, id)?;
    apply_inheritance_chain(&edition.defaults(), root, &chain)
}

/// Resolve a single enum value on demand
pub fn resolve_enum_value(root: &Root, enum_id: EntityId, value: &str) -> Result<FeatureSet> {
    let entity = root.get(enum_id)?;
    if entity.kind() != EntityKind::Enum {
        return Err(proto_ir::Error::kind_mismatch(
            entity.full_name(),
            EntityKind::Enum,
            entity.kind(),
        )
        .into());
    }
    let enum_value = entity
        .enum_value(value)
        .ok_or_else(|| proto_ir::Error::lookup_not_found(value, entity.full_name()))?;
    Ok(deep_merge(
        &resolve_entity(root, enum_id)?,
        enum_value.own_features(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_edition_fails_fast() {
        let mut root = Root::new("2099");
        root.add_message(EntityId::ROOT, "Message").unwrap();
        match resolve_all(&root) {
            Err(Error::UnknownEditionOrSyntax(id)) => assert_eq!(id, "2099"),
            other => panic!("Expected UnknownEditionOrSyntax, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_detected() {
        let mut root = Root::new("2023");
        let a = root.add_message(EntityId::ROOT, "A").unwrap();
        let b = root.add_message(a, "B").unwrap();
        root.set_lexical_parent(a, b).unwrap();

        assert!(matches!(resolve_all(&root), Err(Error::CycleDetected(_))));
        assert!(matches!(resolve_entity(&root, b), Err(Error::CycleDetected(_))));
    }

    #[test]
    fn test_child_declared_before_parent_in_arena() {
        // Reparenting can leave a child earlier in the arena than its parent.
        let mut root = Root::new("2023");
        let a = root.add_message(EntityId::ROOT, "A").unwrap();
        let b = root.add_message(EntityId::ROOT, "B").unwrap();
        root.declare_option(b, "features.enum_type", "CLOSED").unwrap();
        root.set_lexical_parent(a, b).unwrap();

        let resolution = resolve_all(&root).unwrap();
        assert_eq!(
            resolution.features(a).unwrap().get_scalar("enum_type"),
            Some("CLOSED")
        );
    }

    #[test]
    fn test_staleness_tracking() {
        let mut root = Root::new("2023");
        let message = root.add_message(EntityId::ROOT, "Message").unwrap();
        let resolution = root.resolve_all().unwrap();
        assert!(resolution.is_current(&root));

        root.declare_option(message, "features.json_format", "LEGACY_BEST_EFFORT")
            .unwrap();
        assert!(!resolution.is_current(&root));
        assert_eq!(
            resolution.features(message).unwrap().get_scalar("json_format"),
            Some("ALLOW")
        );

        let refreshed = root.resolve_all().unwrap();
        assert!(refreshed.is_current(&root));
        assert_eq!(
            refreshed.features(message).unwrap().get_scalar("json_format"),
            Some("LEGACY_BEST_EFFORT")
        );
    }

    #[test]
    fn test_resolve_entity_matches_full_pass() {
        let mut root = Root::new("proto3");
        root.declare_option(EntityId::ROOT, "features.(abc).d_e", "x").unwrap();
        let message = root.add_message(EntityId::ROOT, "Message").unwrap();
        let field = root.add_field(message, "f", 1, "string").unwrap();
        root.declare_option(field, "features.field_presence", "EXPLICIT").unwrap();
        let some_enum = root.add_enum(message, "E").unwrap();
        root.add_enum_value(some_enum, "ONE", 1).unwrap();
        root.declare_enum_value_option(some_enum, "ONE", "features.(abc).d_e", "y")
            .unwrap();

        let resolution = resolve_all(&root).unwrap();
        for id in root.ids() {
            assert_eq!(resolution.features(id).unwrap(), &resolve_entity(&root, id).unwrap());
        }
        assert_eq!(
            resolution.value_features(some_enum, "ONE").unwrap(),
            &resolve_enum_value(&root, some_enum, "ONE").unwrap()
        );
        assert!(resolve_enum_value(&root, message, "ONE").is_err());
        assert!(resolve_enum_value(&root, some_enum, "TWO").is_err());
    }

    #[test]
    fn test_iter_covers_every_entity() {
        let mut root = Root::new("2023");
        root.add_message(EntityId::ROOT, "Message").unwrap();
        let resolution = resolve_all(&root).unwrap();

        let ids: Vec<EntityId> = resolution.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, root.ids().collect::<Vec<_>>());
        assert_eq!(resolution.len(), 2);
        assert_eq!(resolution.file_features().len(), 6);
    }
}
