//! Run-scoped remote-id to local-id mappings.
//!
//! Every successful write that originates from a foreign record registers
//! `entity -> remote id -> local id`; later records resolve their foreign keys
//! through it. Entries are append-only for the lifetime of one import and are
//! never persisted, so a rerun starts from an empty map.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::core::{EntityType, LocalId, RemoteId};
use crate::error::{MigrateError, Result};

/// Table of tables: entity type -> remote id -> local id.
#[derive(Debug, Default, Clone)]
pub struct IdentityMap {
    buckets: HashMap<EntityType, HashMap<RemoteId, LocalId>>,
}

impl IdentityMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a mapping.
    ///
    /// Registering the same `(entity, remote, local)` again is a no-op; a
    /// different local id for an already mapped remote id is an error and
    /// leaves the existing entry untouched.
    pub fn remember(
        &mut self,
        entity: EntityType,
        remote_id: impl Into<RemoteId>,
        local_id: LocalId,
    ) -> Result<()> {
        let remote_id = remote_id.into();
        let bucket = self.buckets.entry(entity).or_default();
        match bucket.get(&remote_id) {
            Some(&existing) if existing == local_id => Ok(()),
            Some(&existing) => Err(MigrateError::IdentityConflict {
                entity: entity.to_string(),
                remote_id,
                existing,
                attempted: local_id,
            }),
            None => {
                debug!("{}: remote {} -> local {}", entity, remote_id, local_id);
                bucket.insert(remote_id, local_id);
                Ok(())
            }
        }
    }

    /// Look up a mapping.
    pub fn lookup(&self, entity: EntityType, remote_id: &str) -> Option<LocalId> {
        self.buckets
            .get(&entity)
            .and_then(|bucket| bucket.get(remote_id))
            .copied()
    }

    /// Look up a mapping that must exist.
    pub fn require(&self, entity: EntityType, remote_id: &str) -> Result<LocalId> {
        self.lookup(entity, remote_id)
            .ok_or_else(|| MigrateError::NotMigrated {
                entity: entity.to_string(),
                remote_id: remote_id.to_string(),
            })
    }

    /// Resolve an optional foreign key.
    ///
    /// `None` stays `None` (the foreign schema allows the reference to be
    /// absent); a present but unmapped reference is an error.
    pub fn resolve_optional(
        &self,
        entity: EntityType,
        remote_id: Option<&str>,
    ) -> Result<Option<LocalId>> {
        remote_id.map(|id| self.require(entity, id)).transpose()
    }

    /// Seed a bucket with caller-supplied mappings before a run.
    pub fn merge_overrides<'a, I>(&mut self, entity: EntityType, overrides: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a String, &'a LocalId)>,
    {
        for (remote, local) in overrides {
            self.remember(entity, remote.clone(), *local)?;
        }
        Ok(())
    }

    /// Number of mappings for an entity type.
    pub fn len(&self, entity: EntityType) -> usize {
        self.buckets.get(&entity).map(HashMap::len).unwrap_or(0)
    }

    /// True if no mappings exist at all.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(HashMap::is_empty)
    }

    /// Mappings for an entity type, ordered by remote id.
    pub fn entries(&self, entity: EntityType) -> BTreeMap<RemoteId, LocalId> {
        self.buckets
            .get(&entity)
            .map(|bucket| bucket.iter().map(|(r, l)| (r.clone(), *l)).collect())
            .unwrap_or_default()
    }

    /// Per-entity mapping counts for reporting.
    pub fn counts(&self) -> BTreeMap<EntityType, usize> {
        self.buckets
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(entity, bucket)| (*entity, bucket.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remember_then_lookup() {
        let mut map = IdentityMap::new();
        for (i, entity) in EntityType::ALL.iter().enumerate() {
            map.remember(*entity, "7", i as u64 + 100).unwrap();
            assert_eq!(map.lookup(*entity, "7"), Some(i as u64 + 100));
        }
        assert_eq!(map.lookup(EntityType::Clients, "8"), None);
    }

    #[test]
    fn test_identical_registration_is_idempotent() {
        let mut map = IdentityMap::new();
        map.remember(EntityType::Clients, "1", 10).unwrap();
        map.remember(EntityType::Clients, "1", 10).unwrap();
        assert_eq!(map.len(EntityType::Clients), 1);
    }

    #[test]
    fn test_conflicting_registration_is_rejected() {
        let mut map = IdentityMap::new();
        map.remember(EntityType::Invoices, "5", 50).unwrap();
        let err = map.remember(EntityType::Invoices, "5", 51).unwrap_err();
        assert!(matches!(
            err,
            MigrateError::IdentityConflict { existing: 50, attempted: 51, .. }
        ));
        assert_eq!(map.lookup(EntityType::Invoices, "5"), Some(50));
    }

    #[test]
    fn test_buckets_are_independent() {
        let mut map = IdentityMap::new();
        map.remember(EntityType::Clients, "1", 10).unwrap();
        map.remember(EntityType::Contacts, "1", 20).unwrap();
        assert_eq!(map.lookup(EntityType::Clients, "1"), Some(10));
        assert_eq!(map.lookup(EntityType::Contacts, "1"), Some(20));
    }

    #[test]
    fn test_require_reports_unmigrated_reference() {
        let map = IdentityMap::new();
        let err = map.require(EntityType::Clients, "3").unwrap_err();
        assert!(matches!(err, MigrateError::NotMigrated { .. }));
        assert_eq!(map.resolve_optional(EntityType::Clients, None).unwrap(), None);
        assert!(map.resolve_optional(EntityType::Clients, Some("3")).is_err());
    }

    #[test]
    fn test_merge_overrides() {
        let mut map = IdentityMap::new();
        let overrides: BTreeMap<String, u64> =
            [("12".to_string(), 3), ("13".to_string(), 4)].into_iter().collect();
        map.merge_overrides(EntityType::Packages, &overrides).unwrap();
        assert_eq!(map.lookup(EntityType::Packages, "13"), Some(4));
        assert_eq!(map.counts().get(&EntityType::Packages), Some(&2));
    }
}
