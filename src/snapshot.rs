//! Point-in-time queries over the revision log.

use crate::error::{Result, StoreError};
use crate::revisions::{RevisionIndex, RevisionLog};
use crate::types::{EntityId, Revision, Timestamp};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Read-only view of the store at arbitrary instants.
///
/// `at = now` yields current state, a past `at` yields historical audit,
/// and a future `at` yields the scheduled state. The view only reads the
/// log; it never mutates it, and it never blocks writers of other entities.
pub struct SnapshotView {
    log: Arc<RevisionLog>,
    index: Arc<RevisionIndex>,
}

impl SnapshotView {
    pub fn new(log: Arc<RevisionLog>, index: Arc<RevisionIndex>) -> Self {
        Self { log, index }
    }

    /// The active revision of every entity at `at`.
    ///
    /// Entities with no active revision at `at` are absent from the result.
    /// Non-overlap of intervals guarantees at most one revision per entity;
    /// observing more than one fails with `Integrity`.
    pub fn as_of(&self, at: Timestamp) -> Result<BTreeMap<EntityId, Revision>> {
        let mut result = BTreeMap::new();

        for entity in self.index.entities() {
            if let Some(revision) = self.entity_as_of(entity, at)? {
                result.insert(entity, revision);
            }
        }

        Ok(result)
    }

    /// The active revision of one entity at `at`, if any. O(log n).
    pub fn entity_as_of(&self, entity: EntityId, at: Timestamp) -> Result<Option<Revision>> {
        let id = match self.index.active_at(entity, at)? {
            Some(id) => id,
            None => return Ok(None),
        };

        let offset = self
            .index
            .offset_of(id)
            .ok_or(StoreError::RevisionNotFound(id))?;

        Ok(Some(self.log.read_at(offset)?))
    }

    /// The active revision of every entity right now.
    pub fn current(&self) -> Result<BTreeMap<EntityId, Revision>> {
        self.as_of(Timestamp::now())
    }
}
