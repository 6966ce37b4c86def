//! In-memory revision indices for efficient lookups.
//!
//! Everything here is derivable from the log and rebuilt by scanning it on
//! open; nothing is persisted separately.

use crate::error::{Result, StoreError};
use crate::types::{EntityId, RevisionId, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;

/// One revision's place on an entity's timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimelineEntry {
    pub id: RevisionId,
    pub added_at: Timestamp,
    pub removed_at: Option<Timestamp>,
}

impl TimelineEntry {
    /// Sort key: the per-entity total order (`added_at`, then id).
    fn key(&self) -> (Timestamp, RevisionId) {
        (self.added_at, self.id)
    }

    fn is_active_at(&self, at: Timestamp) -> bool {
        self.added_at <= at && self.removed_at.map_or(true, |r| r > at)
    }
}

/// Index mapping revisions to file offsets and entities to their timelines.
pub struct RevisionIndex {
    /// Revision ID to file offset.
    offsets: RwLock<HashMap<RevisionId, u64>>,

    /// Entity ID to its revisions, sorted by (added_at, id).
    timelines: RwLock<HashMap<EntityId, Vec<TimelineEntry>>>,
}

impl RevisionIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self {
            offsets: RwLock::new(HashMap::new()),
            timelines: RwLock::new(HashMap::new()),
        }
    }

    /// Add a revision to the index.
    pub fn add(
        &self,
        id: RevisionId,
        entity: EntityId,
        added_at: Timestamp,
        removed_at: Option<Timestamp>,
        offset: u64,
    ) {
        self.offsets.write().insert(id, offset);

        let entry = TimelineEntry {
            id,
            added_at,
            removed_at,
        };

        let mut timelines = self.timelines.write();
        let timeline = timelines.entry(entity).or_default();
        let pos = timeline.partition_point(|e| e.key() < entry.key());
        timeline.insert(pos, entry);
    }

    /// Record a tightened `removed_at` for a revision of `entity`.
    pub fn set_removed(&self, entity: EntityId, id: RevisionId, removed_at: Timestamp) {
        let mut timelines = self.timelines.write();
        if let Some(timeline) = timelines.get_mut(&entity) {
            if let Some(entry) = timeline.iter_mut().find(|e| e.id == id) {
                entry.removed_at = Some(removed_at);
            }
        }
    }

    /// Get the file offset for a revision.
    pub fn offset_of(&self, id: RevisionId) -> Option<u64> {
        self.offsets.read().get(&id).copied()
    }

    /// Get a copy of an entity's timeline, sorted by (added_at, id).
    pub fn timeline(&self, entity: EntityId) -> Vec<TimelineEntry> {
        self.timelines
            .read()
            .get(&entity)
            .cloned()
            .unwrap_or_default()
    }

    /// All known entity IDs.
    pub fn entities(&self) -> Vec<EntityId> {
        self.timelines.read().keys().copied().collect()
    }

    /// Find the revision of `entity` active at `at`, in O(log n).
    ///
    /// The candidate is the last revision in (added_at, id) order whose
    /// interval starts at or before `at`; when the per-entity intervals are
    /// non-overlapping, no other revision can contain `at`. A backward walk
    /// over still-active neighbors detects overlap and surfaces it as
    /// `Integrity` rather than silently picking one.
    pub fn active_at(&self, entity: EntityId, at: Timestamp) -> Result<Option<RevisionId>> {
        let timelines = self.timelines.read();
        let timeline = match timelines.get(&entity) {
            Some(t) => t,
            None => return Ok(None),
        };

        let upper = timeline.partition_point(|e| e.added_at <= at);
        if upper == 0 {
            return Ok(None);
        }

        let mut active = None;
        let mut count = 0;
        for entry in timeline[..upper].iter().rev() {
            if entry.is_active_at(at) {
                if active.is_none() {
                    active = Some(entry.id);
                }
                count += 1;
            } else if entry.removed_at.is_some() {
                // Closed before `at`; everything earlier closed earlier still.
                break;
            }
        }

        if count > 1 {
            tracing::warn!(%entity, at = at.0, count, "overlapping active revisions");
            return Err(StoreError::Integrity { entity, at, count });
        }

        Ok(active)
    }

    /// Total number of indexed revisions.
    pub fn count(&self) -> usize {
        self.offsets.read().len()
    }

    /// Number of known entities.
    pub fn entity_count(&self) -> usize {
        self.timelines.read().len()
    }
}

impl Default for RevisionIndex {
    fn default() -> Self {
        Self::new()
    }
}
