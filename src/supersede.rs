//! Supersession: narrowing earlier revisions when a later one takes effect.

use crate::error::{Result, StoreError};
use crate::revisions::{RevisionIndex, RevisionLog};
use crate::types::{EntityId, RevisionId, Timestamp};
use std::sync::Arc;

/// Resolves effective intervals for an entity's revisions after an append.
///
/// Revisions of one entity are totally ordered by `added_at` ascending, ties
/// broken by revision id ascending. At the fixed point, each revision's
/// `removed_at` is the infimum of the `added_at` of all strictly later
/// revisions in that order — unset only for the final revision, unless an
/// explicit delete closed it. `resolve` recomputes that fixed point.
///
/// The recomputation is idempotent and order-independent: `removed_at` only
/// ever moves earlier, so running it after every append converges to the
/// same result regardless of interleaving, and a future-dated insert can
/// never resurrect a revision that a closer successor already closed.
pub struct SupersessionResolver {
    log: Arc<RevisionLog>,
    index: Arc<RevisionIndex>,
}

impl SupersessionResolver {
    pub fn new(log: Arc<RevisionLog>, index: Arc<RevisionIndex>) -> Self {
        Self { log, index }
    }

    /// Re-derive `removed_at` bounds for all revisions of `entity`.
    ///
    /// Must run with the entity's mutation lock held. Returns the
    /// tightenings applied, as `(revision, new removed_at)` pairs, so the
    /// caller can notify the attribution hook.
    pub fn resolve(&self, entity: EntityId) -> Result<Vec<(RevisionId, Timestamp)>> {
        let timeline = self.index.timeline(entity);
        let mut tightened = Vec::new();

        // The timeline is sorted by (added_at, id), so the infimum over all
        // strict successors is the immediate successor's added_at.
        for pair in timeline.windows(2) {
            let (revision, successor) = (&pair[0], &pair[1]);
            let bound = successor.added_at;

            let needs_tightening = match revision.removed_at {
                None => true,
                Some(current) => current > bound,
            };
            if !needs_tightening {
                continue;
            }

            let offset = self
                .index
                .offset_of(revision.id)
                .ok_or(StoreError::RevisionNotFound(revision.id))?;
            self.log.set_removed(offset, bound)?;
            self.index.set_removed(entity, revision.id, bound);

            tracing::debug!(
                %entity,
                revision = %revision.id,
                removed_at = bound.0,
                "superseded revision"
            );
            tightened.push((revision.id, bound));
        }

        Ok(tightened)
    }
}
