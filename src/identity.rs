//! Entity identity allocation.

use crate::error::{Result, StoreError};
use crate::types::{EntityId, RevisionId};

/// Derives the stable entity identifier for a revision.
///
/// An explicit id is returned unchanged — colliding with an existing entity
/// is deliberate insert-or-replace behavior, policed by the facade's
/// duplicate policy, not rejected here. Without one, the new revision's own
/// id becomes the entity id: revision ids are globally unique and monotonic,
/// so auto-assigned entity ids are pairwise distinct and `entity <= revision`
/// holds trivially, with no separate sequence generator.
pub struct IdentityAllocator;

impl IdentityAllocator {
    /// Resolve the entity id for a revision about to be appended.
    ///
    /// Fails with `ConstraintViolation` if an explicit id exceeds the
    /// revision id being assigned.
    pub fn assign(explicit: Option<EntityId>, revision: RevisionId) -> Result<EntityId> {
        match explicit {
            Some(entity) => {
                if entity.0 > revision.0 {
                    return Err(StoreError::ConstraintViolation(format!(
                        "entity id {} exceeds revision id {}",
                        entity, revision
                    )));
                }
                Ok(entity)
            }
            None => Ok(EntityId(revision.0)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_assign_uses_revision_id() {
        let entity = IdentityAllocator::assign(None, RevisionId(42)).unwrap();
        assert_eq!(entity, EntityId(42));
    }

    #[test]
    fn test_explicit_passthrough() {
        let entity = IdentityAllocator::assign(Some(EntityId(7)), RevisionId(42)).unwrap();
        assert_eq!(entity, EntityId(7));

        // Equal is allowed
        let entity = IdentityAllocator::assign(Some(EntityId(42)), RevisionId(42)).unwrap();
        assert_eq!(entity, EntityId(42));
    }

    #[test]
    fn test_explicit_above_revision_rejected() {
        let result = IdentityAllocator::assign(Some(EntityId(43)), RevisionId(42));
        assert!(matches!(result, Err(StoreError::ConstraintViolation(_))));
    }
}
