//! Error types for the revision store.

use crate::types::{EntityId, RevisionId, Timestamp};
use thiserror::Error;

/// Main error type for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An append or patch would violate a structural invariant
    /// (`entity > revision id`, or `added_at > removed_at`). The operation
    /// is rejected atomically; no partial state change occurs.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A read observed more than one active revision for an entity at a
    /// single instant. Indicates a concurrency-control failure upstream
    /// (missing per-entity serialization); surfaced, never repaired.
    #[error("Integrity error: entity {entity} has {count} active revisions at {at:?}")]
    Integrity {
        entity: EntityId,
        at: Timestamp,
        count: usize,
    },

    #[error("Revision not found: {0}")]
    RevisionNotFound(RevisionId),

    /// Insert with an explicit entity id that already has an active revision,
    /// under `DuplicatePolicy::Reject`.
    #[error("Duplicate identifier: entity {0} already has an active revision")]
    DuplicateIdentifier(EntityId),

    /// Update that changes an entity's identity, under
    /// `IdentityChangePolicy::Reject`.
    #[error("Identity change rejected: {from} -> {to}")]
    IdentityChangeRejected { from: EntityId, to: EntityId },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for StoreError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for StoreError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        StoreError::Deserialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
