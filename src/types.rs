//! Core types for the revision store.

use crate::attribution::Actor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Unique identifier for a revision.
///
/// Assigned by the log at append time; strictly monotonically increasing
/// and never reused.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RevisionId(pub u64);

impl fmt::Debug for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RevisionId({})", self.0)
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable identifier for a logical entity, shared by all of its revisions.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub u64);

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time.
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }

    /// Construct from microseconds since epoch.
    pub fn from_micros(micros: i64) -> Self {
        Timestamp(micros)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Payload encoding format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PayloadEncoding {
    #[default]
    Json,
    MessagePack,
    Raw,
}

/// One version of an entity.
///
/// Every field except `removed_at` is immutable after append. `removed_at`
/// starts unset (open-ended interval) and may later be tightened — set once,
/// then only ever moved earlier — when a newer revision supersedes this one
/// or an explicit delete closes it. The effective interval is
/// `[added_at, removed_at)`, or `[added_at, ∞)` while unset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Revision {
    /// Unique identifier (assigned by the log).
    pub id: RevisionId,

    /// Which logical entity this revision belongs to.
    pub entity: EntityId,

    /// Inclusive start of the effective interval.
    pub added_at: Timestamp,

    /// Exclusive end of the effective interval; `None` = open-ended.
    pub removed_at: Option<Timestamp>,

    /// Application-defined payload.
    pub payload: Vec<u8>,

    /// Payload encoding.
    pub encoding: PayloadEncoding,
}

impl Revision {
    /// Whether this revision's effective interval contains `at`.
    ///
    /// Zero-length intervals (`added_at == removed_at`) contain no instant.
    pub fn is_active_at(&self, at: Timestamp) -> bool {
        self.added_at <= at && self.removed_at.map_or(true, |r| r > at)
    }
}

/// Input for creating a new revision (before the id is assigned).
///
/// `entity` absent means a fresh entity (its id becomes the revision id).
/// `added_at` absent means now. `removed_at` is accepted for completeness —
/// normal callers never set it — and is validated against `added_at` at the
/// append boundary. `actor` opts this mutation into the attribution hook.
#[derive(Clone, Debug)]
pub struct RevisionInput {
    pub entity: Option<EntityId>,
    pub added_at: Option<Timestamp>,
    pub removed_at: Option<Timestamp>,
    pub payload: Vec<u8>,
    pub encoding: PayloadEncoding,
    pub actor: Option<Actor>,
}

impl RevisionInput {
    /// Create a revision input with a JSON payload.
    pub fn json(payload: &impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Self {
            entity: None,
            added_at: None,
            removed_at: None,
            payload: serde_json::to_vec(payload)?,
            encoding: PayloadEncoding::Json,
            actor: None,
        })
    }

    /// Create a revision input with a MessagePack payload.
    pub fn msgpack(payload: &impl Serialize) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            entity: None,
            added_at: None,
            removed_at: None,
            payload: rmp_serde::to_vec(payload)?,
            encoding: PayloadEncoding::MessagePack,
            actor: None,
        })
    }

    /// Create a revision input with raw bytes.
    pub fn raw(payload: Vec<u8>) -> Self {
        Self {
            entity: None,
            added_at: None,
            removed_at: None,
            payload,
            encoding: PayloadEncoding::Raw,
            actor: None,
        }
    }

    /// Target an existing entity instead of allocating a fresh one.
    pub fn with_entity(mut self, entity: EntityId) -> Self {
        self.entity = Some(entity);
        self
    }

    /// Set the interval start explicitly (past or future; default is now).
    pub fn with_added_at(mut self, at: Timestamp) -> Self {
        self.added_at = Some(at);
        self
    }

    /// Pre-close the interval. Must not precede `added_at`.
    pub fn with_removed_at(mut self, at: Timestamp) -> Self {
        self.removed_at = Some(at);
        self
    }

    /// Attach an actor context for the attribution hook.
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }
}

/// Store statistics.
#[derive(Clone, Debug, Default)]
pub struct StoreStats {
    pub revision_count: u64,
    pub entity_count: u64,
    pub log_size_bytes: u64,
}
