//! Attribution hook for recording who made a change.
//!
//! The store never requires attribution: the hook is an optional collaborator
//! invoked after commit, and only for mutations that carry an [`Actor`].
//! Bulk loads that omit the actor pay no per-row overhead. For bulk loads
//! that do want attribution, [`AttributionBatch`] buffers events so they can
//! be applied once at the end instead of per row.

use crate::types::RevisionId;
use parking_lot::Mutex;
use std::fmt;

/// An actor context supplied by the caller (user name, service id, ...).
///
/// The core does not interpret or authenticate it.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Actor(pub String);

impl Actor {
    pub fn new(name: impl Into<String>) -> Self {
        Actor(name.into())
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Actor({})", self.0)
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Post-commit observer for revision lifecycle changes.
///
/// Invoked by the store after the mutation has committed, never before, so a
/// hook cannot veto or roll back a write. Implementations must be cheap or
/// defer their own work; they run on the writer's thread.
pub trait AttributionHook: Send + Sync {
    /// A new revision was opened by `actor`.
    fn revision_opened(&self, revision: RevisionId, actor: &Actor);

    /// An existing revision's interval was closed (or tightened) on behalf
    /// of `actor` — by supersession or by an explicit delete.
    fn revision_closed(&self, revision: RevisionId, actor: &Actor);
}

/// What happened to a revision, as seen by the attribution hook.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributionEvent {
    Opened { revision: RevisionId, actor: Actor },
    Closed { revision: RevisionId, actor: Actor },
}

/// A buffering [`AttributionHook`] for bulk operations.
///
/// Records events in memory; the caller drains them once at the end of the
/// bulk load and applies them wherever attribution lives.
#[derive(Default)]
pub struct AttributionBatch {
    events: Mutex<Vec<AttributionEvent>>,
}

impl AttributionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Take all buffered events, leaving the buffer empty.
    pub fn drain(&self) -> Vec<AttributionEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl AttributionHook for AttributionBatch {
    fn revision_opened(&self, revision: RevisionId, actor: &Actor) {
        self.events.lock().push(AttributionEvent::Opened {
            revision,
            actor: actor.clone(),
        });
    }

    fn revision_closed(&self, revision: RevisionId, actor: &Actor) {
        self.events.lock().push(AttributionEvent::Closed {
            revision,
            actor: actor.clone(),
        });
    }
}
