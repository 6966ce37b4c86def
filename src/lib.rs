//! # Revision Store
//!
//! An append-only store of entity versions with point-in-time queries and
//! scheduled revisions. History is never destructively overwritten: every
//! write appends a revision, and earlier revisions of the same entity have
//! their effective intervals narrowed instead of being deleted.
//!
//! ## Core Concepts
//!
//! - **Entities**: Stable logical records identified by an `EntityId`
//! - **Revisions**: Append-only versions, each effective over
//!   `[added_at, removed_at)`
//! - **Supersession**: A newer revision narrows its predecessors' intervals
//! - **Point-in-time queries**: The state of any entity at any past, present,
//!   or future instant, in O(log n) per entity
//! - **Scheduling**: A future-dated revision becomes active automatically
//!   when its instant arrives — the interval arithmetic is the schedule
//!
//! ## Example
//!
//! ```ignore
//! use revlog::{RevisionInput, Store, StoreConfig, Timestamp};
//! use serde_json::json;
//!
//! let store = Store::open_or_create(StoreConfig {
//!     path: "./my-store".into(),
//!     ..Default::default()
//! })?;
//!
//! // Insert an entity
//! let rev = store.insert(RevisionInput::json(&json!({"name": "Ada"}))?)?;
//!
//! // Update it (the old revision stays queryable)
//! store.update(rev.entity, RevisionInput::json(&json!({"name": "Ada L."}))?)?;
//!
//! // Read it back as of any instant
//! let then = store.entity_as_of(rev.entity, rev.added_at)?;
//! let now = store.entity_as_of(rev.entity, Timestamp::now())?;
//! ```

pub mod attribution;
pub mod error;
pub mod identity;
pub mod revisions;
pub mod snapshot;
pub mod store;
pub mod supersede;
pub mod types;

// Re-exports
pub use attribution::{Actor, AttributionBatch, AttributionEvent, AttributionHook};
pub use error::{Result, StoreError};
pub use identity::IdentityAllocator;
pub use revisions::{RevisionIndex, RevisionLog, TimelineEntry};
pub use snapshot::SnapshotView;
pub use store::{DuplicatePolicy, IdentityChangePolicy, Store, StoreConfig};
pub use supersede::SupersessionResolver;
pub use types::*;
