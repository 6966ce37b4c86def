//! Revision storage: the durable append-only log and its in-memory index.

pub mod index;
pub mod log;

pub use index::{RevisionIndex, TimelineEntry};
pub use log::{RevisionIterator, RevisionLog};
