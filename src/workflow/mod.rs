//! Record store workflows: loading snapshots and batch marking.

pub mod bulk;
pub mod loader;

pub use bulk::{mark_class, BatchOptions, MarkClassRequest, MarkResult};
pub use loader::{LoadOutcome, Snapshot, SnapshotLoader};
