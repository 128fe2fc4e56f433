//! Snapshot and delta extraction over a container's ECS.
//!
//! A [`Snapshot`] is a read-only columnar extract of one match's entities at
//! one tick: per module, a set of parallel columns aligned with a virtual
//! entity-id column. The [`DeltaSnapshot`] describes the sparse difference
//! between two snapshots of the same match; [`apply_delta`] reverses
//! [`compute_delta`] up to ordering.

mod delta;
mod document;
mod engine;
mod snapshot;

pub use delta::{apply_delta, compute_delta, value_equal, DeltaSnapshot};
pub use document::SnapshotDocument;
pub use engine::SnapshotEngine;
pub use snapshot::{ComponentData, ModuleData, Snapshot, ENTITY_ID_COLUMN};
