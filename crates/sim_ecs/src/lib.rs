//! Entity-component storage for the simulation platform.
//!
//! The store is a dense columnar float matrix: one row per entity slot, one
//! column per component. Absent values are represented by a dedicated
//! quiet-NaN [`NULL`] sentinel, so a cell never needs a per-value allocation.
//!
//! Composition order, innermost first:
//!
//! 1. [`ColumnStore`] — the raw matrix. Not thread-safe.
//! 2. [`DirtyTrackingStore`] — per-match added/modified/removed sets.
//! 3. [`SharedStore`] — the locking decorator; a cheaply clonable handle
//!    shared by the tick worker, module scoped views, and snapshot readers.

mod component;
mod dirty;
mod error;
mod shared;
mod store;

pub use component::{
    ComponentDef, ComponentId, ComponentKind, PermissionLevel, ENTITY_ID, MATCH_ID, OWNER_ID,
};
pub use dirty::{DirtyInfo, DirtyTrackingStore};
pub use error::SimError;
pub use shared::SharedStore;
pub use store::ColumnStore;

/// Entity identifier, unique within one container.
pub type EntityId = i64;

/// Match identifier, unique within one container.
pub type MatchId = i64;

/// Player identifier, issued by the edge.
pub type PlayerId = i64;

/// Bit pattern of the null sentinel: a non-canonical quiet NaN.
///
/// The canonical quiet NaN (`0x7FC0_0000`) is what ordinary float arithmetic
/// produces, so the sentinel uses a distinct payload bit to keep valid NaN
/// results from being classified as "absent".
pub const NULL_BITS: u32 = 0x7FC0_0001;

/// The null sentinel value written into every unoccupied cell.
pub const NULL: f32 = f32::from_bits(NULL_BITS);

/// Returns `true` iff `v` is the null sentinel.
///
/// Comparison is by bit pattern — IEEE equality would classify every NaN as
/// null (or none of them, depending on polarity).
#[must_use]
pub fn is_null(v: f32) -> bool {
    v.to_bits() == NULL_BITS
}
