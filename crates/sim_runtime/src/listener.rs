//! Tick-complete listeners.

use std::sync::Arc;

use tracing::debug;

use sim_ecs::SimError;
use sim_snapshot::{SnapshotDocument, SnapshotEngine};

use crate::matches::MatchRegistry;
use crate::resources::ResourceArea;

/// Notified after every completed tick.
///
/// Implementations are free to skip ticks; errors are logged by the game
/// loop and never abort the tick.
pub trait TickCompleteListener: Send + Sync {
    fn on_tick_complete(&self, tick: i64) -> Result<(), SimError>;
}

/// The bundled persistence listener: one JSON snapshot document per
/// `(match, tick)` written into the container's resource area.
pub struct DocumentStoreListener {
    container_id: i64,
    /// Persist every `stride` ticks.
    stride: i64,
    engine: Arc<SnapshotEngine>,
    matches: MatchRegistry,
    resources: ResourceArea,
}

impl DocumentStoreListener {
    /// Create a listener persisting every `stride` ticks.
    #[must_use]
    pub fn new(
        container_id: i64,
        stride: i64,
        engine: Arc<SnapshotEngine>,
        matches: MatchRegistry,
        resources: ResourceArea,
    ) -> Self {
        Self {
            container_id,
            stride: stride.max(1),
            engine,
            matches,
            resources,
        }
    }

    /// Resource path of one persisted document.
    #[must_use]
    pub fn document_path(match_id: i64, tick: i64) -> String {
        format!("snapshots/match_{match_id}/tick_{tick}.json")
    }
}

impl TickCompleteListener for DocumentStoreListener {
    fn on_tick_complete(&self, tick: i64) -> Result<(), SimError> {
        if tick % self.stride != 0 {
            return Ok(());
        }
        for m in self.matches.list() {
            let snapshot = self.engine.create_for_match(m.id)?;
            if snapshot.is_empty() {
                continue;
            }
            let document = SnapshotDocument::from_snapshot(self.container_id, m.id, tick, &snapshot);
            let bytes = serde_json::to_vec(&document)
                .map_err(|e| SimError::InvalidRequest(format!("cannot serialise snapshot: {e}")))?;
            self.resources
                .write(&Self::document_path(m.id, tick), &bytes)?;
            debug!(match_id = m.id, tick, "snapshot document persisted");
        }
        Ok(())
    }
}
