//! The persisted snapshot document layout.
//!
//! The bundled tick-complete listener serialises one document per
//! `(container, match, tick)`:
//!
//! ```json
//! { "containerId": 1, "matchId": 100, "tick": 42,
//!   "timestamp": "2026-01-01T00:00:00Z",
//!   "data": { "movement": { "position_x": [1.0, 2.0] } } }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// A snapshot as persisted by the document-store listener.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotDocument {
    pub container_id: i64,
    pub match_id: i64,
    pub tick: i64,
    /// ISO-8601 persistence instant.
    pub timestamp: DateTime<Utc>,
    /// module name → component name → column values.
    pub data: BTreeMap<String, BTreeMap<String, Vec<f32>>>,
}

impl SnapshotDocument {
    /// Build a document from an extracted snapshot, stamped with `Utc::now`.
    #[must_use]
    pub fn from_snapshot(container_id: i64, match_id: i64, tick: i64, snapshot: &Snapshot) -> Self {
        let data = snapshot
            .modules
            .iter()
            .map(|module| {
                let columns = module
                    .components
                    .iter()
                    .map(|c| (c.name.clone(), c.values.clone()))
                    .collect();
                (module.module_name.clone(), columns)
            })
            .collect();
        Self {
            container_id,
            match_id,
            tick,
            timestamp: Utc::now(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::snapshot::{ComponentData, ModuleData, ENTITY_ID_COLUMN};

    use super::*;

    #[test]
    fn test_document_layout() {
        let snapshot = Snapshot {
            modules: vec![ModuleData {
                module_name: "movement".to_string(),
                module_version: "1.0.0".to_string(),
                components: vec![
                    ComponentData {
                        name: ENTITY_ID_COLUMN.to_string(),
                        values: vec![1.0, 2.0],
                    },
                    ComponentData {
                        name: "position_x".to_string(),
                        values: vec![100.0, 200.0],
                    },
                ],
            }],
        };
        let doc = SnapshotDocument::from_snapshot(1, 100, 42, &snapshot);
        let json = serde_json::to_value(&doc).unwrap();

        assert_eq!(json["containerId"], 1);
        assert_eq!(json["matchId"], 100);
        assert_eq!(json["tick"], 42);
        assert!(json["timestamp"].is_string());
        assert_eq!(json["data"]["movement"]["position_x"][1], 200.0);
    }

    #[test]
    fn test_document_json_round_trip() {
        let doc = SnapshotDocument {
            container_id: 2,
            match_id: 7,
            tick: 3,
            timestamp: Utc::now(),
            data: BTreeMap::from([(
                "combat".to_string(),
                BTreeMap::from([("hp".to_string(), vec![10.0])]),
            )]),
        };
        let json = serde_json::to_string(&doc).unwrap();
        let back: SnapshotDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(back, doc);
    }
}
