//! Snapshot value types.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use sim_ecs::{is_null, EntityId};

/// Name of the virtual entity-id column present in every module's data.
pub const ENTITY_ID_COLUMN: &str = "entity_id";

/// One named column of float values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentData {
    /// Component name.
    pub name: String,
    /// One value per entity row; null-sentinel where the entity lacks the
    /// component.
    pub values: Vec<f32>,
}

/// All columns one module contributes to a snapshot.
///
/// Every `values` list has the same length; row `i` of each column belongs
/// to the entity at row `i` of the [`ENTITY_ID_COLUMN`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleData {
    pub module_name: String,
    pub module_version: String,
    pub components: Vec<ComponentData>,
}

impl ModuleData {
    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ComponentData> {
        self.components.iter().find(|c| c.name == name)
    }

    /// The entity ids of this module's rows, from the entity-id column.
    #[must_use]
    pub fn entity_ids(&self) -> Vec<EntityId> {
        self.column(ENTITY_ID_COLUMN)
            .map(|col| {
                col.values
                    .iter()
                    .filter(|v| !is_null(**v))
                    .map(|&v| v as EntityId)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Number of entity rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.components.first().map_or(0, |c| c.values.len())
    }
}

/// An ordered columnar extract of one match at one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub modules: Vec<ModuleData>,
}

impl Snapshot {
    /// Look up one module's data by name.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleData> {
        self.modules.iter().find(|m| m.module_name == name)
    }

    /// Every entity present in any module's rows.
    #[must_use]
    pub fn entity_ids(&self) -> BTreeSet<EntityId> {
        self.modules
            .iter()
            .flat_map(ModuleData::entity_ids)
            .collect()
    }

    /// Returns `true` when no module contributed any rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}
