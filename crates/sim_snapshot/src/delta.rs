//! Delta compression between two snapshots of the same match.
//!
//! Snapshots are compared in sparse map form: `(module, component, entity) →
//! value`, with null-sentinel cells treated as absent. A changed entry
//! records the *new* value; the null sentinel as a new value encodes a
//! component removal. Float comparison is by bit pattern throughout, so NaN
//! payloads diff reliably.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use sim_ecs::{is_null, EntityId, MatchId, NULL};

use crate::snapshot::{ComponentData, ModuleData, Snapshot, ENTITY_ID_COLUMN};

/// Sparse description of the difference between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaSnapshot {
    pub match_id: MatchId,
    pub from_tick: i64,
    pub to_tick: i64,
    /// module → component → entity → new value.
    pub changed_components: BTreeMap<String, BTreeMap<String, BTreeMap<EntityId, f32>>>,
    pub added_entities: BTreeSet<EntityId>,
    pub removed_entities: BTreeSet<EntityId>,
}

impl DeltaSnapshot {
    /// Returns `true` when the two snapshots were identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_components.is_empty()
            && self.added_entities.is_empty()
            && self.removed_entities.is_empty()
    }
}

type ColumnMap = BTreeMap<EntityId, f32>;

#[derive(Debug, Clone, Default, PartialEq)]
struct ModuleMap {
    version: String,
    columns: BTreeMap<String, ColumnMap>,
}

/// Sparse map form of a snapshot; null cells are dropped.
fn to_maps(snapshot: &Snapshot) -> BTreeMap<String, ModuleMap> {
    let mut modules = BTreeMap::new();
    for module in &snapshot.modules {
        let entities = module.entity_ids();
        let mut columns: BTreeMap<String, ColumnMap> = BTreeMap::new();
        for component in &module.components {
            let mut column = ColumnMap::new();
            for (row, &value) in component.values.iter().enumerate() {
                if is_null(value) {
                    continue;
                }
                if let Some(&entity) = entities.get(row) {
                    column.insert(entity, value);
                }
            }
            if !column.is_empty() {
                columns.insert(component.name.clone(), column);
            }
        }
        modules.insert(
            module.module_name.clone(),
            ModuleMap {
                version: module.module_version.clone(),
                columns,
            },
        );
    }
    modules
}

/// Value-equality of two snapshots, ignoring row and column ordering.
#[must_use]
pub fn value_equal(a: &Snapshot, b: &Snapshot) -> bool {
    to_maps(a) == to_maps(b)
}

fn bits(v: Option<f32>) -> u32 {
    v.unwrap_or(NULL).to_bits()
}

/// Compute the sparse difference between two snapshots of one match.
#[must_use]
pub fn compute_delta(
    match_id: MatchId,
    from_tick: i64,
    to_tick: i64,
    from: &Snapshot,
    to: &Snapshot,
) -> DeltaSnapshot {
    let from_map = to_maps(from);
    let to_map = to_maps(to);

    let from_entities = from.entity_ids();
    let to_entities = to.entity_ids();
    let added_entities: BTreeSet<EntityId> =
        to_entities.difference(&from_entities).copied().collect();
    let removed_entities: BTreeSet<EntityId> =
        from_entities.difference(&to_entities).copied().collect();

    let mut changed_components: BTreeMap<String, BTreeMap<String, BTreeMap<EntityId, f32>>> =
        BTreeMap::new();

    let module_names: BTreeSet<&String> = from_map.keys().chain(to_map.keys()).collect();
    for module_name in module_names {
        let empty = ModuleMap::default();
        let from_module = from_map.get(module_name).unwrap_or(&empty);
        let to_module = to_map.get(module_name).unwrap_or(&empty);

        let column_names: BTreeSet<&String> = from_module
            .columns
            .keys()
            .chain(to_module.columns.keys())
            .collect();
        let mut changed_columns: BTreeMap<String, BTreeMap<EntityId, f32>> = BTreeMap::new();
        for column_name in column_names {
            let empty_column = ColumnMap::new();
            let from_column = from_module.columns.get(column_name).unwrap_or(&empty_column);
            let to_column = to_module.columns.get(column_name).unwrap_or(&empty_column);

            let entities: BTreeSet<EntityId> =
                from_column.keys().chain(to_column.keys()).copied().collect();
            let mut changes = BTreeMap::new();
            for entity in entities {
                if removed_entities.contains(&entity) {
                    continue; // covered by the removed set
                }
                let old = from_column.get(&entity).copied();
                let new = to_column.get(&entity).copied();
                if bits(old) != bits(new) {
                    changes.insert(entity, new.unwrap_or(NULL));
                }
            }
            if !changes.is_empty() {
                changed_columns.insert(column_name.clone(), changes);
            }
        }
        if !changed_columns.is_empty() {
            changed_components.insert(module_name.clone(), changed_columns);
        }
    }

    DeltaSnapshot {
        match_id,
        from_tick,
        to_tick,
        changed_components,
        added_entities,
        removed_entities,
    }
}

/// Apply a delta to a base snapshot, yielding the target snapshot up to row
/// and column ordering.
#[must_use]
pub fn apply_delta(base: &Snapshot, delta: &DeltaSnapshot) -> Snapshot {
    let mut modules = to_maps(base);

    for (module_name, columns) in &delta.changed_components {
        let module = modules.entry(module_name.clone()).or_default();
        for (column_name, changes) in columns {
            let column = module.columns.entry(column_name.clone()).or_default();
            for (&entity, &value) in changes {
                if is_null(value) {
                    column.remove(&entity);
                } else {
                    column.insert(entity, value);
                }
            }
            if column.is_empty() {
                module.columns.remove(column_name);
            }
        }
    }

    for module in modules.values_mut() {
        for column in module.columns.values_mut() {
            column.retain(|entity, _| !delta.removed_entities.contains(entity));
        }
        module.columns.retain(|_, column| !column.is_empty());
    }

    // Rebuild columnar form. Rows come from the entity-id column; other
    // columns align to it with null fill.
    let mut out = Vec::new();
    for (module_name, module) in modules {
        let Some(entity_column) = module.columns.get(ENTITY_ID_COLUMN) else {
            continue;
        };
        let rows: Vec<EntityId> = entity_column.keys().copied().collect();
        if rows.is_empty() {
            continue;
        }
        let mut components = Vec::with_capacity(module.columns.len());
        components.push(ComponentData {
            name: ENTITY_ID_COLUMN.to_string(),
            values: rows.iter().map(|&e| e as f32).collect(),
        });
        for (name, column) in &module.columns {
            if name == ENTITY_ID_COLUMN {
                continue;
            }
            components.push(ComponentData {
                name: name.clone(),
                values: rows
                    .iter()
                    .map(|entity| column.get(entity).copied().unwrap_or(NULL))
                    .collect(),
            });
        }
        out.push(ModuleData {
            module_name,
            module_version: module.version,
            components,
        });
    }

    Snapshot { modules: out }
}
