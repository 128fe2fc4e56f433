//! Match-filtered snapshot extraction.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use sim_ecs::{is_null, ComponentId, EntityId, MatchId, PlayerId, SharedStore, SimError, MATCH_ID, OWNER_ID};
use sim_module::ModuleRegistry;

use crate::snapshot::{ComponentData, ModuleData, Snapshot, ENTITY_ID_COLUMN};

/// The cached extraction plan for one module.
#[derive(Debug, Clone)]
struct ModulePlan {
    module_name: String,
    module_version: String,
    flag: Option<ComponentId>,
    /// (component id, column name) pairs, flag first.
    columns: Vec<(ComponentId, String)>,
}

/// Extracts match-filtered snapshots from a container's ECS.
///
/// The module/column plan is built lazily from the registry and rebuilt
/// whenever the registry generation moves (module install/uninstall/reload).
pub struct SnapshotEngine {
    store: SharedStore,
    registry: Arc<ModuleRegistry>,
    plan: Mutex<Option<(u64, Arc<Vec<ModulePlan>>)>>,
}

impl std::fmt::Debug for SnapshotEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotEngine").finish_non_exhaustive()
    }
}

impl SnapshotEngine {
    /// Create an engine over a container's store and registry.
    #[must_use]
    pub fn new(store: SharedStore, registry: Arc<ModuleRegistry>) -> Self {
        Self {
            store,
            registry,
            plan: Mutex::new(None),
        }
    }

    /// Snapshot every entity of a match.
    pub fn create_for_match(&self, match_id: MatchId) -> Result<Snapshot, SimError> {
        self.create_filtered(match_id, None)
    }

    /// Snapshot the entities of a match owned by one player.
    pub fn create_for_match_and_player(
        &self,
        match_id: MatchId,
        player_id: PlayerId,
    ) -> Result<Snapshot, SimError> {
        self.create_filtered(match_id, Some(player_id))
    }

    fn plan(&self) -> Arc<Vec<ModulePlan>> {
        let generation = self.registry.generation();
        let mut cached = self.plan.lock();
        if let Some((cached_generation, plan)) = cached.as_ref() {
            if *cached_generation == generation {
                return plan.clone();
            }
        }
        let plan: Vec<ModulePlan> = self
            .registry
            .resolve_all()
            .iter()
            .map(|module| ModulePlan {
                module_name: module.name.clone(),
                module_version: module.version.clone(),
                flag: module.flag.as_ref().map(|f| f.id),
                columns: module
                    .flag
                    .iter()
                    .chain(module.components.iter())
                    .map(|def| (def.id, def.name.clone()))
                    .collect(),
            })
            .collect();
        debug!(modules = plan.len(), generation, "rebuilt snapshot plan");
        let plan = Arc::new(plan);
        *cached = Some((generation, plan.clone()));
        plan
    }

    fn create_filtered(
        &self,
        match_id: MatchId,
        player_id: Option<PlayerId>,
    ) -> Result<Snapshot, SimError> {
        let plan = self.plan();

        // Candidates: every entity flagged by any module and bound to a match.
        let mut candidates: BTreeSet<EntityId> = BTreeSet::new();
        for module in plan.iter() {
            if let Some(flag) = module.flag {
                candidates.extend(self.store.entities_with_components(&[flag, MATCH_ID]));
            }
        }

        // Keep entities whose MATCH_ID is bit-equal to the requested id. The
        // null sentinel never bit-matches a valid id, so unbound entities
        // fall out without a separate presence check.
        let match_bits = (match_id as f32).to_bits();
        let owner_bits = player_id.map(|p| (p as f32).to_bits());
        let mut survivors: Vec<EntityId> = Vec::new();
        for &entity in &candidates {
            let Ok(value) = self.store.get_component(entity, MATCH_ID) else {
                continue; // deleted between query and read
            };
            if value.to_bits() != match_bits {
                continue;
            }
            if let Some(owner_bits) = owner_bits {
                let Ok(owner) = self.store.get_component(entity, OWNER_ID) else {
                    continue;
                };
                if owner.to_bits() != owner_bits {
                    continue;
                }
            }
            survivors.push(entity);
        }

        let mut modules = Vec::new();
        for module in plan.iter() {
            if module.columns.is_empty() {
                continue;
            }
            let ids: Vec<ComponentId> = module.columns.iter().map(|(id, _)| *id).collect();
            let mut entity_column: Vec<f32> = Vec::new();
            let mut columns: Vec<Vec<f32>> = vec![Vec::new(); ids.len()];
            for &entity in &survivors {
                let Ok(row) = self.store.get_components(entity, &ids) else {
                    continue;
                };
                // Sparse across modules: a row is emitted only when the
                // entity carries at least one of this module's components.
                if row.iter().all(|v| is_null(*v)) {
                    continue;
                }
                entity_column.push(entity as f32);
                for (column, value) in columns.iter_mut().zip(row) {
                    column.push(value);
                }
            }
            if entity_column.is_empty() {
                continue;
            }
            let mut components = Vec::with_capacity(ids.len() + 1);
            components.push(ComponentData {
                name: ENTITY_ID_COLUMN.to_string(),
                values: entity_column,
            });
            for ((_, name), values) in module.columns.iter().zip(columns) {
                components.push(ComponentData {
                    name: name.clone(),
                    values,
                });
            }
            modules.push(ModuleData {
                module_name: module.module_name.clone(),
                module_version: module.module_version.clone(),
                components,
            });
        }

        Ok(Snapshot { modules })
    }
}
