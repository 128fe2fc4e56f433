//! The base columnar store.
//!
//! A 2D float matrix addressed as `cells[entity_slot][column_slot]`, stored
//! flat with a stride of `max_components`. Entity slots are densely packed by
//! an internal allocator and reclaimed through a free-list on delete; the
//! caller-facing entity id is resolved through a side map. Component ids map
//! to compact column slots on first write.
//!
//! The base store is not thread-safe; callers compose it with
//! [`SharedStore`](crate::SharedStore).

use std::collections::HashMap;

use crate::component::{ComponentId, ENTITY_ID, MATCH_ID};
use crate::error::SimError;
use crate::{is_null, EntityId, MatchId, NULL};

/// Dense columnar float store, sized at construction.
#[derive(Debug)]
pub struct ColumnStore {
    max_entities: usize,
    max_components: usize,
    /// Flat cell matrix, `max_entities * max_components`, row-major.
    cells: Vec<f32>,
    /// External entity id → dense row slot.
    entity_slots: HashMap<EntityId, usize>,
    /// Reclaimed row slots, reused before `next_slot` grows.
    free_slots: Vec<usize>,
    next_slot: usize,
    /// Next id handed out by [`create_entity_for_match`](Self::create_entity_for_match).
    next_entity_id: EntityId,
    /// Component id → compact column slot.
    column_slots: HashMap<ComponentId, usize>,
}

impl ColumnStore {
    /// Create a store with capacity for `max_entities` rows of
    /// `max_components` columns, every cell initialised to the null sentinel.
    #[must_use]
    pub fn new(max_entities: usize, max_components: usize) -> Self {
        let mut store = Self {
            max_entities,
            max_components,
            cells: vec![NULL; max_entities * max_components],
            entity_slots: HashMap::new(),
            free_slots: Vec::new(),
            next_slot: 0,
            next_entity_id: 1,
            column_slots: HashMap::new(),
        };
        // Core columns occupy the first slots so they exist even on an
        // otherwise empty store.
        for core in [ENTITY_ID, MATCH_ID, crate::OWNER_ID] {
            let slot = store.column_slots.len();
            store.column_slots.insert(core, slot);
        }
        store
    }

    /// Returns the configured entity capacity.
    #[must_use]
    pub fn max_entities(&self) -> usize {
        self.max_entities
    }

    /// Returns the configured column capacity.
    #[must_use]
    pub fn max_components(&self) -> usize {
        self.max_components
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entity_slots.len()
    }

    /// Returns the number of distinct component columns seen so far.
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.column_slots.len()
    }

    fn cell_index(&self, slot: usize, column: usize) -> usize {
        slot * self.max_components + column
    }

    fn slot_of(&self, entity: EntityId) -> Result<usize, SimError> {
        self.entity_slots
            .get(&entity)
            .copied()
            .ok_or_else(|| SimError::NotFound(format!("entity {entity}")))
    }

    /// Resolve (or allocate) the column slot for a component id.
    fn column_for_write(&mut self, component: ComponentId) -> Result<usize, SimError> {
        if let Some(&slot) = self.column_slots.get(&component) {
            return Ok(slot);
        }
        let slot = self.column_slots.len();
        if slot >= self.max_components {
            return Err(SimError::Capacity(format!(
                "component columns exhausted ({} max)",
                self.max_components
            )));
        }
        self.column_slots.insert(component, slot);
        Ok(slot)
    }

    fn allocate_slot(&mut self) -> Result<usize, SimError> {
        if let Some(slot) = self.free_slots.pop() {
            return Ok(slot);
        }
        if self.next_slot >= self.max_entities {
            return Err(SimError::Capacity(format!(
                "entity slots exhausted ({} max)",
                self.max_entities
            )));
        }
        let slot = self.next_slot;
        self.next_slot += 1;
        Ok(slot)
    }

    // -- Entity lifecycle --

    /// Create an entity with an explicit id.
    ///
    /// Sets the `ENTITY_ID` core component. Fails with `Capacity` when the
    /// store is full and `Conflict` when the id is already live.
    pub fn create_entity(&mut self, entity: EntityId) -> Result<(), SimError> {
        if self.entity_slots.contains_key(&entity) {
            return Err(SimError::Conflict(format!("entity {entity} already exists")));
        }
        let slot = self.allocate_slot()?;
        self.entity_slots.insert(entity, slot);
        if entity >= self.next_entity_id {
            self.next_entity_id = entity + 1;
        }
        let col = self.column_slots[&ENTITY_ID];
        let idx = self.cell_index(slot, col);
        self.cells[idx] = entity as f32;
        Ok(())
    }

    /// Allocate a fresh entity id, create the entity, and stamp the owning
    /// match. Returns the new id.
    pub fn create_entity_for_match(&mut self, match_id: MatchId) -> Result<EntityId, SimError> {
        let entity = self.next_entity_id;
        self.create_entity(entity)?;
        let slot = self.entity_slots[&entity];
        let col = self.column_slots[&MATCH_ID];
        let idx = self.cell_index(slot, col);
        self.cells[idx] = match_id as f32;
        Ok(entity)
    }

    /// Delete an entity, clearing every column and reclaiming its slot.
    pub fn delete_entity(&mut self, entity: EntityId) -> Result<(), SimError> {
        let slot = self
            .entity_slots
            .remove(&entity)
            .ok_or_else(|| SimError::NotFound(format!("entity {entity}")))?;
        let start = slot * self.max_components;
        for cell in &mut self.cells[start..start + self.max_components] {
            *cell = NULL;
        }
        self.free_slots.push(slot);
        Ok(())
    }

    /// Returns `true` if the entity is live.
    #[must_use]
    pub fn entity_exists(&self, entity: EntityId) -> bool {
        self.entity_slots.contains_key(&entity)
    }

    // -- Component operations --

    /// Write a component value.
    ///
    /// Writing the null sentinel removes the component. Ordinary NaN inputs
    /// are stored as-is.
    pub fn attach_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: f32,
    ) -> Result<(), SimError> {
        let slot = self.slot_of(entity)?;
        let col = self.column_for_write(component)?;
        let idx = self.cell_index(slot, col);
        self.cells[idx] = value;
        Ok(())
    }

    /// Write several components on one entity.
    pub fn attach_components(
        &mut self,
        entity: EntityId,
        values: &[(ComponentId, f32)],
    ) -> Result<(), SimError> {
        let slot = self.slot_of(entity)?;
        for &(component, value) in values {
            let col = self.column_for_write(component)?;
            let idx = self.cell_index(slot, col);
            self.cells[idx] = value;
        }
        Ok(())
    }

    /// Remove a component by writing the null sentinel.
    pub fn remove_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<(), SimError> {
        self.attach_component(entity, component, NULL)
    }

    /// Read a component value. Absent components read as the null sentinel.
    pub fn get_component(&self, entity: EntityId, component: ComponentId) -> Result<f32, SimError> {
        let slot = self.slot_of(entity)?;
        match self.column_slots.get(&component) {
            Some(&col) => Ok(self.cells[self.cell_index(slot, col)]),
            None => Ok(NULL),
        }
    }

    /// Batch read: one value per requested component, in request order.
    pub fn get_components(
        &self,
        entity: EntityId,
        components: &[ComponentId],
    ) -> Result<Vec<f32>, SimError> {
        let slot = self.slot_of(entity)?;
        Ok(components
            .iter()
            .map(|component| match self.column_slots.get(component) {
                Some(&col) => self.cells[self.cell_index(slot, col)],
                None => NULL,
            })
            .collect())
    }

    /// Returns `true` iff the entity exists and the component is non-null.
    #[must_use]
    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> bool {
        match self.get_component(entity, component) {
            Ok(v) => !is_null(v),
            Err(_) => false,
        }
    }

    /// Entity ids for which **all** given components are non-null.
    ///
    /// Result ordering is unspecified.
    #[must_use]
    pub fn entities_with_components(&self, components: &[ComponentId]) -> Vec<EntityId> {
        let cols: Option<Vec<usize>> = components
            .iter()
            .map(|c| self.column_slots.get(c).copied())
            .collect();
        let Some(cols) = cols else {
            // At least one component has never been written anywhere.
            return Vec::new();
        };
        self.entity_slots
            .iter()
            .filter(|(_, &slot)| {
                cols.iter()
                    .all(|&col| !is_null(self.cells[self.cell_index(slot, col)]))
            })
            .map(|(&entity, _)| entity)
            .collect()
    }

    /// Empty the store: every entity gone, every cell back to the sentinel.
    ///
    /// Column declarations survive a reset — components are declared at
    /// module load and never removed at runtime.
    pub fn reset(&mut self) {
        self.cells.fill(NULL);
        self.entity_slots.clear();
        self.free_slots.clear();
        self.next_slot = 0;
        self.next_entity_id = 1;
    }
}
