//! The locking decorator.
//!
//! [`SharedStore`] is a clonable handle over the dirty-tracking store behind
//! a single mutex. Every operation takes the lock for its own duration, so
//! snapshot readers interleave with tick-worker writes at operation
//! granularity.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::component::ComponentId;
use crate::dirty::{DirtyInfo, DirtyTrackingStore};
use crate::error::SimError;
use crate::store::ColumnStore;
use crate::{EntityId, MatchId};

/// Thread-safe, clonable handle to a container's ECS store.
#[derive(Debug, Clone)]
pub struct SharedStore {
    inner: Arc<Mutex<DirtyTrackingStore>>,
}

impl SharedStore {
    /// Build the full store stack for a container:
    /// column store → dirty tracking → lock.
    #[must_use]
    pub fn new(max_entities: usize, max_components: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(DirtyTrackingStore::new(ColumnStore::new(
                max_entities,
                max_components,
            )))),
        }
    }

    /// See [`ColumnStore::create_entity`].
    pub fn create_entity(&self, entity: EntityId) -> Result<(), SimError> {
        self.inner.lock().create_entity(entity)
    }

    /// See [`ColumnStore::create_entity_for_match`].
    pub fn create_entity_for_match(&self, match_id: MatchId) -> Result<EntityId, SimError> {
        self.inner.lock().create_entity_for_match(match_id)
    }

    /// See [`ColumnStore::delete_entity`].
    pub fn delete_entity(&self, entity: EntityId) -> Result<(), SimError> {
        self.inner.lock().delete_entity(entity)
    }

    /// See [`ColumnStore::entity_exists`].
    #[must_use]
    pub fn entity_exists(&self, entity: EntityId) -> bool {
        self.inner.lock().entity_exists(entity)
    }

    /// See [`ColumnStore::attach_component`].
    pub fn attach_component(
        &self,
        entity: EntityId,
        component: ComponentId,
        value: f32,
    ) -> Result<(), SimError> {
        self.inner.lock().attach_component(entity, component, value)
    }

    /// See [`ColumnStore::attach_components`].
    pub fn attach_components(
        &self,
        entity: EntityId,
        values: &[(ComponentId, f32)],
    ) -> Result<(), SimError> {
        self.inner.lock().attach_components(entity, values)
    }

    /// See [`ColumnStore::remove_component`].
    pub fn remove_component(&self, entity: EntityId, component: ComponentId) -> Result<(), SimError> {
        self.inner.lock().remove_component(entity, component)
    }

    /// See [`ColumnStore::get_component`].
    pub fn get_component(&self, entity: EntityId, component: ComponentId) -> Result<f32, SimError> {
        self.inner.lock().get_component(entity, component)
    }

    /// See [`ColumnStore::get_components`].
    pub fn get_components(
        &self,
        entity: EntityId,
        components: &[ComponentId],
    ) -> Result<Vec<f32>, SimError> {
        self.inner.lock().get_components(entity, components)
    }

    /// See [`ColumnStore::has_component`].
    #[must_use]
    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> bool {
        self.inner.lock().has_component(entity, component)
    }

    /// See [`ColumnStore::entities_with_components`].
    #[must_use]
    pub fn entities_with_components(&self, components: &[ComponentId]) -> Vec<EntityId> {
        self.inner.lock().entities_with_components(components)
    }

    /// See [`DirtyTrackingStore::consume_dirty_info`].
    #[must_use]
    pub fn consume_dirty_info(&self, match_id: MatchId) -> DirtyInfo {
        self.inner.lock().consume_dirty_info(match_id)
    }

    /// See [`DirtyTrackingStore::peek_dirty_info`].
    #[must_use]
    pub fn peek_dirty_info(&self, match_id: MatchId) -> DirtyInfo {
        self.inner.lock().peek_dirty_info(match_id)
    }

    /// See [`ColumnStore::reset`].
    pub fn reset(&self) {
        self.inner.lock().reset();
    }

    /// See [`ColumnStore::entity_count`].
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.inner.lock().entity_count()
    }

    /// See [`ColumnStore::component_count`].
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.inner.lock().component_count()
    }

    /// See [`ColumnStore::max_entities`].
    #[must_use]
    pub fn max_entities(&self) -> usize {
        self.inner.lock().max_entities()
    }

    /// See [`ColumnStore::max_components`].
    #[must_use]
    pub fn max_components(&self) -> usize {
        self.inner.lock().max_components()
    }
}
