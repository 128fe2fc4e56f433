//! Dirty-tracking decorator.
//!
//! Records, per match, which entities were added, modified, or removed since
//! the last [`consume_dirty_info`](DirtyTrackingStore::consume_dirty_info)
//! call. An entity created and deleted within one interval is transient and
//! appears in neither set.

use std::collections::{HashMap, HashSet};

use crate::component::{ComponentId, MATCH_ID};
use crate::error::SimError;
use crate::store::ColumnStore;
use crate::{is_null, EntityId, MatchId};

/// The per-match change sets accumulated over one tracking interval.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirtyInfo {
    /// Entities created this interval.
    pub added: HashSet<EntityId>,
    /// Pre-existing entities with at least one component write this interval.
    pub modified: HashSet<EntityId>,
    /// Pre-existing entities deleted this interval.
    pub removed: HashSet<EntityId>,
}

impl DirtyInfo {
    /// Returns `true` when no changes were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }
}

/// Wraps a [`ColumnStore`] and tracks per-match change sets.
#[derive(Debug)]
pub struct DirtyTrackingStore {
    inner: ColumnStore,
    dirty: HashMap<MatchId, DirtyInfo>,
}

impl DirtyTrackingStore {
    /// Wrap a base store.
    #[must_use]
    pub fn new(inner: ColumnStore) -> Self {
        Self {
            inner,
            dirty: HashMap::new(),
        }
    }

    /// The owning match of an entity, when it has one.
    fn match_of(&self, entity: EntityId) -> Option<MatchId> {
        let v = self.inner.get_component(entity, MATCH_ID).ok()?;
        if is_null(v) {
            None
        } else {
            Some(v as MatchId)
        }
    }

    fn mark_touched(&mut self, entity: EntityId) {
        if let Some(match_id) = self.match_of(entity) {
            let info = self.dirty.entry(match_id).or_default();
            // Entities still in `added` stay there; the add subsumes the edit.
            if !info.added.contains(&entity) {
                info.modified.insert(entity);
            }
        }
    }

    // -- Delegated operations --

    /// See [`ColumnStore::create_entity`].
    pub fn create_entity(&mut self, entity: EntityId) -> Result<(), SimError> {
        self.inner.create_entity(entity)
    }

    /// See [`ColumnStore::create_entity_for_match`]. Marks the entity `added`.
    pub fn create_entity_for_match(&mut self, match_id: MatchId) -> Result<EntityId, SimError> {
        let entity = self.inner.create_entity_for_match(match_id)?;
        self.dirty.entry(match_id).or_default().added.insert(entity);
        Ok(entity)
    }

    /// See [`ColumnStore::delete_entity`].
    ///
    /// An entity added within the current interval becomes transient; a
    /// pre-existing entity is recorded as `removed`.
    pub fn delete_entity(&mut self, entity: EntityId) -> Result<(), SimError> {
        let match_id = self.match_of(entity);
        self.inner.delete_entity(entity)?;
        if let Some(match_id) = match_id {
            let info = self.dirty.entry(match_id).or_default();
            if info.added.remove(&entity) {
                info.modified.remove(&entity);
            } else {
                info.modified.remove(&entity);
                info.removed.insert(entity);
            }
        }
        Ok(())
    }

    /// See [`ColumnStore::attach_component`]. Marks `modified` unless the
    /// entity is still in the interval's `added` set.
    pub fn attach_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
        value: f32,
    ) -> Result<(), SimError> {
        self.inner.attach_component(entity, component, value)?;
        self.mark_touched(entity);
        Ok(())
    }

    /// See [`ColumnStore::attach_components`].
    pub fn attach_components(
        &mut self,
        entity: EntityId,
        values: &[(ComponentId, f32)],
    ) -> Result<(), SimError> {
        self.inner.attach_components(entity, values)?;
        self.mark_touched(entity);
        Ok(())
    }

    /// See [`ColumnStore::remove_component`].
    pub fn remove_component(
        &mut self,
        entity: EntityId,
        component: ComponentId,
    ) -> Result<(), SimError> {
        // Capture the match before the write: removing MATCH_ID itself would
        // orphan the entity from its change set.
        let match_id = self.match_of(entity);
        self.inner.remove_component(entity, component)?;
        if let Some(match_id) = match_id {
            let info = self.dirty.entry(match_id).or_default();
            if !info.added.contains(&entity) {
                info.modified.insert(entity);
            }
        }
        Ok(())
    }

    /// Return and clear the change sets for a match.
    #[must_use]
    pub fn consume_dirty_info(&mut self, match_id: MatchId) -> DirtyInfo {
        self.dirty.remove(&match_id).unwrap_or_default()
    }

    /// Return the change sets for a match without clearing them.
    #[must_use]
    pub fn peek_dirty_info(&self, match_id: MatchId) -> DirtyInfo {
        self.dirty.get(&match_id).cloned().unwrap_or_default()
    }

    /// See [`ColumnStore::reset`]. Also drops all change tracking.
    pub fn reset(&mut self) {
        self.inner.reset();
        self.dirty.clear();
    }

    // -- Read-only passthrough --

    /// See [`ColumnStore::get_component`].
    pub fn get_component(&self, entity: EntityId, component: ComponentId) -> Result<f32, SimError> {
        self.inner.get_component(entity, component)
    }

    /// See [`ColumnStore::get_components`].
    pub fn get_components(
        &self,
        entity: EntityId,
        components: &[ComponentId],
    ) -> Result<Vec<f32>, SimError> {
        self.inner.get_components(entity, components)
    }

    /// See [`ColumnStore::has_component`].
    #[must_use]
    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> bool {
        self.inner.has_component(entity, component)
    }

    /// See [`ColumnStore::entity_exists`].
    #[must_use]
    pub fn entity_exists(&self, entity: EntityId) -> bool {
        self.inner.entity_exists(entity)
    }

    /// See [`ColumnStore::entities_with_components`].
    #[must_use]
    pub fn entities_with_components(&self, components: &[ComponentId]) -> Vec<EntityId> {
        self.inner.entities_with_components(components)
    }

    /// See [`ColumnStore::entity_count`].
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.inner.entity_count()
    }

    /// See [`ColumnStore::component_count`].
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.inner.component_count()
    }

    /// See [`ColumnStore::max_entities`].
    #[must_use]
    pub fn max_entities(&self) -> usize {
        self.inner.max_entities()
    }

    /// See [`ColumnStore::max_components`].
    #[must_use]
    pub fn max_components(&self) -> usize {
        self.inner.max_components()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DirtyTrackingStore {
        DirtyTrackingStore::new(ColumnStore::new(16, 8))
    }

    #[test]
    fn test_create_marks_added() {
        let mut s = store();
        let e = s.create_entity_for_match(100).unwrap();
        let info = s.peek_dirty_info(100);
        assert!(info.added.contains(&e));
        assert!(info.modified.is_empty());
    }

    #[test]
    fn test_edit_on_added_entity_stays_added() {
        let mut s = store();
        let e = s.create_entity_for_match(100).unwrap();
        s.attach_component(e, ComponentId(10), 1.0).unwrap();
        let info = s.peek_dirty_info(100);
        assert!(info.added.contains(&e));
        assert!(!info.modified.contains(&e));
    }

    #[test]
    fn test_edit_after_consume_marks_modified() {
        let mut s = store();
        let e = s.create_entity_for_match(100).unwrap();
        let _ = s.consume_dirty_info(100);
        s.attach_component(e, ComponentId(10), 1.0).unwrap();
        let info = s.peek_dirty_info(100);
        assert!(info.modified.contains(&e));
        assert!(!info.added.contains(&e));
    }

    #[test]
    fn test_transient_entity_disappears() {
        let mut s = store();
        let e = s.create_entity_for_match(100).unwrap();
        s.delete_entity(e).unwrap();
        let info = s.peek_dirty_info(100);
        assert!(info.is_empty());
    }

    #[test]
    fn test_delete_of_old_entity_marks_removed() {
        let mut s = store();
        let e = s.create_entity_for_match(100).unwrap();
        let _ = s.consume_dirty_info(100);
        s.delete_entity(e).unwrap();
        let info = s.peek_dirty_info(100);
        assert!(info.removed.contains(&e));
        assert!(!info.modified.contains(&e));
    }

    #[test]
    fn test_consume_clears() {
        let mut s = store();
        let e = s.create_entity_for_match(100).unwrap();
        let info = s.consume_dirty_info(100);
        assert!(info.added.contains(&e));
        assert!(s.peek_dirty_info(100).is_empty());
    }

    #[test]
    fn test_matches_tracked_independently() {
        let mut s = store();
        let e1 = s.create_entity_for_match(100).unwrap();
        let e2 = s.create_entity_for_match(200).unwrap();
        assert!(s.peek_dirty_info(100).added.contains(&e1));
        assert!(!s.peek_dirty_info(100).added.contains(&e2));
        assert!(s.peek_dirty_info(200).added.contains(&e2));
    }

    #[test]
    fn test_matchless_entity_untracked() {
        let mut s = store();
        s.create_entity(7).unwrap();
        s.attach_component(7, ComponentId(10), 1.0).unwrap();
        assert!(s.peek_dirty_info(0).is_empty());
    }
}
