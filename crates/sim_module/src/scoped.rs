//! The permission decorator: a module's view of the shared ECS.
//!
//! Every operation verifies the token signature, then authorises the touched
//! component(s) against the token's grants. Check order: superuser, core
//! component, ownership, then the declared level.

use std::sync::Arc;

use sim_ecs::{ComponentId, EntityId, MatchId, PermissionLevel, SharedStore, SimError};
use sim_token::{CapabilityToken, TokenService};

/// Requested access mode, for grant checks and denial messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Access::Read => "read",
            Access::Write => "write",
        })
    }
}

/// A capability-scoped view of the shared ECS, held by one module.
#[derive(Clone)]
pub struct ScopedStore {
    shared: SharedStore,
    token: Arc<CapabilityToken>,
    service: Arc<TokenService>,
}

impl std::fmt::Debug for ScopedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStore")
            .field("module", &self.token.module_name)
            .field("superuser", &self.token.superuser)
            .finish_non_exhaustive()
    }
}

impl ScopedStore {
    /// Build a scoped view carrying a module's token.
    #[must_use]
    pub fn new(shared: SharedStore, token: Arc<CapabilityToken>, service: Arc<TokenService>) -> Self {
        Self {
            shared,
            token,
            service,
        }
    }

    /// The token this view authorises against.
    #[must_use]
    pub fn token(&self) -> &CapabilityToken {
        &self.token
    }

    /// Signature/expiry check alone, for operations that touch no gated
    /// component (entity lifecycle over core columns).
    fn verify_token(&self) -> Result<(), SimError> {
        self.service.verify(&self.token)
    }

    fn authorize(&self, component: ComponentId, access: Access) -> Result<(), SimError> {
        self.verify_token()?;
        if self.token.superuser || component.is_core() {
            return Ok(());
        }
        let module = &self.token.module_name;
        match self.token.grant(component) {
            Some(grant) if grant.owner_module == *module => Ok(()),
            Some(grant) => {
                let allowed = match access {
                    Access::Read => {
                        matches!(grant.level, PermissionLevel::Read | PermissionLevel::Write)
                    }
                    Access::Write => grant.level == PermissionLevel::Write,
                };
                if allowed {
                    Ok(())
                } else {
                    Err(SimError::AccessForbidden(format!(
                        "module '{module}' denied {access} on {component} (level {})",
                        grant.level
                    )))
                }
            }
            None => Err(SimError::AccessForbidden(format!(
                "module '{module}' holds no grant for {component}"
            ))),
        }
    }

    fn authorize_all(&self, components: &[ComponentId], access: Access) -> Result<(), SimError> {
        for &component in components {
            self.authorize(component, access)?;
        }
        Ok(())
    }

    // -- Entity lifecycle (core columns only) --

    /// See [`SharedStore::create_entity`].
    pub fn create_entity(&self, entity: EntityId) -> Result<(), SimError> {
        self.verify_token()?;
        self.shared.create_entity(entity)
    }

    /// See [`SharedStore::create_entity_for_match`].
    pub fn create_entity_for_match(&self, match_id: MatchId) -> Result<EntityId, SimError> {
        self.verify_token()?;
        self.shared.create_entity_for_match(match_id)
    }

    /// See [`SharedStore::delete_entity`].
    pub fn delete_entity(&self, entity: EntityId) -> Result<(), SimError> {
        self.verify_token()?;
        self.shared.delete_entity(entity)
    }

    // -- Component access (gated) --

    /// See [`SharedStore::attach_component`].
    pub fn attach_component(
        &self,
        entity: EntityId,
        component: ComponentId,
        value: f32,
    ) -> Result<(), SimError> {
        self.authorize(component, Access::Write)?;
        self.shared.attach_component(entity, component, value)
    }

    /// See [`SharedStore::attach_components`].
    pub fn attach_components(
        &self,
        entity: EntityId,
        values: &[(ComponentId, f32)],
    ) -> Result<(), SimError> {
        for &(component, _) in values {
            self.authorize(component, Access::Write)?;
        }
        self.shared.attach_components(entity, values)
    }

    /// See [`SharedStore::remove_component`].
    pub fn remove_component(&self, entity: EntityId, component: ComponentId) -> Result<(), SimError> {
        self.authorize(component, Access::Write)?;
        self.shared.remove_component(entity, component)
    }

    /// See [`SharedStore::get_component`].
    pub fn get_component(&self, entity: EntityId, component: ComponentId) -> Result<f32, SimError> {
        self.authorize(component, Access::Read)?;
        self.shared.get_component(entity, component)
    }

    /// See [`SharedStore::get_components`].
    pub fn get_components(
        &self,
        entity: EntityId,
        components: &[ComponentId],
    ) -> Result<Vec<f32>, SimError> {
        self.authorize_all(components, Access::Read)?;
        self.shared.get_components(entity, components)
    }

    /// See [`SharedStore::has_component`].
    pub fn has_component(&self, entity: EntityId, component: ComponentId) -> Result<bool, SimError> {
        self.authorize(component, Access::Read)?;
        Ok(self.shared.has_component(entity, component))
    }

    /// See [`SharedStore::entities_with_components`].
    pub fn entities_with_components(
        &self,
        components: &[ComponentId],
    ) -> Result<Vec<EntityId>, SimError> {
        self.authorize_all(components, Access::Read)?;
        Ok(self.shared.entities_with_components(components))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sim_ecs::{ENTITY_ID, MATCH_ID};
    use sim_token::ComponentGrant;

    use super::*;

    const SECRET: ComponentId = ComponentId(10);
    const SHARED_READ: ComponentId = ComponentId(11);
    const OPEN: ComponentId = ComponentId(12);

    fn grant(level: PermissionLevel, owner: &str) -> ComponentGrant {
        ComponentGrant {
            level,
            owner_module: owner.to_string(),
        }
    }

    /// Scoped views for module `a` (owner of everything) and module `b`.
    fn setup() -> (ScopedStore, ScopedStore, SharedStore) {
        let shared = SharedStore::new(16, 8);
        let service = Arc::new(TokenService::new());

        let mut perms = BTreeMap::new();
        perms.insert(SECRET, grant(PermissionLevel::Private, "a"));
        perms.insert(SHARED_READ, grant(PermissionLevel::Read, "a"));
        perms.insert(OPEN, grant(PermissionLevel::Write, "a"));

        let token_a = service.issue("a", perms.clone());
        let token_b = service.issue("b", perms);

        let a = ScopedStore::new(shared.clone(), Arc::new(token_a), service.clone());
        let b = ScopedStore::new(shared.clone(), Arc::new(token_b), service);
        (a, b, shared)
    }

    #[test]
    fn test_owner_full_access() {
        let (a, _, _) = setup();
        let e = a.create_entity_for_match(1).unwrap();
        a.attach_component(e, SECRET, 1.0).unwrap();
        assert_eq!(a.get_component(e, SECRET).unwrap(), 1.0);
        // Owner writes its own READ-level component.
        a.attach_component(e, SHARED_READ, 2.0).unwrap();
    }

    #[test]
    fn test_private_denied_to_sibling() {
        let (a, b, _) = setup();
        let e = a.create_entity_for_match(1).unwrap();
        a.attach_component(e, SECRET, 1.0).unwrap();
        assert!(matches!(
            b.get_component(e, SECRET),
            Err(SimError::AccessForbidden(_))
        ));
        assert!(matches!(
            b.attach_component(e, SECRET, 2.0),
            Err(SimError::AccessForbidden(_))
        ));
    }

    #[test]
    fn test_read_level_allows_sibling_read_only() {
        let (a, b, _) = setup();
        let e = a.create_entity_for_match(1).unwrap();
        a.attach_component(e, SHARED_READ, 3.0).unwrap();
        assert_eq!(b.get_component(e, SHARED_READ).unwrap(), 3.0);
        assert!(matches!(
            b.attach_component(e, SHARED_READ, 4.0),
            Err(SimError::AccessForbidden(_))
        ));
    }

    #[test]
    fn test_write_level_open_to_all() {
        let (a, b, _) = setup();
        let e = a.create_entity_for_match(1).unwrap();
        b.attach_component(e, OPEN, 5.0).unwrap();
        assert_eq!(a.get_component(e, OPEN).unwrap(), 5.0);
    }

    #[test]
    fn test_no_grant_denied() {
        let (a, _, _) = setup();
        let e = a.create_entity_for_match(1).unwrap();
        assert!(matches!(
            a.get_component(e, ComponentId(99)),
            Err(SimError::AccessForbidden(_))
        ));
    }

    #[test]
    fn test_core_components_ungated() {
        let (_, b, _) = setup();
        let e = b.create_entity_for_match(7).unwrap();
        assert_eq!(b.get_component(e, MATCH_ID).unwrap(), 7.0);
        assert_eq!(b.get_component(e, ENTITY_ID).unwrap(), e as f32);
    }

    #[test]
    fn test_superuser_bypasses_grants() {
        let shared = SharedStore::new(16, 8);
        let service = Arc::new(TokenService::new());
        let token = service.issue_superuser("entity_manager", BTreeMap::new());
        let store = ScopedStore::new(shared, Arc::new(token), service);
        let e = store.create_entity_for_match(1).unwrap();
        store.attach_component(e, SECRET, 1.0).unwrap();
        assert_eq!(store.get_component(e, SECRET).unwrap(), 1.0);
    }

    #[test]
    fn test_forged_token_rejected_everywhere() {
        let (a, _, shared) = setup();
        let mut forged = a.token().clone();
        forged.superuser = true;
        let service = Arc::new(TokenService::new());
        let store = ScopedStore::new(shared, Arc::new(forged), service);
        assert!(matches!(
            store.create_entity_for_match(1),
            Err(SimError::InvalidToken(_))
        ));
    }

    #[test]
    fn test_query_requires_read_on_all() {
        let (a, b, _) = setup();
        let e = a.create_entity_for_match(1).unwrap();
        a.attach_component(e, SECRET, 1.0).unwrap();
        a.attach_component(e, SHARED_READ, 1.0).unwrap();
        // b may query the readable column but not the private one.
        assert!(b.entities_with_components(&[SHARED_READ]).is_ok());
        assert!(matches!(
            b.entities_with_components(&[SHARED_READ, SECRET]),
            Err(SimError::AccessForbidden(_))
        ));
    }
}
