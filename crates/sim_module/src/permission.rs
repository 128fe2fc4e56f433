//! Registry of permissioned component declarations.

use std::collections::HashMap;

use tracing::warn;

use sim_ecs::{ComponentDef, ComponentId, PermissionLevel};

/// One registered permissioned component.
#[derive(Debug, Clone)]
pub struct RegisteredComponent {
    pub def: ComponentDef,
    pub owner_module: String,
}

/// Tracks which module owns each permissioned component and at what level.
#[derive(Debug, Default)]
pub struct PermissionRegistry {
    components: HashMap<ComponentId, RegisteredComponent>,
}

impl PermissionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a permissioned component, tagged with its owning module.
    ///
    /// A re-registration under a different owner replaces the entry with a
    /// warning (mirrors duplicate-module overwrite behaviour).
    pub fn register(&mut self, owner_module: &str, def: &ComponentDef) {
        if let Some(existing) = self.components.get(&def.id) {
            if existing.owner_module != owner_module {
                warn!(
                    component = def.id.0,
                    old_owner = existing.owner_module,
                    new_owner = owner_module,
                    "permissioned component re-registered under a new owner"
                );
            }
        }
        self.components.insert(
            def.id,
            RegisteredComponent {
                def: def.clone(),
                owner_module: owner_module.to_string(),
            },
        );
    }

    /// The owning module of a component, if registered.
    #[must_use]
    pub fn owner_of(&self, component: ComponentId) -> Option<&str> {
        self.components
            .get(&component)
            .map(|c| c.owner_module.as_str())
    }

    /// The declared level of a component, if registered.
    #[must_use]
    pub fn level_of(&self, component: ComponentId) -> Option<PermissionLevel> {
        self.components
            .get(&component)
            .and_then(|c| c.def.permission_level())
    }

    /// Number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Drop every registration.
    pub fn clear(&mut self) {
        self.components.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = PermissionRegistry::new();
        let def = ComponentDef::permissioned(ComponentId(10), "gold", PermissionLevel::Read);
        registry.register("economy", &def);

        assert_eq!(registry.owner_of(ComponentId(10)), Some("economy"));
        assert_eq!(registry.level_of(ComponentId(10)), Some(PermissionLevel::Read));
        assert_eq!(registry.owner_of(ComponentId(11)), None);
    }

    #[test]
    fn test_reregistration_replaces() {
        let mut registry = PermissionRegistry::new();
        let def = ComponentDef::permissioned(ComponentId(10), "gold", PermissionLevel::Read);
        registry.register("economy", &def);
        let def2 = ComponentDef::permissioned(ComponentId(10), "gold", PermissionLevel::Write);
        registry.register("banking", &def2);

        assert_eq!(registry.owner_of(ComponentId(10)), Some("banking"));
        assert_eq!(registry.level_of(ComponentId(10)), Some(PermissionLevel::Write));
        assert_eq!(registry.len(), 1);
    }
}
