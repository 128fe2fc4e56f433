//! Component identity and declaration metadata.

use serde::{Deserialize, Serialize};

/// A unique identifier for a component column.
///
/// Component ids are declared by modules and are stable for the lifetime of
/// the container; the store maps them to compact column slots internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl std::fmt::Display for ComponentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "component {}", self.0)
    }
}

/// Stores the entity id itself; present on every live entity.
pub const ENTITY_ID: ComponentId = ComponentId(1);

/// The match an entity belongs to.
pub const MATCH_ID: ComponentId = ComponentId(2);

/// The player that owns an entity, when any.
pub const OWNER_ID: ComponentId = ComponentId(3);

impl ComponentId {
    /// Returns `true` for the three platform-defined core components.
    #[must_use]
    pub fn is_core(self) -> bool {
        matches!(self, ENTITY_ID | MATCH_ID | OWNER_ID)
    }
}

/// Access level a module declares on a permissioned component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PermissionLevel {
    /// Only the owning module may read or write.
    Private,
    /// Any module may read; only the owner may write.
    Read,
    /// Any module may read or write.
    Write,
}

impl std::fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PermissionLevel::Private => "PRIVATE",
            PermissionLevel::Read => "READ",
            PermissionLevel::Write => "WRITE",
        };
        f.write_str(s)
    }
}

/// The declared flavour of a component column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComponentKind {
    /// Presence/absence marker; the stored value is arbitrary when present.
    Flag,
    /// Ordinary numeric column, open to all modules.
    Value,
    /// Numeric column gated by the declared [`PermissionLevel`].
    Permissioned(PermissionLevel),
    /// Platform-defined, ungated.
    Core,
}

/// A component declaration contributed by a module (or the platform).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDef {
    /// The column identity.
    pub id: ComponentId,
    /// Human-readable name, used in snapshots and logs.
    pub name: String,
    /// Declared flavour.
    pub kind: ComponentKind,
}

impl ComponentDef {
    /// Declare a flag component.
    #[must_use]
    pub fn flag(id: ComponentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ComponentKind::Flag,
        }
    }

    /// Declare an open value component.
    #[must_use]
    pub fn value(id: ComponentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ComponentKind::Value,
        }
    }

    /// Declare a permission-gated component.
    #[must_use]
    pub fn permissioned(id: ComponentId, name: impl Into<String>, level: PermissionLevel) -> Self {
        Self {
            id,
            name: name.into(),
            kind: ComponentKind::Permissioned(level),
        }
    }

    /// Returns the declared permission level, if this component is gated.
    #[must_use]
    pub fn permission_level(&self) -> Option<PermissionLevel> {
        match self.kind {
            ComponentKind::Permissioned(level) => Some(level),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_component_ids() {
        assert!(ENTITY_ID.is_core());
        assert!(MATCH_ID.is_core());
        assert!(OWNER_ID.is_core());
        assert!(!ComponentId(100).is_core());
    }

    #[test]
    fn test_permission_level_accessor() {
        let open = ComponentDef::value(ComponentId(10), "health");
        assert_eq!(open.permission_level(), None);

        let gated = ComponentDef::permissioned(ComponentId(11), "gold", PermissionLevel::Read);
        assert_eq!(gated.permission_level(), Some(PermissionLevel::Read));
    }

    #[test]
    fn test_permission_level_display() {
        assert_eq!(PermissionLevel::Private.to_string(), "PRIVATE");
        assert_eq!(PermissionLevel::Read.to_string(), "READ");
        assert_eq!(PermissionLevel::Write.to_string(), "WRITE");
    }
}
