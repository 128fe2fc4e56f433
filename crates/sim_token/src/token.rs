//! Token and grant value types.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use sim_ecs::{ComponentId, PermissionLevel};

/// The permission a token holder has on one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentGrant {
    /// The level declared for the component.
    pub level: PermissionLevel,
    /// The module that owns the component.
    pub owner_module: String,
}

/// A signed credential granting a module component-level ECS access.
///
/// Component permissions are a `BTreeMap` so the claim bytes — and therefore
/// the signature — are stable regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityToken {
    /// Unique id of this token issuance.
    pub token_id: String,
    /// The module this token was issued to.
    pub module_name: String,
    /// Superuser tokens skip all permission checks; reserved for the
    /// built-in entity-management module.
    pub superuser: bool,
    /// Per-component grants.
    pub component_permissions: BTreeMap<ComponentId, ComponentGrant>,
    /// Issue instant, unix milliseconds.
    pub issued_at: i64,
    /// Expiry instant, unix milliseconds.
    pub expires_at: i64,
    /// HMAC-SHA256 over the claim bytes.
    pub signature: Vec<u8>,
}

impl CapabilityToken {
    /// The grant this token carries for a component, if any.
    #[must_use]
    pub fn grant(&self, component: ComponentId) -> Option<&ComponentGrant> {
        self.component_permissions.get(&component)
    }

    /// Printable form of the signature for logs.
    #[must_use]
    pub fn signature_b64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.signature)
    }
}
