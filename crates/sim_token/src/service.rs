//! Token issuance and verification.

use std::collections::BTreeMap;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use uuid::Uuid;

use sim_ecs::{ComponentId, SimError};

use crate::token::{CapabilityToken, ComponentGrant};

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime. Tokens are re-issued on every registry change,
/// so the expiry only bounds how long a stale token stays usable.
const DEFAULT_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// The claim fields covered by the signature, serialised with rmp-serde.
#[derive(Serialize)]
struct Claims<'a> {
    token_id: &'a str,
    module_name: &'a str,
    superuser: bool,
    component_permissions: &'a BTreeMap<ComponentId, ComponentGrant>,
    issued_at: i64,
    expires_at: i64,
}

/// Issues and verifies capability tokens for one container.
///
/// The signing key is generated per container and never leaves the service;
/// a token from one container can never verify in another.
pub struct TokenService {
    key: [u8; 32],
    ttl_ms: i64,
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("TokenService")
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

impl TokenService {
    /// Create a service with a fresh random signing key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            key: rand::random(),
            ttl_ms: DEFAULT_TTL_MS,
        }
    }

    /// Create a service with an explicit key and lifetime.
    #[must_use]
    pub fn with_key(key: [u8; 32], ttl_ms: i64) -> Self {
        Self { key, ttl_ms }
    }

    /// Issue a regular token carrying only the given grants.
    #[must_use]
    pub fn issue(
        &self,
        module_name: &str,
        permissions: BTreeMap<ComponentId, ComponentGrant>,
    ) -> CapabilityToken {
        self.mint(module_name, false, permissions)
    }

    /// Issue a superuser token; every permission check passes.
    #[must_use]
    pub fn issue_superuser(
        &self,
        module_name: &str,
        permissions: BTreeMap<ComponentId, ComponentGrant>,
    ) -> CapabilityToken {
        self.mint(module_name, true, permissions)
    }

    /// Re-issue a token with new grants, preserving the superuser bit.
    ///
    /// The old token must still verify — a forged or expired token cannot be
    /// laundered through refresh.
    pub fn refresh(
        &self,
        old: &CapabilityToken,
        permissions: BTreeMap<ComponentId, ComponentGrant>,
    ) -> Result<CapabilityToken, SimError> {
        self.verify(old)?;
        Ok(self.mint(&old.module_name, old.superuser, permissions))
    }

    /// Verify signature and expiry. Called on every scoped-store operation.
    pub fn verify(&self, token: &CapabilityToken) -> Result<(), SimError> {
        let claims = Claims {
            token_id: &token.token_id,
            module_name: &token.module_name,
            superuser: token.superuser,
            component_permissions: &token.component_permissions,
            issued_at: token.issued_at,
            expires_at: token.expires_at,
        };
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(&claim_bytes(&claims));
        // verify_slice is constant-time.
        mac.verify_slice(&token.signature)
            .map_err(|_| SimError::InvalidToken(format!("bad signature for {}", token.module_name)))?;
        if Utc::now().timestamp_millis() > token.expires_at {
            return Err(SimError::InvalidToken(format!(
                "token for {} expired",
                token.module_name
            )));
        }
        Ok(())
    }

    fn mint(
        &self,
        module_name: &str,
        superuser: bool,
        permissions: BTreeMap<ComponentId, ComponentGrant>,
    ) -> CapabilityToken {
        let token_id = Uuid::new_v4().to_string();
        let issued_at = Utc::now().timestamp_millis();
        let expires_at = issued_at.saturating_add(self.ttl_ms);
        let signature = self.sign(&Claims {
            token_id: &token_id,
            module_name,
            superuser,
            component_permissions: &permissions,
            issued_at,
            expires_at,
        });
        CapabilityToken {
            token_id,
            module_name: module_name.to_string(),
            superuser,
            component_permissions: permissions,
            issued_at,
            expires_at,
            signature,
        }
    }

    fn sign(&self, claims: &Claims<'_>) -> Vec<u8> {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(&claim_bytes(claims));
        mac.finalize().into_bytes().to_vec()
    }
}

impl Default for TokenService {
    fn default() -> Self {
        Self::new()
    }
}

/// Canonical claim encoding. rmp-serde over a struct with a `BTreeMap` is
/// byte-stable for equal claims.
fn claim_bytes(claims: &Claims<'_>) -> Vec<u8> {
    rmp_serde::to_vec(claims).unwrap_or_default()
}
