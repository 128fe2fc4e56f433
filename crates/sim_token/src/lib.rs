//! Capability tokens for module access to the ECS.
//!
//! The registry issues one token per loaded module; every call the module
//! makes through its scoped store carries the token, and the permission
//! layer verifies the signature before honouring any claim. Tokens are plain
//! values — re-issued on change, never mutated in place.

mod service;
mod token;

pub use service::TokenService;
pub use token::{CapabilityToken, ComponentGrant};
