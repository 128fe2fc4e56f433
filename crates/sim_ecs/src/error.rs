//! Platform-wide error taxonomy.

/// The error kinds that cross subsystem boundaries.
///
/// Every fallible operation in the platform resolves to one of these seven
/// variants; transports and callers dispatch on the variant, the message is
/// for logs and humans.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A named entity, module, match, command, or session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request itself is malformed (bad config value, null input, bad path).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The operation is not legal in the current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A fixed-size resource (entity slots, component columns) is exhausted.
    #[error("capacity exceeded: {0}")]
    Capacity(String),

    /// A permission check against a capability token failed.
    #[error("access forbidden: {0}")]
    AccessForbidden(String),

    /// The operation would violate a uniqueness invariant.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A capability token failed signature or expiry verification.
    #[error("invalid token: {0}")]
    InvalidToken(String),
}
