//! Closed error taxonomy of the auth service.
//!
//! Every failure crossing the service boundary is one of these kinds;
//! sources ride inside the variant and are never exposed to clients.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    /// Token invalid, missing, or of the wrong type.
    #[error("failed to authenticate the request")]
    Authentication,

    /// Token parsed but its expiry has elapsed.
    #[error("use of expired key")]
    KeyExpired,

    /// Principal known but not permitted.
    #[error("permission denied")]
    Authorization,

    /// Domain-scoped check failed after the status fallback.
    #[error("permission denied on domain")]
    DomainAuthorization,

    /// Entity missing from a store.
    #[error("entity not found")]
    NotFound,

    /// Unique constraint violated.
    #[error("entity already exists")]
    Conflict,

    /// Tuple fails validation.
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    /// Domain status value not permitted.
    #[error("invalid domain status")]
    InvalidStatus,

    /// Shape-level rejection.
    #[error("malformed entity: {0}")]
    Malformed(String),

    #[error("failed to create entity: {0}")]
    CreateEntity(anyhow::Error),

    #[error("failed to update entity: {0}")]
    UpdateEntity(anyhow::Error),

    #[error("failed to view entity: {0}")]
    ViewEntity(anyhow::Error),

    #[error("failed to remove entity: {0}")]
    RemoveEntity(anyhow::Error),

    /// A compensation step failed; partial writes may remain.
    #[error("failed to roll back partial writes: {0}")]
    Rollback(anyhow::Error),
}

impl AuthError {
    /// Wrap a failed compensation together with the error that triggered it.
    pub fn rollback(rollback_err: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        AuthError::Rollback(anyhow::anyhow!("{rollback_err} (while recovering from: {cause})"))
    }
}
