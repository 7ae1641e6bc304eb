//! Error types shared across Warden crates.

use thiserror::Error;

use crate::ids::EntityId;

/// Entity bookkeeping errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntityError {
    /// The entity is not known to the level
    #[error("entity not found: {0}")]
    NotFound(EntityId),

    /// The entity was registered twice
    #[error("entity already registered: {0}")]
    AlreadyRegistered(EntityId),

    /// The null id was used where a live entity is required
    #[error("null entity id")]
    Null,
}

/// Result type alias for entity operations.
pub type EntityResult<T> = Result<T, EntityError>;
