//! Error types for the behavior core.
//!
//! Per-tick behavior never fails: missing collaborators, missing states and
//! inconsistent scene data are logged and recovered where they happen. These
//! errors cover the fallible setup and host-facing operations of a level.

use thiserror::Error;
use warden_common::{EntityError, EntityId};

use crate::fsm::StateId;

/// Behavior core error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AiError {
    /// Entity bookkeeping failed
    #[error(transparent)]
    Entity(#[from] EntityError),

    /// A required collaborator was not supplied
    #[error("entity {entity} is missing {dependency}")]
    MissingDependency {
        /// Entity that lacks the collaborator
        entity: EntityId,
        /// Name of the missing collaborator
        dependency: &'static str,
    },

    /// A state lookup by identifier found nothing
    #[error("entity {entity} has no {state:?} state")]
    MissingState {
        /// Entity whose state set was searched
        entity: EntityId,
        /// State that was requested
        state: StateId,
    },

    /// The level has no player registered
    #[error("no player in level")]
    NoPlayer,
}

/// Result type for behavior core operations.
pub type AiResult<T> = Result<T, AiError>;
