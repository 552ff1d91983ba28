//! Error types for the interaction core.
//!
//! Gameplay operations (enter/exit, unlock/fix, strikes against a missing
//! target) never fail: they degrade to "no state change". Errors are
//! reserved for host-facing calls that name something that does not exist,
//! configuration that cannot be used, and wire/snapshot codec failures.

use thiserror::Error;

use crate::components::EntityId;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the interaction core.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// An identity was registered twice.
    #[error("Entity {0} is already registered")]
    DuplicateEntity(EntityId),

    /// No observer is attached under this id.
    #[error("Observer not attached: {0}")]
    ObserverNotFound(u64),

    /// An observer id was attached twice.
    #[error("Observer {0} is already attached")]
    DuplicateObserver(u64),

    /// Configuration values that cannot drive a simulation.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration text that failed to parse.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Snapshot or wire message encoding failure.
    #[error("Codec error: {0}")]
    Codec(String),
}
