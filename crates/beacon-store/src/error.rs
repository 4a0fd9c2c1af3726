use beacon_shared::types::EntityKind;
use thiserror::Error;

/// Errors produced by the strict accessors of the store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The caller asserted the entity is cached, but it is not.
    #[error("{kind} {id} is not cached")]
    NotFound { kind: EntityKind, id: i64 },

    /// Zero or otherwise unassignable identifier.
    #[error("Invalid {kind} id")]
    InvalidId { kind: EntityKind },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
