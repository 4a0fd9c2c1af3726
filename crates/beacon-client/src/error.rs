use beacon_shared::error::ProtocolError;
use beacon_shared::types::EntityKind;
use beacon_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the cache hub.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Strict accessor miss or invalid id reported by the store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// An update that does not fit the cached state.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A subscription or request named a zero id.
    #[error("Invalid {kind} id")]
    InvalidId { kind: EntityKind },

    /// The backend queue is full or its receiver has gone away.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;
