//! # beacon-shared
//!
//! Types shared by the entity cache crates: typed identifiers, the entity
//! models mirrored from the backend, the update/request/response protocol,
//! and the clock abstraction used for presence label timing.

pub mod constants;
pub mod error;
pub mod models;
pub mod protocol;
pub mod time;
pub mod types;

pub use error::{BackendError, ProtocolError};
pub use types::*;
