//! # beacon-store
//!
//! In-memory mirror of the backend's entities.
//!
//! The [`EntityStore`] keeps the latest known value of every user, group,
//! supergroup, secret chat and call behind one lock per domain. Writes never
//! mutate a value another thread may be holding: each `apply_*` operation
//! swaps in a fresh `Arc` and returns what changed so the caller can decide
//! which observers to notify once the lock is released.

pub mod calls;
pub mod groups;
pub mod secret_chats;
pub mod store;
pub mod supergroups;
pub mod users;

mod error;

pub use calls::{CallChange, StaleCalls};
pub use error::{Result, StoreError};
pub use store::{EntityChange, EntityStore, Replaced, UpdateMode};
pub use users::{MyUserSwitch, StatusChange, UserChange};
