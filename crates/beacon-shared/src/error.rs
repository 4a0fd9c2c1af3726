use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error-shaped response from the backend. Treated as "no cache change".
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("Backend error {code}: {message}")]
pub struct BackendError {
    pub code: i32,
    pub message: String,
}

impl BackendError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// An update or response that does not fit what the cache expects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Update {update} carries invalid id")]
    InvalidId { update: &'static str },

    #[error("Update {update} refers to unknown {kind} {id}")]
    MissingEntity {
        update: &'static str,
        kind: &'static str,
        id: i64,
    },

    #[error("Unexpected response {got} to {request}")]
    UnexpectedResponse {
        request: &'static str,
        got: &'static str,
    },
}
