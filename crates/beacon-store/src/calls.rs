//! Call domain: call values, local settings and active-call accounting.
//!
//! A call is counted as active exactly once, the first time a non-terminal
//! value is seen, and released exactly once, either by a terminal update or
//! by [`EntityStore::release_stale_calls`] when its updates stopped arriving.

use std::sync::Arc;

use beacon_shared::models::{Call, CallSettings, CallState};
use beacon_shared::types::{CallId, EntityKind};
use tracing::warn;

use crate::error::{Result, StoreError};
use crate::store::{CallEntry, EntityStore};

/// Result of applying a call update.
#[derive(Debug, Clone)]
pub struct CallChange {
    pub old: Option<Arc<Call>>,
    pub new: Arc<Call>,
    /// `1` when the call started counting, `-1` when it stopped, else `0`.
    pub active_delta: i32,
    /// Number of active calls after this update.
    pub active_count: usize,
}

/// Calls force-released by a stale sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaleCalls {
    pub released: Vec<CallId>,
    pub active_count: usize,
}

impl EntityStore {
    /// Replace the cached call.
    ///
    /// Terminal states are sticky: a non-terminal value arriving after a
    /// terminal one is dropped and `Ok(None)` is returned.
    pub fn apply_call(&self, call: Call, now_ms: i64) -> Result<Option<CallChange>> {
        if !call.id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::Call,
            });
        }

        let id = call.id;
        let mut domain = self.calls.lock();
        let old = domain.calls.get(&id).map(|entry| Arc::clone(&entry.call));
        if let Some(old) = &old {
            if old.state.is_terminal() && !call.state.is_terminal() {
                warn!(call_id = %id, state = ?call.state, "ignoring update for finished call");
                return Ok(None);
            }
        }

        let new = Arc::new(call);
        domain.calls.insert(
            id,
            CallEntry {
                call: Arc::clone(&new),
                updated_at: now_ms,
            },
        );

        let active_delta = if new.is_active() {
            if domain.ever_active.insert(id) {
                domain.active.insert(id);
                1
            } else {
                0
            }
        } else if domain.active.remove(&id) {
            -1
        } else {
            0
        };

        Ok(Some(CallChange {
            old,
            new,
            active_delta,
            active_count: domain.active.len(),
        }))
    }

    /// Release every active call whose last update is older than
    /// `stale_after_ms`. A released call is never counted again.
    ///
    /// Established calls are exempt: the backend sends nothing while a call
    /// is in progress, so their age says nothing about whether they ended.
    pub fn release_stale_calls(&self, now_ms: i64, stale_after_ms: i64) -> StaleCalls {
        let mut domain = self.calls.lock();
        let stale: Vec<CallId> = domain
            .active
            .iter()
            .copied()
            .filter(|id| match domain.calls.get(id) {
                Some(entry) => {
                    entry.call.state != CallState::Established
                        && now_ms - entry.updated_at >= stale_after_ms
                }
                None => true,
            })
            .collect();

        for id in &stale {
            domain.active.remove(id);
            warn!(call_id = %id, "releasing call with no update");
        }

        StaleCalls {
            released: stale,
            active_count: domain.active.len(),
        }
    }

    /// Store local-only settings for a call.
    pub fn set_call_settings(
        &self,
        call_id: CallId,
        settings: CallSettings,
    ) -> Result<Arc<CallSettings>> {
        if !call_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::CallSettings,
            });
        }
        let settings = Arc::new(settings);
        self.calls
            .lock()
            .settings
            .insert(call_id, Arc::clone(&settings));
        Ok(settings)
    }

    pub fn call(&self, call_id: CallId) -> Option<Arc<Call>> {
        self.calls
            .lock()
            .calls
            .get(&call_id)
            .map(|entry| Arc::clone(&entry.call))
    }

    pub fn call_settings(&self, call_id: CallId) -> Option<Arc<CallSettings>> {
        self.calls.lock().settings.get(&call_id).cloned()
    }

    /// The most recently updated call that is still counted as active.
    /// Calls released by a stale sweep are excluded.
    pub fn pending_call(&self) -> Option<Arc<Call>> {
        let domain = self.calls.lock();
        domain
            .calls
            .values()
            .filter(|entry| domain.active.contains(&entry.call.id))
            .max_by_key(|entry| (entry.updated_at, entry.call.id))
            .map(|entry| Arc::clone(&entry.call))
    }

    pub fn active_call_count(&self) -> usize {
        self.calls.lock().active.len()
    }
}
