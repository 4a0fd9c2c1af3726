//! Calls: backend call updates, local media signals and the active-call
//! count the platform keeps the process alive for.

use std::sync::Arc;

use beacon_shared::models::{Call, CallSettings, CallState};
use beacon_shared::types::CallId;
use tracing::{debug, info};

use crate::cache::EntityCache;
use crate::error::Result;

impl EntityCache {
    pub(crate) fn on_call(&self, call: Call) -> Result<()> {
        let now = self.inner.clock.now_millis();
        let Some(change) = self.inner.store.apply_call(call, now)? else {
            return Ok(());
        };
        debug!(call_id = %change.new.id, state = ?change.new.state, "call updated");
        if change.active_delta != 0 {
            info!(
                call_id = %change.new.id,
                delta = change.active_delta,
                active = change.active_count,
                "active calls changed"
            );
        }

        self.post(move |cache| {
            let inner = &cache.inner;
            inner.subscriptions.notify_call(&change.new);
            inner.bridge.on_call_updated(&change.new);
            if change.active_delta != 0 {
                inner.bridge.on_active_calls_changed(change.active_count);
            }
        });
        Ok(())
    }

    /// Local media state of a call. Only an established connection is
    /// forwarded to observers.
    pub fn on_call_state_changed(&self, call_id: CallId, state: CallState) {
        if state != CallState::Established {
            return;
        }
        self.post(move |cache| cache.inner.subscriptions.notify_call_state(call_id, &state));
    }

    pub fn on_call_signal_bars_changed(&self, call_id: CallId, bars: i32) {
        self.post(move |cache| {
            cache
                .inner
                .subscriptions
                .notify_call_signal_bars(call_id, bars)
        });
    }

    /// Store local-only settings and tell observers and the platform.
    pub fn update_call_settings(&self, call_id: CallId, settings: CallSettings) -> Result<()> {
        let settings = self.inner.store.set_call_settings(call_id, settings)?;
        self.post(move |cache| {
            cache
                .inner
                .subscriptions
                .notify_call_settings(call_id, &settings);
            cache.inner.bridge.on_call_settings_changed(call_id, &settings);
        });
        Ok(())
    }

    /// Force-release active calls that stopped receiving updates. Returns
    /// how many were released.
    pub fn release_stale_calls(&self) -> usize {
        let now = self.inner.clock.now_millis();
        let stale = self
            .inner
            .store
            .release_stale_calls(now, self.inner.config.call_stale_after_ms());
        if stale.released.is_empty() {
            return 0;
        }
        info!(
            released = stale.released.len(),
            active = stale.active_count,
            "stale calls released"
        );
        let active = stale.active_count;
        self.post(move |cache| cache.inner.bridge.on_active_calls_changed(active));
        stale.released.len()
    }

    pub fn call(&self, call_id: CallId) -> Option<Arc<Call>> {
        self.inner.store.call(call_id)
    }

    pub fn call_settings(&self, call_id: CallId) -> Option<Arc<CallSettings>> {
        self.inner.store.call_settings(call_id)
    }

    /// The most recent call that has not finished.
    pub fn pending_call(&self) -> Option<Arc<Call>> {
        self.inner.store.pending_call()
    }

    pub fn active_call_count(&self) -> usize {
        self.inner.store.active_call_count()
    }
}
