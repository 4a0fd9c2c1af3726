//! Collaborators outside the cache that react to a few of its events.

use std::sync::Arc;

use beacon_shared::error::BackendError;
use beacon_shared::models::{Call, CallSettings, User};
use beacon_shared::types::{CallId, ChatId};

use crate::live_location::LiveLocationShare;

/// Platform integration: account switcher, notification channels, the
/// keep-alive service for calls and the generic error surface.
///
/// Invoked on the foreground thread.
pub trait PlatformBridge: Send + Sync {
    /// The signed-in account's profile changed. `None` after sign-out.
    fn on_account_profile_updated(&self, _user: Option<&Arc<User>>, _is_first: bool) {}

    /// A chat's identity changed in a way notification channels care about.
    fn on_chat_identity_changed(&self, _chat_id: ChatId) {}

    fn on_call_updated(&self, _call: &Arc<Call>) {}

    fn on_call_settings_changed(&self, _call_id: CallId, _settings: &Arc<CallSettings>) {}

    /// Number of calls keeping the process alive.
    fn on_active_calls_changed(&self, _active_count: usize) {}

    /// Number of live-location shares keeping location updates alive
    /// changed by `delta`.
    fn change_location_reference_count(&self, _delta: i32) {}

    fn show_error(&self, _error: &BackendError) {}
}

/// Device location source. Registered only while at least one outgoing
/// live location is active.
pub trait LocationBroadcaster: Send + Sync {
    fn register(&self) {}

    fn unregister(&self) {}

    /// The full list of active shares after a change.
    fn on_output_list_changed(&self, _shares: &[LiveLocationShare]) {}

    /// A broadcast edit was accepted for `share`.
    fn on_output_message_edited(&self, _share: &LiveLocationShare) {}
}

/// Bridge that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBridge;

impl PlatformBridge for NoopBridge {}

impl LocationBroadcaster for NoopBridge {}
