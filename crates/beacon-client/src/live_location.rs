//! Outgoing live-location shares.
//!
//! Only outgoing, editable, already-sent location messages with a non-zero
//! live period and time left are tracked. Every mutation reports the
//! share-count delta. Whether the location source is registered is decided
//! on the foreground thread from the list as it is when the report runs, so
//! reports handled out of mutation order still leave it matching the list.

use std::sync::atomic::{AtomicBool, Ordering};

use beacon_shared::models::{LiveLocation, Location, Message, MessageContent};
use beacon_shared::protocol::{Request, Response};
use beacon_shared::types::{ChatId, MessageId};
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::cache::EntityCache;

#[derive(Debug, Clone, PartialEq)]
pub struct LiveLocationShare {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub location: Location,
    pub heading: i32,
    pub live_period: i32,
    /// Milliseconds since the epoch.
    pub expires_at_ms: i64,
}

impl LiveLocationShare {
    /// The share described by `message`, if it is one this device drives.
    pub fn from_message(message: &Message, now_ms: i64) -> Option<Self> {
        if !message.is_outgoing || !message.can_be_edited || message.is_sending {
            return None;
        }
        let MessageContent::Location(live) = &message.content else {
            return None;
        };
        if live.live_period == 0 || live.expires_in == 0 {
            return None;
        }
        Some(Self {
            chat_id: message.chat_id,
            message_id: message.id,
            location: live.location,
            heading: live.heading,
            live_period: live.live_period,
            expires_at_ms: now_ms + i64::from(live.expires_in) * 1000,
        })
    }

    fn is(&self, chat_id: ChatId, message_id: MessageId) -> bool {
        self.chat_id == chat_id && self.message_id == message_id
    }
}

/// Outcome of a change to the share list.
#[derive(Debug, Clone, PartialEq)]
pub struct SharesChanged {
    /// Change in the number of shares.
    pub delta: i32,
    /// The list right after the change.
    pub shares: Vec<LiveLocationShare>,
}

#[derive(Default)]
struct State {
    shares: Vec<LiveLocationShare>,
}

impl State {
    fn changed(&self, delta: i32) -> SharesChanged {
        SharesChanged {
            delta,
            shares: self.shares.clone(),
        }
    }

    fn remove_where(&mut self, pred: impl Fn(&LiveLocationShare) -> bool) -> usize {
        let before = self.shares.len();
        self.shares.retain(|share| !pred(share));
        before - self.shares.len()
    }
}

#[derive(Default)]
pub struct LiveLocations {
    state: Mutex<State>,
    /// Owned by the foreground thread.
    registered: AtomicBool,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

impl LiveLocations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly observed message.
    pub fn add_message(&self, message: &Message, now_ms: i64) -> Option<SharesChanged> {
        let share = LiveLocationShare::from_message(message, now_ms)?;
        let mut state = self.state.lock();
        if let Some(existing) = state
            .shares
            .iter_mut()
            .find(|s| s.is(share.chat_id, share.message_id))
        {
            *existing = share;
            return None;
        }
        state.shares.push(share);
        Some(state.changed(1))
    }

    /// Apply an edit of a tracked message. An edit with no time left ends
    /// the share; other edits only refresh it and report nothing.
    pub fn update_content(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        content: &LiveLocation,
        now_ms: i64,
    ) -> Option<SharesChanged> {
        if content.live_period == 0 {
            return None;
        }
        let mut state = self.state.lock();
        let index = state.shares.iter().position(|s| s.is(chat_id, message_id))?;
        if content.expires_in == 0 {
            state.shares.remove(index);
            return Some(state.changed(-1));
        }
        let share = &mut state.shares[index];
        share.location = content.location;
        share.heading = content.heading;
        share.live_period = content.live_period;
        share.expires_at_ms = now_ms + i64::from(content.expires_in) * 1000;
        None
    }

    pub fn delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) -> Option<SharesChanged> {
        let mut state = self.state.lock();
        let removed =
            state.remove_where(|s| s.chat_id == chat_id && message_ids.contains(&s.message_id));
        (removed > 0).then(|| state.changed(-count(removed)))
    }

    /// Replace the whole list, e.g. with the backend's list of active shares.
    pub fn replace_all(&self, messages: &[Message], now_ms: i64) -> Option<SharesChanged> {
        let shares: Vec<LiveLocationShare> = messages
            .iter()
            .filter_map(|message| LiveLocationShare::from_message(message, now_ms))
            .collect();
        let mut state = self.state.lock();
        if state.shares.is_empty() && shares.is_empty() {
            return None;
        }
        let delta = count(shares.len()) - count(state.shares.len());
        state.shares = shares;
        Some(state.changed(delta))
    }

    /// Drop every share whose time ran out.
    pub fn expire(&self, now_ms: i64) -> Option<SharesChanged> {
        let mut state = self.state.lock();
        let removed = state.remove_where(|s| s.expires_at_ms <= now_ms);
        (removed > 0).then(|| state.changed(-count(removed)))
    }

    /// Store the location confirmed by a broadcast edit.
    pub fn record_broadcast(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        content: &LiveLocation,
    ) -> Option<LiveLocationShare> {
        let mut state = self.state.lock();
        let share = state.shares.iter_mut().find(|s| s.is(chat_id, message_id))?;
        share.location = content.location;
        share.heading = content.heading;
        Some(share.clone())
    }

    pub fn shares(&self) -> Vec<LiveLocationShare> {
        self.state.lock().shares.clone()
    }

    pub fn has_active(&self) -> bool {
        !self.state.lock().shares.is_empty()
    }

    pub fn find(&self, chat_id: ChatId) -> Option<LiveLocationShare> {
        self.state
            .lock()
            .shares
            .iter()
            .find(|s| s.chat_id == chat_id)
            .cloned()
    }

    /// Shares in `chat_id`, or all of them.
    pub fn matching(&self, chat_id: Option<ChatId>) -> Vec<LiveLocationShare> {
        self.state
            .lock()
            .shares
            .iter()
            .filter(|s| chat_id.map_or(true, |chat_id| s.chat_id == chat_id))
            .cloned()
            .collect()
    }

    /// Align the registration with the current list. Returns the list and
    /// `Some(needed)` when the location source has to be registered or
    /// released. Foreground thread only.
    pub fn sync_registration(&self) -> (Vec<LiveLocationShare>, Option<bool>) {
        let shares = self.shares();
        let needed = !shares.is_empty();
        let was = self.registered.swap(needed, Ordering::SeqCst);
        (shares, (was != needed).then_some(needed))
    }

    pub fn is_registered(&self) -> bool {
        self.registered.load(Ordering::SeqCst)
    }

    pub fn next_expiry(&self) -> Option<i64> {
        self.state
            .lock()
            .shares
            .iter()
            .map(|s| s.expires_at_ms)
            .min()
    }
}

// ---------------------------------------------------------------------------
// Cache operations
// ---------------------------------------------------------------------------

impl EntityCache {
    pub(crate) fn on_new_message(&self, message: &Message) {
        let now = self.inner.clock.now_millis();
        if let Some(changed) = self.inner.live_locations.add_message(message, now) {
            self.report_shares_changed(changed);
        }
    }

    pub(crate) fn on_message_content(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        content: &LiveLocation,
    ) {
        let now = self.inner.clock.now_millis();
        match self
            .inner
            .live_locations
            .update_content(chat_id, message_id, content, now)
        {
            Some(changed) => self.report_shares_changed(changed),
            None => self.inner.wake.notify_one(),
        }
    }

    pub(crate) fn on_delete_messages(&self, chat_id: ChatId, message_ids: &[MessageId]) {
        if let Some(changed) = self.inner.live_locations.delete_messages(chat_id, message_ids) {
            self.report_shares_changed(changed);
        }
    }

    /// Replace the tracked shares with the backend's list of active ones.
    pub(crate) fn request_active_live_locations(&self) {
        self.send(Request::GetActiveLiveLocationMessages, |cache, response| match response {
            Response::Messages { messages } => {
                let now = cache.inner.clock.now_millis();
                if let Some(changed) = cache.inner.live_locations.replace_all(&messages, now) {
                    cache.report_shares_changed(changed);
                }
            }
            other => cache.reject_response("get_active_live_location_messages", other),
        });
    }

    /// Stop sharing in `chat_id`, or everywhere when `None`.
    pub fn stop_live_locations(&self, chat_id: Option<ChatId>) {
        for share in self.inner.live_locations.matching(chat_id) {
            let (chat_id, message_id) = (share.chat_id, share.message_id);
            debug!(chat_id = %chat_id, message_id = %message_id, "stopping live location");
            self.send(
                Request::EditMessageLiveLocation {
                    chat_id,
                    message_id,
                    location: None,
                    heading: 0,
                },
                move |_, response| {
                    if let Response::Error(err) = response {
                        debug!(
                            chat_id = %chat_id,
                            message_id = %message_id,
                            code = err.code,
                            message = %err.message,
                            "stopping live location failed"
                        );
                    }
                },
            );
        }
    }

    /// A new device location: push it to every active share.
    pub fn on_location_broadcast(&self, location: Location, heading: i32) {
        for share in self.inner.live_locations.shares() {
            let (chat_id, message_id) = (share.chat_id, share.message_id);
            self.send(
                Request::EditMessageLiveLocation {
                    chat_id,
                    message_id,
                    location: Some(location),
                    heading,
                },
                move |cache, response| match response {
                    Response::Message { message } => {
                        let MessageContent::Location(live) = &message.content else {
                            return;
                        };
                        if let Some(share) = cache.inner.live_locations.record_broadcast(
                            message.chat_id,
                            message.id,
                            live,
                        ) {
                            cache.post(move |cache| {
                                cache.inner.locations.on_output_message_edited(&share)
                            });
                        }
                    }
                    Response::Error(err) => {
                        error!(
                            chat_id = %chat_id,
                            message_id = %message_id,
                            code = err.code,
                            message = %err.message,
                            "live location broadcast failed"
                        );
                    }
                    other => cache.reject_response("edit_message_live_location", other),
                },
            );
        }
    }

    pub fn live_location(&self, chat_id: ChatId) -> Option<LiveLocationShare> {
        self.inner.live_locations.find(chat_id)
    }

    pub fn live_locations(&self) -> Vec<LiveLocationShare> {
        self.inner.live_locations.shares()
    }

    pub fn has_active_live_locations(&self) -> bool {
        self.inner.live_locations.has_active()
    }

    pub(crate) fn report_shares_changed(&self, changed: SharesChanged) {
        debug!(delta = changed.delta, shares = changed.shares.len(), "live locations changed");
        self.inner.wake.notify_one();
        let delta = changed.delta;
        self.post(move |cache| {
            let inner = &cache.inner;
            let (shares, registration) = inner.live_locations.sync_registration();
            match registration {
                Some(true) => {
                    info!(shares = shares.len(), "live location sharing started");
                    inner.locations.register();
                }
                Some(false) => {
                    info!("live location sharing stopped");
                    inner.locations.unregister();
                }
                None => {}
            }
            inner.locations.on_output_list_changed(&shares);
            if delta != 0 {
                inner.bridge.change_location_reference_count(delta);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(expires_in: i32) -> LiveLocation {
        LiveLocation {
            location: Location {
                latitude: 52.5,
                longitude: 13.4,
            },
            live_period: 900,
            expires_in,
            heading: 0,
        }
    }

    fn message(chat: i64, id: i64, expires_in: i32) -> Message {
        Message {
            id: MessageId(id),
            chat_id: ChatId(chat),
            is_outgoing: true,
            can_be_edited: true,
            is_sending: false,
            content: MessageContent::Location(live(expires_in)),
        }
    }

    #[test]
    fn test_only_driven_shares_tracked() {
        let shares = LiveLocations::new();
        let incoming = Message {
            is_outgoing: false,
            ..message(1, 1, 60)
        };
        let sending = Message {
            is_sending: true,
            ..message(1, 2, 60)
        };
        let static_location = message(1, 3, 0);
        assert!(shares.add_message(&incoming, 0).is_none());
        assert!(shares.add_message(&sending, 0).is_none());
        assert!(shares.add_message(&static_location, 0).is_none());
        assert!(!shares.has_active());
    }

    #[test]
    fn test_registration_follows_list() {
        let shares = LiveLocations::new();
        let first = shares.add_message(&message(1, 1, 60), 0).unwrap();
        assert_eq!(first.delta, 1);
        assert_eq!(shares.sync_registration().1, Some(true));

        let second = shares.add_message(&message(2, 5, 60), 0).unwrap();
        assert_eq!(second.shares.len(), 2);
        assert_eq!(shares.sync_registration().1, None);

        let deleted = shares.delete_messages(ChatId(1), &[MessageId(1)]).unwrap();
        assert_eq!(deleted.delta, -1);
        assert_eq!(shares.sync_registration().1, None);

        shares
            .update_content(ChatId(2), MessageId(5), &live(0), 1_000)
            .unwrap();
        assert_eq!(shares.sync_registration(), (Vec::new(), Some(false)));
        assert!(!shares.has_active());
        assert!(!shares.is_registered());
    }

    #[test]
    fn test_late_report_does_not_resurrect_registration() {
        let shares = LiveLocations::new();
        // Both mutations land before either report is handled.
        shares.add_message(&message(1, 1, 60), 0).unwrap();
        shares.delete_messages(ChatId(1), &[MessageId(1)]).unwrap();

        assert_eq!(shares.sync_registration(), (Vec::new(), None));
        assert_eq!(shares.sync_registration(), (Vec::new(), None));
        assert!(!shares.is_registered());

        // A later add registers as usual.
        shares.add_message(&message(1, 2, 60), 0).unwrap();
        let (list, registration) = shares.sync_registration();
        assert_eq!(registration, Some(true));
        assert_eq!(list.len(), 1);
        assert!(shares.is_registered());
    }

    #[test]
    fn test_edit_refreshes_expiry() {
        let shares = LiveLocations::new();
        shares.add_message(&message(1, 1, 60), 0);
        assert_eq!(shares.next_expiry(), Some(60_000));
        assert!(shares
            .update_content(ChatId(1), MessageId(1), &live(120), 10_000)
            .is_none());
        assert_eq!(shares.next_expiry(), Some(130_000));
    }

    #[test]
    fn test_expire_removes_due_shares() {
        let shares = LiveLocations::new();
        shares.add_message(&message(1, 1, 60), 0);
        shares.add_message(&message(1, 2, 600), 0);
        assert!(shares.expire(59_999).is_none());
        let expired = shares.expire(60_000).unwrap();
        assert_eq!(expired.delta, -1);
        assert_eq!(shares.find(ChatId(1)).unwrap().message_id, MessageId(2));
    }

    #[test]
    fn test_replace_all() {
        let shares = LiveLocations::new();
        assert!(shares.replace_all(&[], 0).is_none());
        let replaced = shares
            .replace_all(&[message(1, 1, 60), message(2, 2, 60)], 0)
            .unwrap();
        assert_eq!(replaced.delta, 2);
        assert_eq!(replaced.shares.len(), 2);

        let cleared = shares.replace_all(&[], 0).unwrap();
        assert_eq!(cleared.delta, -2);
        assert!(cleared.shares.is_empty());
    }

    #[test]
    fn test_matching_and_broadcast_record() {
        let shares = LiveLocations::new();
        shares.add_message(&message(1, 1, 60), 0);
        shares.add_message(&message(2, 2, 60), 0);
        assert_eq!(shares.matching(None).len(), 2);
        assert_eq!(shares.matching(Some(ChatId(2))).len(), 1);

        let moved = LiveLocation {
            location: Location {
                latitude: 1.0,
                longitude: 2.0,
            },
            heading: 90,
            ..live(60)
        };
        let share = shares.record_broadcast(ChatId(2), MessageId(2), &moved).unwrap();
        assert_eq!(share.heading, 90);
        assert!(shares.record_broadcast(ChatId(3), MessageId(3), &moved).is_none());
    }
}
