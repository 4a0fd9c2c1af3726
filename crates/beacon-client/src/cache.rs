//! The cache hub.
//!
//! [`EntityCache`] owns the store, the subscription tables, the presence
//! scheduler and the live-location tracker, and talks to the backend and the
//! platform through trait objects. It is cheap to clone and safe to share:
//! updates may be handed to it from any thread, while every observer
//! callback is posted to the foreground queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use beacon_shared::error::ProtocolError;
use beacon_shared::models::{
    BasicGroup, BasicGroupFullInfo, Supergroup, SupergroupFullInfo, User, UserFullInfo,
};
use beacon_shared::protocol::{Request, Response, Update};
use beacon_shared::time::{Clock, SystemClock};
use beacon_shared::types::{BasicGroupId, SupergroupId, UserId};
use beacon_store::EntityStore;
use tokio::sync::{mpsc, Notify};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendCommand, ChannelBackend};
use crate::bridge::{LocationBroadcaster, NoopBridge, PlatformBridge};
use crate::config::CacheConfig;
use crate::foreground::{Foreground, ForegroundQueue, ForegroundTask};
use crate::live_location::LiveLocations;
use crate::presence::PresenceScheduler;
use crate::registry::SubscriptionRegistry;

/// Callback of the `*_full_with` getters. `None` when the backend answered
/// with an error.
pub type FullInfoCallback<T> = Box<dyn FnOnce(Option<Arc<T>>) + Send>;

type FullInfoAbsorb<T> = Box<dyn FnOnce(&EntityCache, &'static str, Response) -> Option<Arc<T>> + Send>;

pub(crate) struct Inner {
    pub(crate) config: CacheConfig,
    pub(crate) store: EntityStore,
    pub(crate) subscriptions: SubscriptionRegistry,
    pub(crate) presence: Arc<PresenceScheduler>,
    pub(crate) live_locations: LiveLocations,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) bridge: Arc<dyn PlatformBridge>,
    pub(crate) locations: Arc<dyn LocationBroadcaster>,
    pub(crate) foreground: Foreground,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) wake: Arc<Notify>,
    /// A `GetMe` request is outstanding.
    pub(crate) loading_my_user: AtomicBool,
}

#[derive(Clone)]
pub struct EntityCache {
    pub(crate) inner: Arc<Inner>,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

pub struct EntityCacheBuilder {
    config: CacheConfig,
    backend: Arc<dyn Backend>,
    bridge: Arc<dyn PlatformBridge>,
    locations: Arc<dyn LocationBroadcaster>,
    clock: Arc<dyn Clock>,
}

impl EntityCacheBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    pub fn bridge(mut self, bridge: Arc<dyn PlatformBridge>) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn location_broadcaster(mut self, locations: Arc<dyn LocationBroadcaster>) -> Self {
        self.locations = locations;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the cache and the foreground queue its notifications go to.
    pub fn build(self) -> (EntityCache, ForegroundQueue) {
        let wake = Arc::new(Notify::new());
        let presence = Arc::new(PresenceScheduler::new(
            Arc::clone(&self.clock),
            Arc::clone(&wake),
            self.config.just_now_secs,
            self.config.start_paused,
        ));
        let subscriptions = SubscriptionRegistry::new({
            let presence = Arc::clone(&presence);
            move |needed| presence.set_ticks_needed(needed)
        });
        let (foreground, queue) = Foreground::channel();

        let cache = EntityCache {
            inner: Arc::new(Inner {
                config: self.config,
                store: EntityStore::new(),
                subscriptions,
                presence,
                live_locations: LiveLocations::new(),
                backend: self.backend,
                bridge: self.bridge,
                locations: self.locations,
                foreground,
                clock: self.clock,
                wake,
                loading_my_user: AtomicBool::new(false),
            }),
        };
        (cache, queue)
    }
}

impl EntityCache {
    pub fn builder(backend: Arc<dyn Backend>) -> EntityCacheBuilder {
        EntityCacheBuilder {
            config: CacheConfig::default(),
            backend,
            bridge: Arc::new(NoopBridge),
            locations: Arc::new(NoopBridge),
            clock: Arc::new(SystemClock),
        }
    }

    /// A cache whose requests are queued on a bounded channel sized by
    /// `config.backend_queue`. The transport consumes the returned receiver.
    pub fn with_channel_backend(
        config: CacheConfig,
    ) -> (EntityCache, ForegroundQueue, mpsc::Receiver<BackendCommand>) {
        let (backend, requests) = ChannelBackend::new(config.backend_queue);
        let (cache, queue) = Self::builder(Arc::new(backend)).config(config).build();
        (cache, queue, requests)
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Read access to the cached entities. Callable from any thread.
    pub fn store(&self) -> &EntityStore {
        &self.inner.store
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.inner.subscriptions
    }

    pub fn presence(&self) -> &PresenceScheduler {
        &self.inner.presence
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn foreground(&self) -> Foreground {
        self.inner.foreground.clone()
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Run `task` on the foreground thread.
    pub(crate) fn post(&self, task: impl FnOnce(&EntityCache) + Send + 'static) {
        let cache = self.clone();
        self.inner.foreground.post(move || task(&cache));
    }

    /// Issue a request. `on_result` runs on whatever thread the backend
    /// answers on.
    pub(crate) fn send(
        &self,
        request: Request,
        on_result: impl FnOnce(&EntityCache, Response) + Send + 'static,
    ) {
        debug!(request = request.name(), "backend request");
        let cache = self.clone();
        self.inner
            .backend
            .send(request, Box::new(move |response| on_result(&cache, response)));
    }

    /// Handle a response that carries no usable value: errors are logged and
    /// surfaced to the platform, anything else is a protocol mismatch.
    pub(crate) fn reject_response(&self, request: &'static str, response: Response) {
        match response {
            Response::Error(err) => {
                warn!(request, code = err.code, message = %err.message, "backend request failed");
                self.post(move |cache| cache.inner.bridge.show_error(&err));
            }
            other => {
                let err = ProtocolError::UnexpectedResponse {
                    request,
                    got: other.name(),
                };
                warn!(error = %err, "ignoring response");
            }
        }
    }

    /// Feed a base-record response through the update path. Returns true
    /// when the record is now cached.
    pub(crate) fn absorb_base(&self, request: &'static str, response: Response) -> bool {
        match response {
            Response::User { user } => {
                self.handle_update(Update::User { user: user.into() });
                true
            }
            Response::BasicGroup { basic_group } => {
                self.handle_update(Update::BasicGroup { basic_group });
                true
            }
            Response::Supergroup { supergroup } => {
                self.handle_update(Update::Supergroup { supergroup });
                true
            }
            other => {
                self.reject_response(request, other);
                false
            }
        }
    }

    // ------------------------------------------------------------------
    // Get or request
    // ------------------------------------------------------------------

    /// The cached user. Requests it when missing, or always when `refresh`
    /// is set; the result arrives through the normal update path.
    pub fn user_or_request(&self, user_id: UserId, refresh: bool) -> Option<Arc<User>> {
        let user = self.inner.store.user(user_id);
        if user_id.is_valid() && (user.is_none() || refresh) {
            self.send(Request::GetUser { user_id }, |cache, response| {
                cache.absorb_base("get_user", response);
            });
        }
        user
    }

    pub fn basic_group_or_request(
        &self,
        basic_group_id: BasicGroupId,
        refresh: bool,
    ) -> Option<Arc<BasicGroup>> {
        let group = self.inner.store.basic_group(basic_group_id);
        if basic_group_id.is_valid() && (group.is_none() || refresh) {
            self.send(Request::GetBasicGroup { basic_group_id }, |cache, response| {
                cache.absorb_base("get_basic_group", response);
            });
        }
        group
    }

    pub fn supergroup_or_request(
        &self,
        supergroup_id: SupergroupId,
        refresh: bool,
    ) -> Option<Arc<Supergroup>> {
        let supergroup = self.inner.store.supergroup(supergroup_id);
        if supergroup_id.is_valid() && (supergroup.is_none() || refresh) {
            self.send(Request::GetSupergroup { supergroup_id }, |cache, response| {
                cache.absorb_base("get_supergroup", response);
            });
        }
        supergroup
    }

    /// The cached extended profile. Requested when missing or when
    /// `allow_request` is set.
    pub fn user_full(&self, user_id: UserId, allow_request: bool) -> Option<Arc<UserFullInfo>> {
        let full = self.inner.store.user_full(user_id);
        if user_id.is_valid() && (full.is_none() || allow_request) {
            self.request_user_full(user_id, None);
        }
        full
    }

    /// Deliver the extended profile to `callback`: right away when cached,
    /// otherwise on the foreground thread once the request completes.
    pub fn user_full_with(
        &self,
        user_id: UserId,
        callback: impl FnOnce(Option<Arc<UserFullInfo>>) + Send + 'static,
    ) {
        match self.inner.store.user_full(user_id) {
            Some(full) => callback(Some(full)),
            None if user_id.is_valid() => self.request_user_full(user_id, Some(Box::new(callback))),
            None => callback(None),
        }
    }

    fn request_user_full(&self, user_id: UserId, callback: Option<FullInfoCallback<UserFullInfo>>) {
        let base = (!self.inner.store.has_user(user_id)).then_some(Request::GetUser { user_id });
        let absorb: FullInfoAbsorb<UserFullInfo> =
            Box::new(move |cache, request, response| match response {
                Response::UserFullInfo { full_info } => cache.apply_user_full(user_id, full_info),
                other => {
                    cache.reject_response(request, other);
                    None
                }
            });
        self.request_full(base, Request::GetUserFullInfo { user_id }, absorb, callback);
    }

    pub fn basic_group_full(
        &self,
        basic_group_id: BasicGroupId,
        allow_request: bool,
    ) -> Option<Arc<BasicGroupFullInfo>> {
        let full = self.inner.store.basic_group_full(basic_group_id);
        if basic_group_id.is_valid() && (full.is_none() || allow_request) {
            self.request_basic_group_full(basic_group_id, None);
        }
        full
    }

    pub fn basic_group_full_with(
        &self,
        basic_group_id: BasicGroupId,
        callback: impl FnOnce(Option<Arc<BasicGroupFullInfo>>) + Send + 'static,
    ) {
        match self.inner.store.basic_group_full(basic_group_id) {
            Some(full) => callback(Some(full)),
            None if basic_group_id.is_valid() => {
                self.request_basic_group_full(basic_group_id, Some(Box::new(callback)))
            }
            None => callback(None),
        }
    }

    fn request_basic_group_full(
        &self,
        basic_group_id: BasicGroupId,
        callback: Option<FullInfoCallback<BasicGroupFullInfo>>,
    ) {
        let base = self
            .inner
            .store
            .basic_group(basic_group_id)
            .is_none()
            .then_some(Request::GetBasicGroup { basic_group_id });
        let absorb: FullInfoAbsorb<BasicGroupFullInfo> =
            Box::new(move |cache, request, response| match response {
                Response::BasicGroupFullInfo { full_info } => {
                    cache.apply_basic_group_full(basic_group_id, full_info)
                }
                other => {
                    cache.reject_response(request, other);
                    None
                }
            });
        self.request_full(
            base,
            Request::GetBasicGroupFullInfo { basic_group_id },
            absorb,
            callback,
        );
    }

    pub fn supergroup_full(
        &self,
        supergroup_id: SupergroupId,
        allow_request: bool,
    ) -> Option<Arc<SupergroupFullInfo>> {
        let full = self.inner.store.supergroup_full(supergroup_id);
        if supergroup_id.is_valid() && (full.is_none() || allow_request) {
            self.request_supergroup_full(supergroup_id, None);
        }
        full
    }

    pub fn supergroup_full_with(
        &self,
        supergroup_id: SupergroupId,
        callback: impl FnOnce(Option<Arc<SupergroupFullInfo>>) + Send + 'static,
    ) {
        match self.inner.store.supergroup_full(supergroup_id) {
            Some(full) => callback(Some(full)),
            None if supergroup_id.is_valid() => {
                self.request_supergroup_full(supergroup_id, Some(Box::new(callback)))
            }
            None => callback(None),
        }
    }

    fn request_supergroup_full(
        &self,
        supergroup_id: SupergroupId,
        callback: Option<FullInfoCallback<SupergroupFullInfo>>,
    ) {
        let base = self
            .inner
            .store
            .supergroup(supergroup_id)
            .is_none()
            .then_some(Request::GetSupergroup { supergroup_id });
        let absorb: FullInfoAbsorb<SupergroupFullInfo> =
            Box::new(move |cache, request, response| match response {
                Response::SupergroupFullInfo { full_info } => {
                    cache.apply_supergroup_full(supergroup_id, full_info)
                }
                other => {
                    cache.reject_response(request, other);
                    None
                }
            });
        self.request_full(
            base,
            Request::GetSupergroupFullInfo { supergroup_id },
            absorb,
            callback,
        );
    }

    /// Fetch `full`, preceded by `base` when the base record is unknown.
    fn request_full<T>(
        &self,
        base: Option<Request>,
        full: Request,
        absorb: FullInfoAbsorb<T>,
        callback: Option<FullInfoCallback<T>>,
    ) where
        T: Send + Sync + 'static,
    {
        let Some(base) = base else {
            self.fetch_full(full, absorb, callback);
            return;
        };
        let base_name = base.name();
        self.send(base, move |cache, response| {
            if cache.absorb_base(base_name, response) {
                cache.fetch_full(full, absorb, callback);
            } else if let Some(callback) = callback {
                cache.post(move |_| callback(None));
            }
        });
    }

    fn fetch_full<T>(
        &self,
        full: Request,
        absorb: FullInfoAbsorb<T>,
        callback: Option<FullInfoCallback<T>>,
    ) where
        T: Send + Sync + 'static,
    {
        let name = full.name();
        self.send(full, move |cache, response| {
            let value = absorb(cache, name, response);
            if let Some(callback) = callback {
                cache.post(move |_| callback(value));
            }
        });
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Session start: fetch the live locations left running by an earlier
    /// session.
    pub fn on_startup(&self) {
        self.request_active_live_locations();
    }

    /// The signed-in user is being torn down.
    pub fn on_user_cleanup(&self) {
        self.inner.presence.cancel_timers();
        self.request_active_live_locations();
    }

    /// Forget everything, e.g. on logout or restart.
    pub fn clear(&self) {
        let released = self.inner.store.clear();
        self.inner.presence.clear();
        self.inner.loading_my_user.store(false, Ordering::SeqCst);
        let now = self.inner.clock.now_millis();
        if let Some(changed) = self.inner.live_locations.replace_all(&[], now) {
            self.report_shares_changed(changed);
        }
        if released > 0 {
            self.post(|cache| cache.inner.bridge.on_active_calls_changed(0));
        }
        info!(released_calls = released, "cache cleared");
    }

    /// Whether the UI showing presence labels is hidden.
    pub fn set_ui_paused(&self, paused: bool) {
        self.inner.presence.set_ui_paused(paused);
    }

    // ------------------------------------------------------------------
    // Foreground loop
    // ------------------------------------------------------------------

    /// Earliest presence or live-location deadline, in milliseconds since
    /// the epoch.
    pub fn next_deadline(&self) -> Option<i64> {
        let presence = self.inner.presence.next_deadline();
        let expiry = self.inner.live_locations.next_expiry();
        match (presence, expiry) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every presence refresh and expire every live location due now.
    /// Returns the number of presence labels refreshed.
    ///
    /// A refresh only fires if the user is still offline with the timestamp
    /// it was scheduled for; the next one is scheduled in the same step.
    pub fn run_due_timers(&self) -> usize {
        let inner = &self.inner;
        let now = inner.clock.now_millis();
        let mut fired = 0;

        for (user_id, was_online) in inner.presence.take_due(now) {
            let status = inner
                .store
                .with_user(user_id, |user| {
                    (user.status.was_online() == Some(was_online)).then(|| {
                        inner.presence.observe(user_id, &user.status, false);
                        user.status
                    })
                })
                .flatten();
            if let Some(status) = status {
                inner.subscriptions.notify_user_status(user_id, status, true);
                fired += 1;
            }
        }

        if let Some(changed) = inner.live_locations.expire(now) {
            info!(removed = -changed.delta, "live locations expired");
            self.report_shares_changed(changed);
        }
        fired
    }

    /// Drive the foreground thread: run posted tasks in order, fire timers
    /// at their deadlines and sweep stale calls periodically. Returns once
    /// [`Foreground::shutdown`] is called or every sender is gone.
    pub async fn run_foreground(&self, mut queue: ForegroundQueue) {
        let mut housekeeping = tokio::time::interval(self.inner.config.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("foreground loop started");

        loop {
            let deadline = self.next_deadline().map(|due| self.instant_for(due));
            let timer = async move {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                task = queue.recv() => match task {
                    Some(ForegroundTask::Run(task)) => task(),
                    Some(ForegroundTask::Shutdown) | None => break,
                },
                _ = self.inner.wake.notified() => {}
                _ = timer => {
                    self.run_due_timers();
                }
                _ = housekeeping.tick() => {
                    self.release_stale_calls();
                }
            }
        }

        info!("foreground loop stopped");
    }

    fn instant_for(&self, due_ms: i64) -> Instant {
        let delay = due_ms - self.inner.clock.now_millis();
        Instant::now() + Duration::from_millis(u64::try_from(delay).unwrap_or(0))
    }
}
