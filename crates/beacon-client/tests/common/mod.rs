#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use beacon_client::{
    Backend, BasicGroupListener, CacheConfig, CallListener, ChatMemberStatusListener, EntityCache,
    ForegroundQueue, LiveLocationShare, LocationBroadcaster, MyUserListener, PlatformBridge,
    ResultHandler, SupergroupListener, UserDataListener, UserStatusListener,
};
use beacon_shared::error::BackendError;
use beacon_shared::models::{
    BasicGroup, Call, CallSettings, CallState, ChatMember, LiveLocation, Location, MemberStatus,
    Message, MessageContent, Supergroup, User, UserFullInfo, UserPatch, UserStatus,
};
use beacon_shared::protocol::{Request, Response};
use beacon_shared::time::ManualClock;
use beacon_shared::types::{BasicGroupId, CallId, ChatId, MessageId, SupergroupId, UserId};
use parking_lot::Mutex;

/// 1970-01-01 00:17:10 UTC, thirty seconds after `was_online = 1000`.
pub const START_MS: i64 = 1_030_000;

// ---------------------------------------------------------------------------
// Backend double
// ---------------------------------------------------------------------------

/// Keeps every request with its handler until the test answers it.
#[derive(Default)]
pub struct RecordingBackend {
    pending: Mutex<VecDeque<(Request, ResultHandler)>>,
}

impl RecordingBackend {
    pub fn requests(&self) -> Vec<Request> {
        self.pending
            .lock()
            .iter()
            .map(|(request, _)| request.clone())
            .collect()
    }

    /// Answer the oldest outstanding request and return it.
    pub fn respond(&self, response: Response) -> Request {
        let (request, handler) = self
            .pending
            .lock()
            .pop_front()
            .expect("no outstanding request");
        handler(response);
        request
    }

    pub fn fail(&self, code: i32, message: &str) -> Request {
        self.respond(Response::Error(BackendError::new(code, message)))
    }
}

impl Backend for RecordingBackend {
    fn send(&self, request: Request, on_result: ResultHandler) {
        self.pending.lock().push_back((request, on_result));
    }
}

// ---------------------------------------------------------------------------
// Platform double
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingBridge {
    events: Mutex<Vec<String>>,
}

impl RecordingBridge {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.events.lock())
    }

    fn push(&self, event: String) {
        self.events.lock().push(event);
    }
}

impl PlatformBridge for RecordingBridge {
    fn on_account_profile_updated(&self, user: Option<&Arc<User>>, is_first: bool) {
        match user {
            Some(user) => self.push(format!("profile:{}:{}", user.id, is_first)),
            None => self.push("profile:none".into()),
        }
    }

    fn on_chat_identity_changed(&self, chat_id: ChatId) {
        self.push(format!("identity:{chat_id}"));
    }

    fn on_call_updated(&self, call: &Arc<Call>) {
        self.push(format!("call:{}", call.id));
    }

    fn on_call_settings_changed(&self, call_id: CallId, _settings: &Arc<CallSettings>) {
        self.push(format!("call_settings:{call_id}"));
    }

    fn on_active_calls_changed(&self, active_count: usize) {
        self.push(format!("active_calls:{active_count}"));
    }

    fn change_location_reference_count(&self, delta: i32) {
        self.push(format!("location_refs:{delta}"));
    }

    fn show_error(&self, error: &BackendError) {
        self.push(format!("error:{}", error.code));
    }
}

impl LocationBroadcaster for RecordingBridge {
    fn register(&self) {
        self.push("register".into());
    }

    fn unregister(&self) {
        self.push("unregister".into());
    }

    fn on_output_list_changed(&self, shares: &[LiveLocationShare]) {
        self.push(format!("shares:{}", shares.len()));
    }

    fn on_output_message_edited(&self, share: &LiveLocationShare) {
        self.push(format!("edited:{}:{}", share.chat_id, share.message_id));
    }
}

// ---------------------------------------------------------------------------
// Observer double
// ---------------------------------------------------------------------------

/// Records every callback it receives as a short string.
#[derive(Default)]
pub struct Recorder {
    pub wants_ticks: bool,
    log: Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn ticking() -> Arc<Self> {
        Arc::new(Self {
            wants_ticks: true,
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.log.lock())
    }

    fn push(&self, entry: String) {
        self.log.lock().push(entry);
    }
}

impl UserDataListener for Recorder {
    fn on_user_updated(&self, user: &Arc<User>) {
        self.push(format!("user:{}:{}", user.id, user.first_name));
    }

    fn on_user_full_updated(&self, user_id: UserId, _full_info: &Arc<UserFullInfo>) {
        self.push(format!("user_full:{user_id}"));
    }
}

impl UserStatusListener for Recorder {
    fn on_user_status_changed(&self, user_id: UserId, _status: UserStatus, ui_only: bool) {
        self.push(format!("status:{user_id}:{ui_only}"));
    }

    fn needs_status_ui_updates(&self) -> bool {
        self.wants_ticks
    }
}

impl MyUserListener for Recorder {
    fn on_my_user_updated(&self, user: Option<&Arc<User>>) {
        match user {
            Some(user) => self.push(format!("me:{}", user.id)),
            None => self.push("me:none".into()),
        }
    }

    fn on_my_user_bio_updated(&self, bio: Option<&str>) {
        self.push(format!("bio:{}", bio.unwrap_or("")));
    }
}

impl BasicGroupListener for Recorder {
    fn on_basic_group_updated(&self, group: &Arc<BasicGroup>, migrated: bool) {
        self.push(format!("basic_group:{}:{migrated}", group.id));
    }
}

impl SupergroupListener for Recorder {
    fn on_supergroup_updated(&self, supergroup: &Arc<Supergroup>) {
        self.push(format!("supergroup:{}", supergroup.id));
    }
}

impl CallListener for Recorder {
    fn on_call_updated(&self, call: &Arc<Call>) {
        self.push(format!("call:{}:{:?}", call.id, call.state));
    }

    fn on_call_state_changed(&self, call_id: CallId, state: &CallState) {
        self.push(format!("call_state:{call_id}:{state:?}"));
    }

    fn on_call_settings_changed(&self, call_id: CallId, _settings: &Arc<CallSettings>) {
        self.push(format!("call_settings:{call_id}"));
    }

    fn on_call_signal_bars_changed(&self, call_id: CallId, bars: i32) {
        self.push(format!("bars:{call_id}:{bars}"));
    }
}

impl ChatMemberStatusListener for Recorder {
    fn on_chat_member_status_changed(&self, chat_id: ChatId, member: &ChatMember) {
        self.push(format!("member:{chat_id}:{}:{:?}", member.user_id, member.status));
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub cache: EntityCache,
    pub queue: ForegroundQueue,
    pub backend: Arc<RecordingBackend>,
    pub bridge: Arc<RecordingBridge>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// A cache with presence refresh unpaused and the clock at [`START_MS`].
    pub fn new() -> Self {
        let config = CacheConfig {
            start_paused: false,
            ..CacheConfig::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let backend = Arc::new(RecordingBackend::default());
        let bridge = Arc::new(RecordingBridge::default());
        let clock = Arc::new(ManualClock::new(START_MS));
        let (cache, queue) = EntityCache::builder(backend.clone())
            .config(config)
            .bridge(bridge.clone())
            .location_broadcaster(bridge.clone())
            .clock(clock.clone())
            .build();
        Self {
            cache,
            queue,
            backend,
            bridge,
            clock,
        }
    }

    /// Run every notification posted to the foreground so far.
    pub fn pump(&mut self) -> usize {
        self.queue.run_pending()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn ann() -> UserPatch {
    UserPatch::new(UserId(7))
        .first_name("Ann")
        .status(UserStatus::Offline { was_online: 1000 })
}

pub fn user(id: i64, name: &str) -> User {
    User {
        first_name: name.into(),
        ..User::new(UserId(id))
    }
}

pub fn basic_group(id: i64, status: MemberStatus) -> BasicGroup {
    BasicGroup {
        id: BasicGroupId(id),
        member_count: 3,
        status,
        is_active: true,
        upgraded_to_supergroup_id: None,
    }
}

pub fn supergroup(id: i64, username: &str) -> Supergroup {
    Supergroup {
        id: SupergroupId(id),
        username: username.into(),
        member_count: 10,
        status: MemberStatus::Member,
        is_channel: false,
        is_verified: false,
        date: 0,
    }
}

pub fn call(id: i32, state: CallState) -> Call {
    Call {
        id: CallId(id),
        user_id: UserId(7),
        is_outgoing: true,
        is_video: false,
        state,
    }
}

pub fn live_message(chat: i64, id: i64, expires_in: i32) -> Message {
    Message {
        id: MessageId(id),
        chat_id: ChatId(chat),
        is_outgoing: true,
        can_be_edited: true,
        is_sending: false,
        content: MessageContent::Location(LiveLocation {
            location: Location {
                latitude: 52.5,
                longitude: 13.4,
            },
            live_period: 900,
            expires_in,
            heading: 0,
        }),
    }
}
