//! Domain maps and the outcome types returned by `apply_*` operations.
//!
//! Each domain (users, basic groups, supergroups, secret chats, calls) has
//! its own [`parking_lot::Mutex`]. No operation in this crate ever holds two
//! domain locks at once, and none of them invokes caller code while a lock is
//! held except the explicit `*_with` hooks documented on the user domain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use beacon_shared::models::{
    BasicGroup, BasicGroupFullInfo, Call, CallSettings, SecretChat, Supergroup,
    SupergroupFullInfo, User, UserFullInfo,
};
use beacon_shared::types::{
    BasicGroupId, CallId, EntityKind, SecretChatId, SupergroupId, UserId,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How an update to a replace-wholesale entity affected the cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Identical to the cached value.
    Unchanged,
    /// First value seen for this id.
    Inserted,
    /// Something changed that only needs a re-render.
    Cosmetic,
    /// The entity's identity changed (upgrade, username, broadcast flag).
    Important,
}

/// Result of applying a group or supergroup value.
#[derive(Debug, Clone)]
pub struct EntityChange<T> {
    pub old: Option<Arc<T>>,
    pub new: Arc<T>,
    pub mode: UpdateMode,
    /// The self user's membership differs from the previously cached one.
    pub membership_changed: bool,
}

impl<T> EntityChange<T> {
    pub fn changed(&self) -> bool {
        self.mode != UpdateMode::Unchanged
    }

    pub fn is_important(&self) -> bool {
        self.mode == UpdateMode::Important
    }
}

/// Result of an unconditional replace (full infos, secret chats).
#[derive(Debug, Clone)]
pub struct Replaced<T> {
    pub old: Option<Arc<T>>,
    pub new: Arc<T>,
}

// ---------------------------------------------------------------------------
// Domains
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct UserDomain {
    pub(crate) users: HashMap<UserId, Arc<User>>,
    pub(crate) full: HashMap<UserId, Arc<UserFullInfo>>,
    pub(crate) my_user_id: Option<UserId>,
}

#[derive(Default)]
pub(crate) struct BasicGroupDomain {
    pub(crate) groups: HashMap<BasicGroupId, Arc<BasicGroup>>,
    pub(crate) full: HashMap<BasicGroupId, Arc<BasicGroupFullInfo>>,
}

#[derive(Default)]
pub(crate) struct SupergroupDomain {
    pub(crate) supergroups: HashMap<SupergroupId, Arc<Supergroup>>,
    pub(crate) full: HashMap<SupergroupId, Arc<SupergroupFullInfo>>,
}

pub(crate) struct CallEntry {
    pub(crate) call: Arc<Call>,
    /// Milliseconds since the epoch of the last backend update.
    pub(crate) updated_at: i64,
}

#[derive(Default)]
pub(crate) struct CallDomain {
    pub(crate) calls: HashMap<CallId, CallEntry>,
    pub(crate) settings: HashMap<CallId, Arc<CallSettings>>,
    /// Calls currently counted as active.
    pub(crate) active: HashSet<CallId>,
    /// Calls that have ever been counted. A call is counted at most once.
    pub(crate) ever_active: HashSet<CallId>,
}

/// The single in-memory copy of every mirrored entity.
#[derive(Default)]
pub struct EntityStore {
    pub(crate) users: Mutex<UserDomain>,
    pub(crate) basic_groups: Mutex<BasicGroupDomain>,
    pub(crate) supergroups: Mutex<SupergroupDomain>,
    pub(crate) secret_chats: Mutex<HashMap<SecretChatId, Arc<SecretChat>>>,
    pub(crate) calls: Mutex<CallDomain>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty every domain, one lock at a time.
    ///
    /// Returns the number of calls that were still counted as active, so the
    /// caller can release whatever it was holding for them.
    pub fn clear(&self) -> usize {
        {
            let mut users = self.users.lock();
            users.users.clear();
            users.full.clear();
            users.my_user_id = None;
        }
        {
            let mut groups = self.basic_groups.lock();
            groups.groups.clear();
            groups.full.clear();
        }
        {
            let mut supergroups = self.supergroups.lock();
            supergroups.supergroups.clear();
            supergroups.full.clear();
        }
        self.secret_chats.lock().clear();

        let released = {
            let mut calls = self.calls.lock();
            let released = calls.active.len();
            *calls = CallDomain::default();
            released
        };

        debug!(released_calls = released, "entity store cleared");
        released
    }
}

/// Log a lookup miss for an id the caller expected to be cached.
///
/// Only reported in debug builds; release builds stay silent.
pub(crate) fn report_missing(kind: EntityKind, id: i64) {
    if cfg!(debug_assertions) {
        warn!(%kind, id, "expected entity is missing from the cache");
    }
}
