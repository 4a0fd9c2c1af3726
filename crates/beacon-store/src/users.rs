//! User domain: profiles, presence, extended profiles and the self user.

use std::sync::Arc;

use beacon_shared::models::{User, UserFullInfo, UserPatch, UserStatus};
use beacon_shared::types::{EntityKind, UserId};

use crate::error::{Result, StoreError};
use crate::store::{report_missing, EntityStore, Replaced};

/// Result of merging a user update into the cache.
#[derive(Debug, Clone)]
pub struct UserChange {
    /// Value cached before the merge, `None` on first sight.
    pub old: Option<Arc<User>>,
    pub new: Arc<User>,
    /// Some field other than the presence changed (always true on insert).
    pub profile_changed: bool,
    /// The presence changed as part of this update.
    pub status_changed: bool,
}

impl UserChange {
    pub fn changed(&self) -> bool {
        self.profile_changed || self.status_changed
    }

    pub fn is_insert(&self) -> bool {
        self.old.is_none()
    }
}

/// Result of a presence-only update.
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub user: Arc<User>,
    pub previous: UserStatus,
}

impl StatusChange {
    pub fn changed(&self) -> bool {
        self.previous != self.user.status
    }
}

/// Outcome of switching the signed-in account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MyUserSwitch {
    Unchanged,
    /// Signed out.
    Cleared,
    /// Signed in and the profile is already cached.
    Known(Arc<User>),
    /// Signed in but the profile still has to be fetched.
    Unknown(UserId),
}

impl EntityStore {
    // ------------------------------------------------------------------
    // Write
    // ------------------------------------------------------------------

    /// Merge a partial user update. Fields absent from `patch` keep their
    /// cached value.
    pub fn apply_user(&self, patch: &UserPatch) -> Result<UserChange> {
        self.apply_user_with(patch, |_| ()).map(|(change, ())| change)
    }

    /// Merge a partial user update and run `then` before the users lock is
    /// released.
    ///
    /// `then` may take the presence lock. It must not call back into the
    /// store.
    pub fn apply_user_with<R>(
        &self,
        patch: &UserPatch,
        then: impl FnOnce(&UserChange) -> R,
    ) -> Result<(UserChange, R)> {
        if !patch.id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::User,
            });
        }

        let mut domain = self.users.lock();
        let change = match domain.users.get(&patch.id).cloned() {
            Some(old) => {
                let merged = old.merged(patch);
                let profile_changed = !old.same_profile(&merged);
                let status_changed = old.status != merged.status;
                let new = if profile_changed || status_changed {
                    let new = Arc::new(merged);
                    domain.users.insert(patch.id, Arc::clone(&new));
                    new
                } else {
                    Arc::clone(&old)
                };
                UserChange {
                    old: Some(old),
                    new,
                    profile_changed,
                    status_changed,
                }
            }
            None => {
                let new = Arc::new(User::new(patch.id).merged(patch));
                domain.users.insert(patch.id, Arc::clone(&new));
                UserChange {
                    old: None,
                    new,
                    profile_changed: true,
                    status_changed: false,
                }
            }
        };
        let result = then(&change);
        Ok((change, result))
    }

    /// Cache a complete user value, e.g. one returned by a request.
    pub fn put_user(&self, user: User) -> Result<UserChange> {
        self.apply_user(&UserPatch::from(user))
    }

    /// Replace the presence of a cached user.
    ///
    /// Returns `None` when the user is unknown; presence for users that were
    /// never announced is dropped.
    pub fn set_user_status(&self, user_id: UserId, status: UserStatus) -> Option<StatusChange> {
        self.set_user_status_with(user_id, status, |_| ())
            .map(|(change, ())| change)
    }

    /// Like [`set_user_status`](Self::set_user_status), running `then` under
    /// the users lock.
    pub fn set_user_status_with<R>(
        &self,
        user_id: UserId,
        status: UserStatus,
        then: impl FnOnce(&StatusChange) -> R,
    ) -> Option<(StatusChange, R)> {
        let mut domain = self.users.lock();
        let old = domain.users.get(&user_id).cloned()?;
        let change = if old.status == status {
            StatusChange {
                previous: old.status,
                user: old,
            }
        } else {
            let new = Arc::new(User {
                status,
                ..(*old).clone()
            });
            domain.users.insert(user_id, Arc::clone(&new));
            StatusChange {
                previous: old.status,
                user: new,
            }
        };
        let result = then(&change);
        Some((change, result))
    }

    /// Replace the extended profile. Always reported as changed.
    pub fn apply_user_full(
        &self,
        user_id: UserId,
        full_info: UserFullInfo,
    ) -> Result<Replaced<UserFullInfo>> {
        if !user_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::UserFullInfo,
            });
        }
        let new = Arc::new(full_info);
        let old = self.users.lock().full.insert(user_id, Arc::clone(&new));
        Ok(Replaced { old, new })
    }

    /// Switch the signed-in account. `None` or a zero id signs out.
    pub fn set_my_user_id(&self, user_id: Option<UserId>) -> MyUserSwitch {
        let user_id = user_id.filter(UserId::is_valid);
        let mut domain = self.users.lock();
        if domain.my_user_id == user_id {
            return MyUserSwitch::Unchanged;
        }
        domain.my_user_id = user_id;
        match user_id {
            None => MyUserSwitch::Cleared,
            Some(id) => match domain.users.get(&id) {
                Some(user) => MyUserSwitch::Known(Arc::clone(user)),
                None => MyUserSwitch::Unknown(id),
            },
        }
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn user(&self, user_id: UserId) -> Option<Arc<User>> {
        self.users.lock().users.get(&user_id).cloned()
    }

    /// Run `f` on the cached user while the users lock is held.
    ///
    /// `f` may take the presence lock. It must not call back into the store.
    pub fn with_user<R>(&self, user_id: UserId, f: impl FnOnce(&Arc<User>) -> R) -> Option<R> {
        self.users.lock().users.get(&user_id).map(f)
    }

    /// Lookup for ids the caller knows must already be cached. A miss is
    /// reported as a consistency problem in debug builds.
    pub fn user_expected(&self, user_id: UserId) -> Option<Arc<User>> {
        if !user_id.is_valid() {
            report_missing(EntityKind::User, 0);
            return None;
        }
        let user = self.user(user_id);
        if user.is_none() {
            report_missing(EntityKind::User, user_id.0);
        }
        user
    }

    pub fn user_strict(&self, user_id: UserId) -> Result<Arc<User>> {
        if !user_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::User,
            });
        }
        self.user(user_id).ok_or(StoreError::NotFound {
            kind: EntityKind::User,
            id: user_id.0,
        })
    }

    /// Every cached user among `ids`, in order. Zero ids are skipped, missing
    /// ones are reported.
    pub fn users(&self, ids: &[UserId]) -> Vec<Arc<User>> {
        let domain = self.users.lock();
        ids.iter()
            .filter(|id| id.is_valid())
            .filter_map(|id| {
                let user = domain.users.get(id).cloned();
                if user.is_none() {
                    report_missing(EntityKind::User, id.0);
                }
                user
            })
            .collect()
    }

    pub fn has_user(&self, user_id: UserId) -> bool {
        self.users.lock().users.contains_key(&user_id)
    }

    /// First cached user whose username matches, ignoring ASCII case.
    pub fn search_user(&self, username: &str) -> Option<Arc<User>> {
        let username = username.trim_start_matches('@');
        if username.is_empty() {
            return None;
        }
        self.users
            .lock()
            .users
            .values()
            .find(|user| user.username.eq_ignore_ascii_case(username))
            .cloned()
    }

    /// True when an exact "last seen" timestamp is known for the user.
    pub fn user_last_seen_available(&self, user_id: UserId) -> bool {
        self.user(user_id)
            .is_some_and(|user| user.status.was_online().is_some())
    }

    /// The self user is always online.
    pub fn is_online(&self, user_id: UserId) -> bool {
        if !user_id.is_valid() {
            return false;
        }
        let domain = self.users.lock();
        if domain.my_user_id == Some(user_id) {
            return true;
        }
        domain
            .users
            .get(&user_id)
            .is_some_and(|user| user.status.is_online())
    }

    pub fn user_full(&self, user_id: UserId) -> Option<Arc<UserFullInfo>> {
        self.users.lock().full.get(&user_id).cloned()
    }

    pub fn my_user_id(&self) -> Option<UserId> {
        self.users.lock().my_user_id
    }

    pub fn is_me(&self, user_id: UserId) -> bool {
        self.my_user_id() == Some(user_id)
    }

    pub fn my_user(&self) -> Option<Arc<User>> {
        let domain = self.users.lock();
        let id = domain.my_user_id?;
        domain.users.get(&id).cloned()
    }
}
