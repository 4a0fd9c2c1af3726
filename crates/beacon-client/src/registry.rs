//! Weak listener tables and the typed subscription API.
//!
//! Each entity kind has one [`ListenerMap`] holding both global and keyed
//! subscriptions: [`Scope::Global`] is simply another key, so a fan-out is
//! always two lookups. Slots are `Weak` references; a dropped observer is
//! pruned the next time its key is dispatched to.
//!
//! Dispatch never runs a callback while a table lock is held. Listeners are
//! upgraded into a snapshot first, so a callback may subscribe or
//! unsubscribe anything, itself included, without disturbing the fan-out in
//! progress.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use beacon_shared::models::{
    BasicGroup, BasicGroupFullInfo, Call, CallSettings, CallState, ChatMember, SecretChat,
    Supergroup, SupergroupFullInfo, User, UserFullInfo, UserStatus,
};
use beacon_shared::types::{
    BasicGroupId, CallId, ChatId, EntityKind, SecretChatId, SupergroupId, UserId,
};
use parking_lot::Mutex;
use tracing::{debug, error};

use crate::error::{CacheError, Result};
use crate::events::{
    BasicGroupListener, CallListener, Capabilities, ChatMemberStatusListener, MyUserListener,
    SecretChatListener, SupergroupListener, UserDataListener, UserStatusListener,
};

// ---------------------------------------------------------------------------
// Scope
// ---------------------------------------------------------------------------

/// Subscription scope: every entity of a kind, or one id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope<K> {
    Global,
    Keyed(K),
}

/// Identifier types usable as a subscription key.
pub trait ScopeKey: Copy + Eq + Hash {
    const KIND: EntityKind;

    fn is_valid_key(&self) -> bool;
}

macro_rules! scope_key {
    ($($id:ty => $kind:ident),* $(,)?) => {
        $(
            impl ScopeKey for $id {
                const KIND: EntityKind = EntityKind::$kind;

                fn is_valid_key(&self) -> bool {
                    self.is_valid()
                }
            }
        )*
    };
}

scope_key!(
    UserId => User,
    BasicGroupId => BasicGroup,
    SupergroupId => Supergroup,
    SecretChatId => SecretChat,
    CallId => Call,
    ChatId => Chat,
);

fn checked<K: ScopeKey>(scope: Scope<K>) -> Result<Scope<K>> {
    match scope {
        Scope::Keyed(key) if !key.is_valid_key() => Err(CacheError::InvalidId { kind: K::KIND }),
        scope => Ok(scope),
    }
}

// ---------------------------------------------------------------------------
// ListenerMap
// ---------------------------------------------------------------------------

type OccupancyHook = Box<dyn Fn(bool) + Send + Sync>;

/// Multimap from scope to weakly held listeners.
pub struct ListenerMap<K, L: ?Sized> {
    slots: Mutex<HashMap<Scope<K>, Vec<Weak<L>>>>,
    on_occupancy: Option<OccupancyHook>,
}

fn same_listener<L: ?Sized>(slot: &Weak<L>, listener: &Arc<L>) -> bool {
    slot.as_ptr().cast::<()>() == Arc::as_ptr(listener).cast::<()>()
}

fn slot_count<K, L: ?Sized>(slots: &HashMap<Scope<K>, Vec<Weak<L>>>) -> usize {
    slots.values().map(Vec::len).sum()
}

fn occupancy_change(before: usize, after: usize) -> Option<bool> {
    ((before == 0) != (after == 0)).then_some(after > 0)
}

impl<K, L> ListenerMap<K, L>
where
    K: Copy + Eq + Hash,
    L: ?Sized,
{
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            on_occupancy: None,
        }
    }

    /// A map that calls `hook(true)` when its first slot is added and
    /// `hook(false)` when its last slot goes away.
    pub fn with_occupancy_hook(hook: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            on_occupancy: Some(Box::new(hook)),
        }
    }

    /// Returns `false` if the listener was already registered under `scope`.
    pub fn add(&self, scope: Scope<K>, listener: &Arc<L>) -> bool {
        let mut slots = self.slots.lock();
        let before = slot_count(&slots);
        let list = slots.entry(scope).or_default();
        if list.iter().any(|slot| same_listener(slot, listener)) {
            return false;
        }
        list.push(Arc::downgrade(listener));
        self.report(occupancy_change(before, before + 1));
        true
    }

    /// Safe to call for listeners that are not registered, and from inside
    /// a callback.
    pub fn remove(&self, scope: Scope<K>, listener: &Arc<L>) -> bool {
        let mut slots = self.slots.lock();
        let before = slot_count(&slots);
        let mut removed = false;
        if let Some(list) = slots.get_mut(&scope) {
            let len = list.len();
            list.retain(|slot| !same_listener(slot, listener) && slot.strong_count() > 0);
            removed = list.len() < len;
            if list.is_empty() {
                slots.remove(&scope);
            }
        }
        self.report(occupancy_change(before, slot_count(&slots)));
        removed
    }

    /// Live listeners registered under `scope`, in subscription order.
    /// Dead slots found on the way are dropped.
    pub fn snapshot(&self, scope: Scope<K>) -> Vec<Arc<L>> {
        let mut slots = self.slots.lock();
        let before = slot_count(&slots);
        let Some(list) = slots.get_mut(&scope) else {
            return Vec::new();
        };
        let mut listeners = Vec::with_capacity(list.len());
        list.retain(|slot| match slot.upgrade() {
            Some(listener) => {
                listeners.push(listener);
                true
            }
            None => false,
        });
        if list.is_empty() {
            slots.remove(&scope);
        }
        self.report(occupancy_change(before, slot_count(&slots)));
        listeners
    }

    /// Registered slots under `scope`, dead ones included.
    pub fn len(&self, scope: Scope<K>) -> usize {
        self.slots.lock().get(&scope).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.lock().is_empty()
    }

    /// Invoke `f` for every live listener under `scope`.
    pub fn notify(&self, scope: Scope<K>, callback: &'static str, f: impl Fn(&L)) {
        notify_each(&self.snapshot(scope), callback, f);
    }

    /// Global listeners first, then those keyed by `key`.
    pub fn notify_global_and_keyed(&self, key: K, callback: &'static str, f: impl Fn(&L)) {
        self.notify(Scope::Global, callback, &f);
        self.notify(Scope::Keyed(key), callback, &f);
    }

    /// Called with the slots lock held, so transitions reach the hook in the
    /// order they happened. The hook must not call back into this map.
    fn report(&self, change: Option<bool>) {
        if let (Some(occupied), Some(hook)) = (change, &self.on_occupancy) {
            hook(occupied);
        }
    }
}

impl<K, L> Default for ListenerMap<K, L>
where
    K: Copy + Eq + Hash,
    L: ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f` for each listener, isolating panics so one faulty observer does
/// not starve the rest of the fan-out.
pub(crate) fn notify_each<L: ?Sized>(listeners: &[Arc<L>], callback: &'static str, f: impl Fn(&L)) {
    for listener in listeners {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| f(&**listener))) {
            error!(callback, reason = panic_reason(&*payload), "listener panicked");
        }
    }
}

fn panic_reason(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown")
}

// ---------------------------------------------------------------------------
// SubscriptionRegistry
// ---------------------------------------------------------------------------

/// Every listener table of the cache.
///
/// Presence observers are split in two classes: those that asked for label
/// ticks (`needs_status_ui_updates`) and those that only care about real
/// transitions. Whether the tick table is occupied is forwarded to the
/// presence scheduler through the hook given to [`SubscriptionRegistry::new`].
pub struct SubscriptionRegistry {
    user_data: ListenerMap<UserId, dyn UserDataListener>,
    user_status: ListenerMap<UserId, dyn UserStatusListener>,
    user_status_ticks: ListenerMap<UserId, dyn UserStatusListener>,
    my_user: ListenerMap<(), dyn MyUserListener>,
    basic_groups: ListenerMap<BasicGroupId, dyn BasicGroupListener>,
    supergroups: ListenerMap<SupergroupId, dyn SupergroupListener>,
    secret_chats: ListenerMap<SecretChatId, dyn SecretChatListener>,
    calls: ListenerMap<CallId, dyn CallListener>,
    chat_members: ListenerMap<ChatId, dyn ChatMemberStatusListener>,
}

impl SubscriptionRegistry {
    pub fn new(on_status_ticks_needed: impl Fn(bool) + Send + Sync + 'static) -> Self {
        Self {
            user_data: ListenerMap::new(),
            user_status: ListenerMap::new(),
            user_status_ticks: ListenerMap::with_occupancy_hook(move |needed| {
                debug!(needed, "status tick listeners changed");
                on_status_ticks_needed(needed)
            }),
            my_user: ListenerMap::new(),
            basic_groups: ListenerMap::new(),
            supergroups: ListenerMap::new(),
            secret_chats: ListenerMap::new(),
            calls: ListenerMap::new(),
            chat_members: ListenerMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub fn add_user_data_listener(
        &self,
        scope: Scope<UserId>,
        listener: &Arc<dyn UserDataListener>,
    ) -> Result<bool> {
        Ok(self.user_data.add(checked(scope)?, listener))
    }

    pub fn remove_user_data_listener(
        &self,
        scope: Scope<UserId>,
        listener: &Arc<dyn UserDataListener>,
    ) -> bool {
        self.user_data.remove(scope, listener)
    }

    pub fn add_user_status_listener(
        &self,
        scope: Scope<UserId>,
        listener: &Arc<dyn UserStatusListener>,
    ) -> Result<bool> {
        let scope = checked(scope)?;
        let table = if listener.needs_status_ui_updates() {
            &self.user_status_ticks
        } else {
            &self.user_status
        };
        Ok(table.add(scope, listener))
    }

    pub fn remove_user_status_listener(
        &self,
        scope: Scope<UserId>,
        listener: &Arc<dyn UserStatusListener>,
    ) -> bool {
        let ticks = self.user_status_ticks.remove(scope, listener);
        let plain = self.user_status.remove(scope, listener);
        ticks || plain
    }

    /// Register an observer of both data and presence of one user.
    pub fn subscribe_to_user_updates<T>(&self, user_id: UserId, listener: &Arc<T>) -> Result<()>
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        self.add_composite(Scope::Keyed(user_id), listener)
    }

    pub fn unsubscribe_from_user_updates<T>(&self, user_id: UserId, listener: &Arc<T>)
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        self.remove_composite(Scope::Keyed(user_id), listener);
    }

    /// Subscribe to several users at once. Nothing is registered if any id
    /// is invalid.
    pub fn subscribe_to_users_updates<T>(&self, user_ids: &[UserId], listener: &Arc<T>) -> Result<()>
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        if user_ids.iter().any(|id| !id.is_valid()) {
            return Err(CacheError::InvalidId {
                kind: EntityKind::User,
            });
        }
        for user_id in user_ids {
            self.add_composite(Scope::Keyed(*user_id), listener)?;
        }
        Ok(())
    }

    pub fn unsubscribe_from_users_updates<T>(&self, user_ids: &[UserId], listener: &Arc<T>)
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        for user_id in user_ids {
            self.remove_composite(Scope::Keyed(*user_id), listener);
        }
    }

    pub fn add_global_users_listener<T>(&self, listener: &Arc<T>)
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        // Global scope never fails validation.
        let _ = self.add_composite(Scope::Global, listener);
    }

    pub fn remove_global_users_listener<T>(&self, listener: &Arc<T>)
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        self.remove_composite(Scope::Global, listener);
    }

    fn add_composite<T>(&self, scope: Scope<UserId>, listener: &Arc<T>) -> Result<()>
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        let data: Arc<dyn UserDataListener> = Arc::clone(listener) as Arc<dyn UserDataListener>;
        let status: Arc<dyn UserStatusListener> =
            Arc::clone(listener) as Arc<dyn UserStatusListener>;
        self.add_user_data_listener(scope, &data)?;
        self.add_user_status_listener(scope, &status)?;
        Ok(())
    }

    fn remove_composite<T>(&self, scope: Scope<UserId>, listener: &Arc<T>)
    where
        T: UserDataListener + UserStatusListener + 'static,
    {
        let data: Arc<dyn UserDataListener> = Arc::clone(listener) as Arc<dyn UserDataListener>;
        let status: Arc<dyn UserStatusListener> =
            Arc::clone(listener) as Arc<dyn UserStatusListener>;
        self.remove_user_data_listener(scope, &data);
        self.remove_user_status_listener(scope, &status);
    }

    pub fn add_my_user_listener(&self, listener: &Arc<dyn MyUserListener>) -> bool {
        self.my_user.add(Scope::Global, listener)
    }

    pub fn remove_my_user_listener(&self, listener: &Arc<dyn MyUserListener>) -> bool {
        self.my_user.remove(Scope::Global, listener)
    }

    /// True while at least one observer wants label ticks.
    pub fn has_status_tick_listeners(&self) -> bool {
        !self.user_status_ticks.is_empty()
    }

    // ------------------------------------------------------------------
    // Groups, supergroups, secret chats
    // ------------------------------------------------------------------

    pub fn subscribe_to_basic_group_updates(
        &self,
        scope: Scope<BasicGroupId>,
        listener: &Arc<dyn BasicGroupListener>,
    ) -> Result<bool> {
        Ok(self.basic_groups.add(checked(scope)?, listener))
    }

    pub fn unsubscribe_from_basic_group_updates(
        &self,
        scope: Scope<BasicGroupId>,
        listener: &Arc<dyn BasicGroupListener>,
    ) -> bool {
        self.basic_groups.remove(scope, listener)
    }

    pub fn subscribe_to_supergroup_updates(
        &self,
        scope: Scope<SupergroupId>,
        listener: &Arc<dyn SupergroupListener>,
    ) -> Result<bool> {
        Ok(self.supergroups.add(checked(scope)?, listener))
    }

    pub fn unsubscribe_from_supergroup_updates(
        &self,
        scope: Scope<SupergroupId>,
        listener: &Arc<dyn SupergroupListener>,
    ) -> bool {
        self.supergroups.remove(scope, listener)
    }

    pub fn subscribe_to_secret_chat_updates(
        &self,
        scope: Scope<SecretChatId>,
        listener: &Arc<dyn SecretChatListener>,
    ) -> Result<bool> {
        Ok(self.secret_chats.add(checked(scope)?, listener))
    }

    pub fn unsubscribe_from_secret_chat_updates(
        &self,
        scope: Scope<SecretChatId>,
        listener: &Arc<dyn SecretChatListener>,
    ) -> bool {
        self.secret_chats.remove(scope, listener)
    }

    // ------------------------------------------------------------------
    // Calls and membership
    // ------------------------------------------------------------------

    pub fn subscribe_to_call_updates(
        &self,
        scope: Scope<CallId>,
        listener: &Arc<dyn CallListener>,
    ) -> Result<bool> {
        Ok(self.calls.add(checked(scope)?, listener))
    }

    pub fn unsubscribe_from_call_updates(
        &self,
        scope: Scope<CallId>,
        listener: &Arc<dyn CallListener>,
    ) -> bool {
        self.calls.remove(scope, listener)
    }

    pub fn subscribe_to_chat_member_status(
        &self,
        scope: Scope<ChatId>,
        listener: &Arc<dyn ChatMemberStatusListener>,
    ) -> Result<bool> {
        Ok(self.chat_members.add(checked(scope)?, listener))
    }

    pub fn unsubscribe_from_chat_member_status(
        &self,
        scope: Scope<ChatId>,
        listener: &Arc<dyn ChatMemberStatusListener>,
    ) -> bool {
        self.chat_members.remove(scope, listener)
    }

    // ------------------------------------------------------------------
    // Any
    // ------------------------------------------------------------------

    /// Register `listener` globally in every table it has a capability for.
    pub fn subscribe_to_any_updates<T: Capabilities>(&self, listener: &Arc<T>) {
        // Global scopes never fail validation.
        if let Some(l) = Arc::clone(listener).user_data() {
            let _ = self.add_user_data_listener(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).user_status() {
            let _ = self.add_user_status_listener(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).basic_group() {
            self.basic_groups.add(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).supergroup() {
            self.supergroups.add(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).secret_chat() {
            self.secret_chats.add(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).call() {
            self.calls.add(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).chat_member_status() {
            self.chat_members.add(Scope::Global, &l);
        }
    }

    pub fn unsubscribe_from_any_updates<T: Capabilities>(&self, listener: &Arc<T>) {
        if let Some(l) = Arc::clone(listener).user_data() {
            self.user_data.remove(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).user_status() {
            self.remove_user_status_listener(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).basic_group() {
            self.basic_groups.remove(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).supergroup() {
            self.supergroups.remove(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).secret_chat() {
            self.secret_chats.remove(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).call() {
            self.calls.remove(Scope::Global, &l);
        }
        if let Some(l) = Arc::clone(listener).chat_member_status() {
            self.chat_members.remove(Scope::Global, &l);
        }
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    pub(crate) fn notify_user(&self, user: &Arc<User>) {
        self.user_data
            .notify_global_and_keyed(user.id, "on_user_updated", |l| l.on_user_updated(user));
    }

    pub(crate) fn notify_user_full(&self, user_id: UserId, full_info: &Arc<UserFullInfo>) {
        self.user_data
            .notify_global_and_keyed(user_id, "on_user_full_updated", |l| {
                l.on_user_full_updated(user_id, full_info)
            });
    }

    /// Label ticks (`ui_only`) reach only tick listeners; real transitions
    /// reach both classes.
    pub(crate) fn notify_user_status(&self, user_id: UserId, status: UserStatus, ui_only: bool) {
        self.user_status_ticks
            .notify_global_and_keyed(user_id, "on_user_status_changed", |l| {
                l.on_user_status_changed(user_id, status, ui_only)
            });
        if !ui_only {
            self.user_status
                .notify_global_and_keyed(user_id, "on_user_status_changed", |l| {
                    l.on_user_status_changed(user_id, status, ui_only)
                });
        }
    }

    pub(crate) fn notify_my_user(&self, user: Option<&Arc<User>>) {
        self.my_user
            .notify(Scope::Global, "on_my_user_updated", |l| l.on_my_user_updated(user));
    }

    pub(crate) fn notify_my_user_bio(&self, bio: Option<&str>) {
        self.my_user
            .notify(Scope::Global, "on_my_user_bio_updated", |l| l.on_my_user_bio_updated(bio));
    }

    pub(crate) fn notify_basic_group(&self, group: &Arc<BasicGroup>, migrated: bool) {
        self.basic_groups
            .notify_global_and_keyed(group.id, "on_basic_group_updated", |l| {
                l.on_basic_group_updated(group, migrated)
            });
    }

    pub(crate) fn notify_basic_group_full(
        &self,
        group_id: BasicGroupId,
        full_info: &Arc<BasicGroupFullInfo>,
    ) {
        self.basic_groups
            .notify_global_and_keyed(group_id, "on_basic_group_full_updated", |l| {
                l.on_basic_group_full_updated(group_id, full_info)
            });
    }

    pub(crate) fn notify_supergroup(&self, supergroup: &Arc<Supergroup>) {
        self.supergroups
            .notify_global_and_keyed(supergroup.id, "on_supergroup_updated", |l| {
                l.on_supergroup_updated(supergroup)
            });
    }

    pub(crate) fn notify_supergroup_full(
        &self,
        supergroup_id: SupergroupId,
        full_info: &Arc<SupergroupFullInfo>,
    ) {
        self.supergroups
            .notify_global_and_keyed(supergroup_id, "on_supergroup_full_updated", |l| {
                l.on_supergroup_full_updated(supergroup_id, full_info)
            });
    }

    pub(crate) fn notify_secret_chat(&self, secret_chat: &Arc<SecretChat>) {
        self.secret_chats
            .notify_global_and_keyed(secret_chat.id, "on_secret_chat_updated", |l| {
                l.on_secret_chat_updated(secret_chat)
            });
    }

    pub(crate) fn notify_call(&self, call: &Arc<Call>) {
        self.calls
            .notify_global_and_keyed(call.id, "on_call_updated", |l| l.on_call_updated(call));
    }

    pub(crate) fn notify_call_state(&self, call_id: CallId, state: &CallState) {
        self.calls
            .notify_global_and_keyed(call_id, "on_call_state_changed", |l| {
                l.on_call_state_changed(call_id, state)
            });
    }

    pub(crate) fn notify_call_settings(&self, call_id: CallId, settings: &Arc<CallSettings>) {
        self.calls
            .notify_global_and_keyed(call_id, "on_call_settings_changed", |l| {
                l.on_call_settings_changed(call_id, settings)
            });
    }

    pub(crate) fn notify_call_signal_bars(&self, call_id: CallId, bars: i32) {
        self.calls
            .notify_global_and_keyed(call_id, "on_call_signal_bars_changed", |l| {
                l.on_call_signal_bars_changed(call_id, bars)
            });
    }

    pub(crate) fn notify_chat_member_status(&self, chat_id: ChatId, member: &ChatMember) {
        self.chat_members
            .notify_global_and_keyed(chat_id, "on_chat_member_status_changed", |l| {
                l.on_chat_member_status_changed(chat_id, member)
            });
    }
}
