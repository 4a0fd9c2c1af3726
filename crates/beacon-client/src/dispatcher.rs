//! Inbound updates.
//!
//! Each update is applied to the store on the calling thread, under the
//! store's domain lock only. Observer notifications for the resulting change
//! are then posted to the foreground queue. A malformed update is logged and
//! dropped; it never stops the updates behind it.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use beacon_shared::error::ProtocolError;
use beacon_shared::models::{
    BasicGroup, BasicGroupFullInfo, ChatMember, MemberStatus, SecretChat, Supergroup,
    SupergroupFullInfo, UserFullInfo, UserPatch, UserStatus,
};
use beacon_shared::protocol::{Request, Update};
use beacon_shared::types::{BasicGroupId, ChatId, EntityKind, SupergroupId, UserId};
use beacon_store::MyUserSwitch;
use tracing::{debug, info, warn};

use crate::cache::EntityCache;
use crate::error::{CacheError, Result};

impl EntityCache {
    /// Apply one backend update. Never fails: problems are logged.
    pub fn handle_update(&self, update: Update) {
        let name = update.name();
        if let Err(err) = self.dispatch(update) {
            warn!(update = name, error = %err, "dropping malformed update");
        }
    }

    fn dispatch(&self, update: Update) -> Result<()> {
        match update {
            Update::MyUserId { user_id } => self.on_update_my_user_id(user_id),
            Update::User { user } => self.on_user(&user)?,
            Update::UserStatus { user_id, status } => self.on_user_status(user_id, status)?,
            Update::UserFullInfo { user_id, full_info } => {
                self.on_user_full(user_id, full_info)?;
            }
            Update::BasicGroup { basic_group } => self.on_basic_group(basic_group)?,
            Update::BasicGroupFullInfo {
                basic_group_id,
                full_info,
            } => {
                self.on_basic_group_full(basic_group_id, full_info)?;
            }
            Update::Supergroup { supergroup } => self.on_supergroup(supergroup)?,
            Update::SupergroupFullInfo {
                supergroup_id,
                full_info,
            } => {
                self.on_supergroup_full(supergroup_id, full_info)?;
            }
            Update::SecretChat { secret_chat } => self.on_secret_chat(secret_chat)?,
            Update::Call { call } => self.on_call(call)?,
            Update::ChatMember { chat_id, member } => {
                self.on_chat_member_status_changed(chat_id, member)?
            }
            Update::NewMessage { message } => self.on_new_message(&message),
            Update::MessageContent {
                chat_id,
                message_id,
                content,
            } => self.on_message_content(chat_id, message_id, &content),
            Update::DeleteMessages {
                chat_id,
                message_ids,
            } => self.on_delete_messages(chat_id, &message_ids),
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Self user
    // ------------------------------------------------------------------

    /// The signed-in account changed. `None` signs out.
    pub fn on_update_my_user_id(&self, user_id: Option<UserId>) {
        match self.inner.store.set_my_user_id(user_id) {
            MyUserSwitch::Unchanged => {}
            MyUserSwitch::Cleared => {
                info!("signed out");
                self.inner.loading_my_user.store(false, Ordering::SeqCst);
                self.post(|cache| {
                    cache.inner.subscriptions.notify_my_user(None);
                    cache.inner.bridge.on_account_profile_updated(None, false);
                });
            }
            MyUserSwitch::Known(user) => {
                info!(user_id = %user.id, "signed in");
                self.post(move |cache| {
                    cache.inner.subscriptions.notify_my_user(Some(&user));
                    cache.inner.bridge.on_account_profile_updated(Some(&user), true);
                });
            }
            MyUserSwitch::Unknown(user_id) => {
                info!(user_id = %user_id, "signed in, profile not cached");
                if self.inner.loading_my_user.swap(true, Ordering::SeqCst) {
                    return;
                }
                self.send(Request::GetMe, |cache, response| {
                    cache.inner.loading_my_user.store(false, Ordering::SeqCst);
                    cache.absorb_base("get_me", response);
                });
            }
        }
    }

    /// The self user's bio changed without a full-info refresh.
    pub fn on_update_my_user_bio(&self, bio: Option<String>) {
        let Some(user_id) = self.inner.store.my_user_id() else {
            return;
        };
        if let Some(full) = self.inner.store.user_full(user_id) {
            let updated = UserFullInfo {
                bio: bio.clone(),
                ..(*full).clone()
            };
            if let Err(err) = self.inner.store.apply_user_full(user_id, updated) {
                warn!(error = %err, "failed to store bio");
            }
        }
        self.post(move |cache| cache.inner.subscriptions.notify_my_user_bio(bio.as_deref()));
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    fn on_user(&self, patch: &UserPatch) -> Result<()> {
        let presence = &self.inner.presence;
        let (change, ()) = self.inner.store.apply_user_with(patch, |change| {
            presence.observe(change.new.id, &change.new.status, false)
        })?;
        if !change.changed() {
            return Ok(());
        }

        let is_me = self.inner.store.is_me(change.new.id);
        if is_me {
            self.inner.loading_my_user.store(false, Ordering::SeqCst);
        }
        self.post(move |cache| {
            let subscriptions = &cache.inner.subscriptions;
            subscriptions.notify_user(&change.new);
            if is_me {
                subscriptions.notify_my_user(Some(&change.new));
                cache
                    .inner
                    .bridge
                    .on_account_profile_updated(Some(&change.new), change.is_insert());
            }
            if change.status_changed {
                subscriptions.notify_user_status(change.new.id, change.new.status, false);
            }
        });
        Ok(())
    }

    fn on_user_status(&self, user_id: UserId, status: UserStatus) -> Result<()> {
        if !user_id.is_valid() {
            return Err(CacheError::InvalidId {
                kind: EntityKind::User,
            });
        }
        let presence = &self.inner.presence;
        let Some((change, ())) = self
            .inner
            .store
            .set_user_status_with(user_id, status, |change| {
                presence.observe(user_id, &change.user.status, false)
            })
        else {
            return Err(ProtocolError::MissingEntity {
                update: "user_status",
                kind: "user",
                id: user_id.0,
            }
            .into());
        };

        if change.changed() {
            self.post(move |cache| {
                cache
                    .inner
                    .subscriptions
                    .notify_user_status(user_id, status, false)
            });
        }
        Ok(())
    }

    pub(crate) fn apply_user_full(
        &self,
        user_id: UserId,
        full_info: UserFullInfo,
    ) -> Option<Arc<UserFullInfo>> {
        match self.on_user_full(user_id, full_info) {
            Ok(full) => Some(full),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "dropping user full info");
                None
            }
        }
    }

    fn on_user_full(&self, user_id: UserId, full_info: UserFullInfo) -> Result<Arc<UserFullInfo>> {
        let replaced = self.inner.store.apply_user_full(user_id, full_info)?;
        let full = Arc::clone(&replaced.new);
        let is_me = self.inner.store.is_me(user_id);
        self.post(move |cache| {
            let subscriptions = &cache.inner.subscriptions;
            subscriptions.notify_user_full(user_id, &full);
            if is_me {
                subscriptions.notify_my_user_bio(full.bio.as_deref());
            }
        });
        Ok(replaced.new)
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    /// The self user's new membership, when it changed and the self user is
    /// known.
    fn own_membership(&self, changed: bool, status: MemberStatus) -> Option<ChatMember> {
        if !changed {
            return None;
        }
        self.inner
            .store
            .my_user_id()
            .map(|user_id| ChatMember { user_id, status })
    }

    fn on_basic_group(&self, group: BasicGroup) -> Result<()> {
        let change = self.inner.store.apply_basic_group(group)?;
        if !change.changed() {
            return Ok(());
        }
        let chat_id = ChatId::from_basic_group(change.new.id);
        let member = self.own_membership(change.membership_changed, change.new.status);
        if change.is_important() {
            info!(basic_group_id = %change.new.id, "basic group upgraded");
        }
        self.post(move |cache| {
            let inner = &cache.inner;
            inner
                .subscriptions
                .notify_basic_group(&change.new, change.is_important());
            if change.is_important() {
                inner.bridge.on_chat_identity_changed(chat_id);
            }
            if let Some(member) = member {
                inner.subscriptions.notify_chat_member_status(chat_id, &member);
            }
        });
        Ok(())
    }

    pub(crate) fn apply_basic_group_full(
        &self,
        basic_group_id: BasicGroupId,
        full_info: BasicGroupFullInfo,
    ) -> Option<Arc<BasicGroupFullInfo>> {
        match self.on_basic_group_full(basic_group_id, full_info) {
            Ok(full) => Some(full),
            Err(err) => {
                warn!(basic_group_id = %basic_group_id, error = %err, "dropping basic group full info");
                None
            }
        }
    }

    fn on_basic_group_full(
        &self,
        basic_group_id: BasicGroupId,
        full_info: BasicGroupFullInfo,
    ) -> Result<Arc<BasicGroupFullInfo>> {
        let replaced = self
            .inner
            .store
            .apply_basic_group_full(basic_group_id, full_info)?;
        let full = Arc::clone(&replaced.new);
        self.post(move |cache| {
            cache
                .inner
                .subscriptions
                .notify_basic_group_full(basic_group_id, &full)
        });
        Ok(replaced.new)
    }

    fn on_supergroup(&self, supergroup: Supergroup) -> Result<()> {
        let change = self.inner.store.apply_supergroup(supergroup)?;
        if !change.changed() {
            return Ok(());
        }
        let chat_id = ChatId::from_supergroup(change.new.id);
        let member = self.own_membership(change.membership_changed, change.new.status);
        self.post(move |cache| {
            let inner = &cache.inner;
            inner.subscriptions.notify_supergroup(&change.new);
            if change.is_important() {
                inner.bridge.on_chat_identity_changed(chat_id);
            }
            if let Some(member) = member {
                inner.subscriptions.notify_chat_member_status(chat_id, &member);
            }
        });
        Ok(())
    }

    pub(crate) fn apply_supergroup_full(
        &self,
        supergroup_id: SupergroupId,
        full_info: SupergroupFullInfo,
    ) -> Option<Arc<SupergroupFullInfo>> {
        match self.on_supergroup_full(supergroup_id, full_info) {
            Ok(full) => Some(full),
            Err(err) => {
                warn!(supergroup_id = %supergroup_id, error = %err, "dropping supergroup full info");
                None
            }
        }
    }

    fn on_supergroup_full(
        &self,
        supergroup_id: SupergroupId,
        full_info: SupergroupFullInfo,
    ) -> Result<Arc<SupergroupFullInfo>> {
        let replaced = self
            .inner
            .store
            .apply_supergroup_full(supergroup_id, full_info)?;
        let full = Arc::clone(&replaced.new);
        self.post(move |cache| {
            cache
                .inner
                .subscriptions
                .notify_supergroup_full(supergroup_id, &full)
        });
        Ok(replaced.new)
    }

    fn on_secret_chat(&self, secret_chat: SecretChat) -> Result<()> {
        let replaced = self.inner.store.apply_secret_chat(secret_chat)?;
        debug!(secret_chat_id = %replaced.new.id, state = ?replaced.new.state, "secret chat updated");
        self.post(move |cache| cache.inner.subscriptions.notify_secret_chat(&replaced.new));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    /// Forward a membership change in `chat_id`.
    pub fn on_chat_member_status_changed(&self, chat_id: ChatId, member: ChatMember) -> Result<()> {
        if !chat_id.is_valid() {
            return Err(CacheError::InvalidId {
                kind: EntityKind::Chat,
            });
        }
        self.post(move |cache| {
            cache
                .inner
                .subscriptions
                .notify_chat_member_status(chat_id, &member)
        });
        Ok(())
    }
}
