//! Observer capability traits.
//!
//! An observer implements one or more of these traits and is handed to the
//! [`SubscriptionRegistry`](crate::registry::SubscriptionRegistry) as an
//! `Arc`. The registry only keeps weak references, so dropping the last
//! strong reference is enough to stop receiving callbacks.
//!
//! Every callback runs on the foreground thread. Default bodies are no-ops so
//! observers override only what they render.

use std::sync::Arc;

use beacon_shared::models::{
    BasicGroup, BasicGroupFullInfo, Call, CallSettings, CallState, ChatMember, SecretChat,
    Supergroup, SupergroupFullInfo, User, UserFullInfo, UserStatus,
};
use beacon_shared::types::{BasicGroupId, CallId, ChatId, SupergroupId, UserId};

pub trait UserDataListener: Send + Sync {
    fn on_user_updated(&self, _user: &Arc<User>) {}

    fn on_user_full_updated(&self, _user_id: UserId, _full_info: &Arc<UserFullInfo>) {}
}

pub trait UserStatusListener: Send + Sync {
    /// `ui_only` is set when only the relative label needs re-rendering and
    /// the presence itself did not change.
    fn on_user_status_changed(&self, user_id: UserId, status: UserStatus, ui_only: bool);

    /// Observers returning `true` also receive the periodic label ticks.
    /// Read once, at subscription time.
    fn needs_status_ui_updates(&self) -> bool {
        false
    }
}

pub trait MyUserListener: Send + Sync {
    /// `None` after sign-out.
    fn on_my_user_updated(&self, _user: Option<&Arc<User>>) {}

    fn on_my_user_bio_updated(&self, _bio: Option<&str>) {}
}

pub trait BasicGroupListener: Send + Sync {
    fn on_basic_group_updated(&self, _group: &Arc<BasicGroup>, _migrated_to_supergroup: bool) {}

    fn on_basic_group_full_updated(
        &self,
        _group_id: BasicGroupId,
        _full_info: &Arc<BasicGroupFullInfo>,
    ) {
    }
}

pub trait SupergroupListener: Send + Sync {
    fn on_supergroup_updated(&self, _supergroup: &Arc<Supergroup>) {}

    fn on_supergroup_full_updated(
        &self,
        _supergroup_id: SupergroupId,
        _full_info: &Arc<SupergroupFullInfo>,
    ) {
    }
}

pub trait SecretChatListener: Send + Sync {
    fn on_secret_chat_updated(&self, secret_chat: &Arc<SecretChat>);
}

pub trait CallListener: Send + Sync {
    fn on_call_updated(&self, _call: &Arc<Call>) {}

    /// Local media state. Only `Established` is forwarded.
    fn on_call_state_changed(&self, _call_id: CallId, _state: &CallState) {}

    fn on_call_settings_changed(&self, _call_id: CallId, _settings: &Arc<CallSettings>) {}

    fn on_call_signal_bars_changed(&self, _call_id: CallId, _bars: i32) {}
}

pub trait ChatMemberStatusListener: Send + Sync {
    fn on_chat_member_status_changed(&self, chat_id: ChatId, member: &ChatMember);
}

/// Capability discovery for [`subscribe_to_any_updates`].
///
/// Override the accessor of every trait the observer implements with
/// `Some(self)`; the rest stay `None`.
///
/// [`subscribe_to_any_updates`]: crate::registry::SubscriptionRegistry::subscribe_to_any_updates
pub trait Capabilities: Send + Sync + 'static {
    fn user_data(self: Arc<Self>) -> Option<Arc<dyn UserDataListener>> {
        None
    }

    fn user_status(self: Arc<Self>) -> Option<Arc<dyn UserStatusListener>> {
        None
    }

    fn basic_group(self: Arc<Self>) -> Option<Arc<dyn BasicGroupListener>> {
        None
    }

    fn supergroup(self: Arc<Self>) -> Option<Arc<dyn SupergroupListener>> {
        None
    }

    fn secret_chat(self: Arc<Self>) -> Option<Arc<dyn SecretChatListener>> {
        None
    }

    fn call(self: Arc<Self>) -> Option<Arc<dyn CallListener>> {
        None
    }

    fn chat_member_status(self: Arc<Self>) -> Option<Arc<dyn ChatMemberStatusListener>> {
        None
    }
}
