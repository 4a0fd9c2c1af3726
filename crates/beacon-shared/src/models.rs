//! Entity models mirrored from the backend.
//!
//! Every struct derives `Serialize` and `Deserialize` so backend adapters can
//! hand over values they already decoded. Values are immutable once cached:
//! the store replaces them and reports what changed instead of mutating a
//! shared instance.

use serde::{Deserialize, Deserializer, Serialize};

use crate::types::{BasicGroupId, CallId, ChatId, MessageId, SecretChatId, SupergroupId, UserId};

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user's presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Empty,
    /// Online until `expires` (unix seconds).
    Online { expires: i64 },
    /// Last seen at `was_online` (unix seconds).
    Offline { was_online: i64 },
    Recently,
    LastWeek,
    LastMonth,
}

impl UserStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }

    /// The exact last-seen timestamp, when one is known.
    pub fn was_online(&self) -> Option<i64> {
        match self {
            Self::Offline { was_online } if *was_online != 0 => Some(*was_online),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    #[default]
    Regular,
    Bot,
    Deleted,
    Unknown,
}

/// Reference to a user's avatar files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfilePhoto {
    pub id: i64,
    pub small_file_id: i32,
    pub big_file_id: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    /// Primary username, empty when the user has none.
    pub username: String,
    pub phone_number: String,
    pub profile_photo: Option<ProfilePhoto>,
    pub status: UserStatus,
    pub user_type: UserType,
    pub is_contact: bool,
    pub is_verified: bool,
}

impl User {
    /// A user with only an id and empty profile fields.
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            first_name: String::new(),
            last_name: String::new(),
            username: String::new(),
            phone_number: String::new(),
            profile_photo: None,
            status: UserStatus::Empty,
            user_type: UserType::Regular,
            is_contact: false,
            is_verified: false,
        }
    }

    /// Build the merged value: every field set in `patch` wins, every other
    /// field keeps its current value.
    pub fn merged(&self, patch: &UserPatch) -> Self {
        Self {
            id: self.id,
            first_name: patch.first_name.clone().unwrap_or_else(|| self.first_name.clone()),
            last_name: patch.last_name.clone().unwrap_or_else(|| self.last_name.clone()),
            username: patch.username.clone().unwrap_or_else(|| self.username.clone()),
            phone_number: patch
                .phone_number
                .clone()
                .unwrap_or_else(|| self.phone_number.clone()),
            profile_photo: match &patch.profile_photo {
                Some(photo) => photo.clone(),
                None => self.profile_photo.clone(),
            },
            status: patch.status.unwrap_or(self.status),
            user_type: patch.user_type.unwrap_or(self.user_type),
            is_contact: patch.is_contact.unwrap_or(self.is_contact),
            is_verified: patch.is_verified.unwrap_or(self.is_verified),
        }
    }

    /// True when every field except the presence matches.
    pub fn same_profile(&self, other: &User) -> bool {
        self.id == other.id
            && self.first_name == other.first_name
            && self.last_name == other.last_name
            && self.username == other.username
            && self.phone_number == other.phone_number
            && self.profile_photo == other.profile_photo
            && self.user_type == other.user_type
            && self.is_contact == other.is_contact
            && self.is_verified == other.is_verified
    }

    pub fn display_name(&self) -> String {
        match (self.first_name.is_empty(), self.last_name.is_empty()) {
            (false, false) => format!("{} {}", self.first_name, self.last_name),
            (false, true) => self.first_name.clone(),
            (true, false) => self.last_name.clone(),
            (true, true) => String::new(),
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.user_type == UserType::Deleted
    }

    pub fn is_bot(&self) -> bool {
        self.user_type == UserType::Bot
    }
}

/// A user update as delivered by the backend. Absent fields keep their
/// previously cached value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPatch {
    pub id: UserId,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    /// `Some(None)` clears the avatar. On the wire that is an explicit `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub profile_photo: Option<Option<ProfilePhoto>>,
    #[serde(default)]
    pub status: Option<UserStatus>,
    #[serde(default)]
    pub user_type: Option<UserType>,
    #[serde(default)]
    pub is_contact: Option<bool>,
    #[serde(default)]
    pub is_verified: Option<bool>,
}

/// Maps a field that is present, `null` included, to `Some`. Absent fields
/// never reach this and fall back to `default`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UserPatch {
    pub fn new(id: UserId) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn first_name(mut self, value: impl Into<String>) -> Self {
        self.first_name = Some(value.into());
        self
    }

    pub fn last_name(mut self, value: impl Into<String>) -> Self {
        self.last_name = Some(value.into());
        self
    }

    pub fn username(mut self, value: impl Into<String>) -> Self {
        self.username = Some(value.into());
        self
    }

    pub fn status(mut self, status: UserStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn user_type(mut self, user_type: UserType) -> Self {
        self.user_type = Some(user_type);
        self
    }
}

impl From<User> for UserPatch {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            first_name: Some(user.first_name),
            last_name: Some(user.last_name),
            username: Some(user.username),
            phone_number: Some(user.phone_number),
            profile_photo: Some(user.profile_photo),
            status: Some(user.status),
            user_type: Some(user.user_type),
            is_contact: Some(user.is_contact),
            is_verified: Some(user.is_verified),
        }
    }
}

/// Rarely needed user fields, fetched on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFullInfo {
    pub bio: Option<String>,
    pub group_in_common_count: i32,
    pub is_blocked: bool,
    pub can_be_called: bool,
}

// ---------------------------------------------------------------------------
// Membership
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Creator,
    Administrator,
    #[default]
    Member,
    Restricted,
    Left,
    Banned,
}

impl MemberStatus {
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            Self::Creator | Self::Administrator | Self::Member | Self::Restricted
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMember {
    pub user_id: UserId,
    pub status: MemberStatus,
}

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicGroup {
    pub id: BasicGroupId,
    pub member_count: i32,
    /// The self user's membership.
    pub status: MemberStatus,
    pub is_active: bool,
    pub upgraded_to_supergroup_id: Option<SupergroupId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicGroupFullInfo {
    pub description: String,
    pub creator_user_id: Option<UserId>,
    pub members: Vec<ChatMember>,
    pub invite_link: Option<String>,
}

/// A supergroup or a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supergroup {
    pub id: SupergroupId,
    pub username: String,
    pub member_count: i32,
    /// The self user's membership.
    pub status: MemberStatus,
    pub is_channel: bool,
    pub is_verified: bool,
    pub date: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupergroupFullInfo {
    pub description: String,
    pub member_count: i32,
    pub administrator_count: i32,
    pub banned_count: i32,
    pub linked_chat_id: Option<ChatId>,
    pub invite_link: Option<String>,
}

// ---------------------------------------------------------------------------
// Encrypted sessions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretChatState {
    Pending,
    Ready,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretChat {
    pub id: SecretChatId,
    pub user_id: UserId,
    pub state: SecretChatState,
    pub is_outbound: bool,
}

// ---------------------------------------------------------------------------
// Calls
// ---------------------------------------------------------------------------

/// Call lifecycle. `Discarded` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallState {
    Pending,
    Ringing,
    Establishing,
    Established,
    Discarded { reason: String },
    Failed { error: String },
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Discarded { .. } | Self::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub id: CallId,
    pub user_id: UserId,
    pub is_outgoing: bool,
    pub is_video: bool,
    pub state: CallState,
}

impl Call {
    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

/// Local-only call preferences. Never sent by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSettings {
    pub speaker_on: bool,
    pub mic_muted: bool,
    pub video_enabled: bool,
}

// ---------------------------------------------------------------------------
// Messages (live locations only)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

/// Location message content. `live_period == 0` marks a static location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveLocation {
    pub location: Location,
    /// Total sharing period in seconds.
    pub live_period: i32,
    /// Seconds left before the share expires.
    pub expires_in: i32,
    pub heading: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Location(LiveLocation),
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub is_outgoing: bool,
    pub can_be_edited: bool,
    /// Still being sent.
    pub is_sending: bool,
    pub content: MessageContent,
}
