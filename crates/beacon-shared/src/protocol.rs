use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::models::{
    BasicGroup, BasicGroupFullInfo, Call, ChatMember, LiveLocation, Location, Message,
    SecretChat, Supergroup, SupergroupFullInfo, User, UserFullInfo, UserPatch, UserStatus,
};
use crate::types::{BasicGroupId, ChatId, MessageId, SupergroupId, UserId};

/// Entity-change notifications pushed by the backend.
///
/// Ordering is guaranteed per entity, never across entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Update {
    /// The signed-in account changed. `None` on logout.
    MyUserId { user_id: Option<UserId> },
    User { user: UserPatch },
    UserStatus { user_id: UserId, status: UserStatus },
    UserFullInfo { user_id: UserId, full_info: UserFullInfo },
    BasicGroup { basic_group: BasicGroup },
    BasicGroupFullInfo {
        basic_group_id: BasicGroupId,
        full_info: BasicGroupFullInfo,
    },
    Supergroup { supergroup: Supergroup },
    SupergroupFullInfo {
        supergroup_id: SupergroupId,
        full_info: SupergroupFullInfo,
    },
    SecretChat { secret_chat: SecretChat },
    Call { call: Call },
    ChatMember { chat_id: ChatId, member: ChatMember },
    NewMessage { message: Message },
    MessageContent {
        chat_id: ChatId,
        message_id: MessageId,
        content: LiveLocation,
    },
    DeleteMessages {
        chat_id: ChatId,
        message_ids: Vec<MessageId>,
    },
}

impl Update {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::MyUserId { .. } => "my_user_id",
            Self::User { .. } => "user",
            Self::UserStatus { .. } => "user_status",
            Self::UserFullInfo { .. } => "user_full_info",
            Self::BasicGroup { .. } => "basic_group",
            Self::BasicGroupFullInfo { .. } => "basic_group_full_info",
            Self::Supergroup { .. } => "supergroup",
            Self::SupergroupFullInfo { .. } => "supergroup_full_info",
            Self::SecretChat { .. } => "secret_chat",
            Self::Call { .. } => "call",
            Self::ChatMember { .. } => "chat_member",
            Self::NewMessage { .. } => "new_message",
            Self::MessageContent { .. } => "message_content",
            Self::DeleteMessages { .. } => "delete_messages",
        }
    }
}

/// Requests issued toward the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    GetMe,
    GetUser { user_id: UserId },
    GetUserFullInfo { user_id: UserId },
    GetBasicGroup { basic_group_id: BasicGroupId },
    GetBasicGroupFullInfo { basic_group_id: BasicGroupId },
    GetSupergroup { supergroup_id: SupergroupId },
    GetSupergroupFullInfo { supergroup_id: SupergroupId },
    GetActiveLiveLocationMessages,
    /// `location == None` stops the share.
    EditMessageLiveLocation {
        chat_id: ChatId,
        message_id: MessageId,
        location: Option<Location>,
        heading: i32,
    },
}

impl Request {
    /// Short name used in log fields.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetMe => "get_me",
            Self::GetUser { .. } => "get_user",
            Self::GetUserFullInfo { .. } => "get_user_full_info",
            Self::GetBasicGroup { .. } => "get_basic_group",
            Self::GetBasicGroupFullInfo { .. } => "get_basic_group_full_info",
            Self::GetSupergroup { .. } => "get_supergroup",
            Self::GetSupergroupFullInfo { .. } => "get_supergroup_full_info",
            Self::GetActiveLiveLocationMessages => "get_active_live_location_messages",
            Self::EditMessageLiveLocation { .. } => "edit_message_live_location",
        }
    }
}

/// Results of [`Request`]s. Arrive asynchronously on arbitrary threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    User { user: User },
    UserFullInfo { full_info: UserFullInfo },
    BasicGroup { basic_group: BasicGroup },
    BasicGroupFullInfo { full_info: BasicGroupFullInfo },
    Supergroup { supergroup: Supergroup },
    SupergroupFullInfo { full_info: SupergroupFullInfo },
    Messages { messages: Vec<Message> },
    Message { message: Message },
    Ok,
    Error(BackendError),
}

impl Response {
    pub fn name(&self) -> &'static str {
        match self {
            Self::User { .. } => "user",
            Self::UserFullInfo { .. } => "user_full_info",
            Self::BasicGroup { .. } => "basic_group",
            Self::BasicGroupFullInfo { .. } => "basic_group_full_info",
            Self::Supergroup { .. } => "supergroup",
            Self::SupergroupFullInfo { .. } => "supergroup_full_info",
            Self::Messages { .. } => "messages",
            Self::Message { .. } => "message",
            Self::Ok => "ok",
            Self::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_wire_shape() {
        let json = r#"{
            "type": "user",
            "user": { "id": 7, "first_name": "Ann", "status": { "type": "offline", "was_online": 1000 } }
        }"#;
        let update: Update = serde_json::from_str(json).unwrap();
        match update {
            Update::User { user } => {
                assert_eq!(user.id, UserId(7));
                assert_eq!(user.first_name.as_deref(), Some("Ann"));
                assert_eq!(user.last_name, None);
                assert_eq!(user.status, Some(UserStatus::Offline { was_online: 1000 }));
            }
            other => panic!("unexpected update: {}", other.name()),
        }
    }

    #[test]
    fn test_error_response_shape() {
        let json = r#"{ "type": "error", "code": 400, "message": "USER_ID_INVALID" }"#;
        let response: Response = serde_json::from_str(json).unwrap();
        assert!(response.is_error());
        assert_eq!(response.name(), "error");
    }
}
