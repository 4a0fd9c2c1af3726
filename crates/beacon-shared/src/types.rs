use serde::{Deserialize, Serialize};

/// Offset applied to supergroup ids when they are turned into chat ids.
const SUPERGROUP_CHAT_OFFSET: i64 = 1_000_000_000_000;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Zero is never assigned by the backend.
            pub fn is_valid(&self) -> bool {
                self.0 != 0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }
    };
}

entity_id!(
    /// Backend-assigned user identifier.
    UserId(i64)
);
entity_id!(
    /// Identifier of a basic (small) group.
    BasicGroupId(i64)
);
entity_id!(
    /// Identifier of a supergroup or broadcast channel.
    SupergroupId(i64)
);
entity_id!(
    /// Identifier of a one-to-one encrypted session.
    SecretChatId(i32)
);
entity_id!(CallId(i32));
entity_id!(
    /// Chat identifier. Derived from the peer id for private chats and groups.
    ChatId(i64)
);
entity_id!(MessageId(i64));

impl ChatId {
    pub fn from_user(user_id: UserId) -> Self {
        Self(user_id.0)
    }

    pub fn from_basic_group(group_id: BasicGroupId) -> Self {
        Self(-group_id.0)
    }

    pub fn from_supergroup(supergroup_id: SupergroupId) -> Self {
        Self(-SUPERGROUP_CHAT_OFFSET - supergroup_id.0)
    }

    /// The supergroup behind this chat, if it is one.
    pub fn to_supergroup(self) -> Option<SupergroupId> {
        if self.0 < -SUPERGROUP_CHAT_OFFSET {
            Some(SupergroupId(-SUPERGROUP_CHAT_OFFSET - self.0))
        } else {
            None
        }
    }

    /// The basic group behind this chat, if it is one.
    pub fn to_basic_group(self) -> Option<BasicGroupId> {
        if self.0 < 0 && self.0 >= -SUPERGROUP_CHAT_OFFSET {
            Some(BasicGroupId(-self.0))
        } else {
            None
        }
    }
}

/// Entity kinds with an independent id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    User,
    UserFullInfo,
    BasicGroup,
    BasicGroupFullInfo,
    Supergroup,
    SupergroupFullInfo,
    SecretChat,
    Call,
    CallSettings,
    Chat,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::User => "user",
            Self::UserFullInfo => "user_full_info",
            Self::BasicGroup => "basic_group",
            Self::BasicGroupFullInfo => "basic_group_full_info",
            Self::Supergroup => "supergroup",
            Self::SupergroupFullInfo => "supergroup_full_info",
            Self::SecretChat => "secret_chat",
            Self::Call => "call",
            Self::CallSettings => "call_settings",
            Self::Chat => "chat",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_id_derivation() {
        assert_eq!(ChatId::from_user(UserId(7)), ChatId(7));
        assert_eq!(ChatId::from_basic_group(BasicGroupId(42)), ChatId(-42));
        assert_eq!(
            ChatId::from_supergroup(SupergroupId(5)),
            ChatId(-1_000_000_000_005)
        );
    }

    #[test]
    fn test_chat_id_reverse_mapping() {
        let chat = ChatId::from_supergroup(SupergroupId(99));
        assert_eq!(chat.to_supergroup(), Some(SupergroupId(99)));
        assert_eq!(chat.to_basic_group(), None);

        let chat = ChatId::from_basic_group(BasicGroupId(12));
        assert_eq!(chat.to_basic_group(), Some(BasicGroupId(12)));
        assert_eq!(chat.to_supergroup(), None);

        assert_eq!(ChatId(3).to_basic_group(), None);
    }

    #[test]
    fn test_zero_id_is_invalid() {
        assert!(!UserId(0).is_valid());
        assert!(CallId(1).is_valid());
    }
}
