use std::sync::Arc;

use beacon_shared::models::SecretChat;
use beacon_shared::types::{EntityKind, SecretChatId};

use crate::error::{Result, StoreError};
use crate::store::{EntityStore, Replaced};

impl EntityStore {
    /// Replace the cached secret chat unconditionally.
    pub fn apply_secret_chat(&self, secret_chat: SecretChat) -> Result<Replaced<SecretChat>> {
        if !secret_chat.id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::SecretChat,
            });
        }
        let id = secret_chat.id;
        let new = Arc::new(secret_chat);
        let old = self.secret_chats.lock().insert(id, Arc::clone(&new));
        Ok(Replaced { old, new })
    }

    pub fn secret_chat(&self, secret_chat_id: SecretChatId) -> Option<Arc<SecretChat>> {
        self.secret_chats.lock().get(&secret_chat_id).cloned()
    }

    pub fn secret_chat_strict(&self, secret_chat_id: SecretChatId) -> Result<Arc<SecretChat>> {
        if !secret_chat_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::SecretChat,
            });
        }
        self.secret_chat(secret_chat_id).ok_or(StoreError::NotFound {
            kind: EntityKind::SecretChat,
            id: i64::from(secret_chat_id.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_shared::models::SecretChatState;
    use beacon_shared::types::UserId;

    #[test]
    fn test_secret_chat_replaced() {
        let store = EntityStore::new();
        let chat = SecretChat {
            id: SecretChatId(3),
            user_id: UserId(7),
            state: SecretChatState::Pending,
            is_outbound: true,
        };
        store.apply_secret_chat(chat.clone()).unwrap();
        let replaced = store
            .apply_secret_chat(SecretChat {
                state: SecretChatState::Ready,
                ..chat
            })
            .unwrap();
        assert_eq!(replaced.old.unwrap().state, SecretChatState::Pending);
        assert_eq!(
            store.secret_chat_strict(SecretChatId(3)).unwrap().state,
            SecretChatState::Ready
        );
        assert!(store.secret_chat_strict(SecretChatId(4)).is_err());
    }
}
