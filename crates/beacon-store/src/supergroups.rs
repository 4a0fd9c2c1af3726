//! Supergroup and broadcast channel domain.

use std::sync::Arc;

use beacon_shared::models::{Supergroup, SupergroupFullInfo};
use beacon_shared::types::{EntityKind, SupergroupId};

use crate::error::{Result, StoreError};
use crate::store::{EntityChange, EntityStore, Replaced, UpdateMode};

impl EntityStore {
    /// Replace the cached supergroup.
    ///
    /// A change of the broadcast flag or of the username is important.
    pub fn apply_supergroup(&self, supergroup: Supergroup) -> Result<EntityChange<Supergroup>> {
        if !supergroup.id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::Supergroup,
            });
        }
        let id = supergroup.id;
        let new = Arc::new(supergroup);
        let old = self
            .supergroups
            .lock()
            .supergroups
            .insert(id, Arc::clone(&new));

        let (mode, membership_changed) = match &old {
            None => (UpdateMode::Inserted, false),
            Some(old) if **old == *new => (UpdateMode::Unchanged, false),
            Some(old) => {
                let mode = if old.is_channel != new.is_channel || old.username != new.username {
                    UpdateMode::Important
                } else {
                    UpdateMode::Cosmetic
                };
                (mode, old.status != new.status)
            }
        };

        Ok(EntityChange {
            old,
            new,
            mode,
            membership_changed,
        })
    }

    pub fn apply_supergroup_full(
        &self,
        supergroup_id: SupergroupId,
        full_info: SupergroupFullInfo,
    ) -> Result<Replaced<SupergroupFullInfo>> {
        if !supergroup_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::SupergroupFullInfo,
            });
        }
        let new = Arc::new(full_info);
        let old = self
            .supergroups
            .lock()
            .full
            .insert(supergroup_id, Arc::clone(&new));
        Ok(Replaced { old, new })
    }

    pub fn supergroup(&self, supergroup_id: SupergroupId) -> Option<Arc<Supergroup>> {
        self.supergroups.lock().supergroups.get(&supergroup_id).cloned()
    }

    pub fn supergroup_strict(&self, supergroup_id: SupergroupId) -> Result<Arc<Supergroup>> {
        if !supergroup_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::Supergroup,
            });
        }
        self.supergroup(supergroup_id).ok_or(StoreError::NotFound {
            kind: EntityKind::Supergroup,
            id: supergroup_id.0,
        })
    }

    /// The public username, `None` when unknown or not set.
    pub fn supergroup_username(&self, supergroup_id: SupergroupId) -> Option<String> {
        self.supergroup(supergroup_id)
            .map(|supergroup| supergroup.username.clone())
            .filter(|username| !username.is_empty())
    }

    pub fn supergroup_full(&self, supergroup_id: SupergroupId) -> Option<Arc<SupergroupFullInfo>> {
        self.supergroups.lock().full.get(&supergroup_id).cloned()
    }
}
