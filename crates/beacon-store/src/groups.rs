//! Basic group domain.

use std::sync::Arc;

use beacon_shared::models::{BasicGroup, BasicGroupFullInfo};
use beacon_shared::types::{BasicGroupId, EntityKind};

use crate::error::{Result, StoreError};
use crate::store::{EntityChange, EntityStore, Replaced, UpdateMode};

impl EntityStore {
    /// Replace the cached basic group.
    ///
    /// Gaining an `upgraded_to_supergroup_id` is an important change.
    pub fn apply_basic_group(&self, group: BasicGroup) -> Result<EntityChange<BasicGroup>> {
        if !group.id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::BasicGroup,
            });
        }
        let id = group.id;
        let new = Arc::new(group);
        let old = self
            .basic_groups
            .lock()
            .groups
            .insert(id, Arc::clone(&new));

        let (mode, membership_changed) = match &old {
            None => (UpdateMode::Inserted, false),
            Some(old) if **old == *new => (UpdateMode::Unchanged, false),
            Some(old) => {
                let upgraded = old.upgraded_to_supergroup_id.is_none()
                    && new.upgraded_to_supergroup_id.is_some();
                let mode = if upgraded {
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

    pub fn apply_basic_group_full(
        &self,
        group_id: BasicGroupId,
        full_info: BasicGroupFullInfo,
    ) -> Result<Replaced<BasicGroupFullInfo>> {
        if !group_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::BasicGroupFullInfo,
            });
        }
        let new = Arc::new(full_info);
        let old = self
            .basic_groups
            .lock()
            .full
            .insert(group_id, Arc::clone(&new));
        Ok(Replaced { old, new })
    }

    pub fn basic_group(&self, group_id: BasicGroupId) -> Option<Arc<BasicGroup>> {
        self.basic_groups.lock().groups.get(&group_id).cloned()
    }

    pub fn basic_group_strict(&self, group_id: BasicGroupId) -> Result<Arc<BasicGroup>> {
        if !group_id.is_valid() {
            return Err(StoreError::InvalidId {
                kind: EntityKind::BasicGroup,
            });
        }
        self.basic_group(group_id).ok_or(StoreError::NotFound {
            kind: EntityKind::BasicGroup,
            id: group_id.0,
        })
    }

    pub fn basic_group_active(&self, group_id: BasicGroupId) -> bool {
        self.basic_group(group_id).is_some_and(|group| group.is_active)
    }

    pub fn basic_group_full(&self, group_id: BasicGroupId) -> Option<Arc<BasicGroupFullInfo>> {
        self.basic_groups.lock().full.get(&group_id).cloned()
    }
}
