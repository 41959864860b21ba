//! In-process group directory.

use std::collections::HashSet;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::info;

use chathub_core::error::AppError;
use chathub_core::result::AppResult;
use chathub_core::types::{GroupId, UserId};
use chathub_entity::Group;

use crate::traits::GroupDirectory;

/// Group directory held in process memory.
#[derive(Debug, Default)]
pub struct MemoryGroupDirectory {
    groups: DashMap<GroupId, Group>,
    memberships: DashMap<UserId, HashSet<GroupId>>,
}

impl MemoryGroupDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    fn index_member(&self, user_id: UserId, group_id: GroupId) {
        self.memberships.entry(user_id).or_default().insert(group_id);
    }

    fn unindex_member(&self, user_id: UserId, group_id: GroupId) {
        if let Some(mut groups) = self.memberships.get_mut(&user_id) {
            groups.remove(&group_id);
        }
        self.memberships
            .remove_if(&user_id, |_, groups| groups.is_empty());
    }
}

#[async_trait]
impl GroupDirectory for MemoryGroupDirectory {
    async fn create(&self, group_id: GroupId, name: &str, members: &[UserId]) -> AppResult<Group> {
        let group = match self.groups.entry(group_id) {
            Entry::Occupied(_) => {
                return Err(AppError::conflict(format!(
                    "Group {group_id} already exists"
                )));
            }
            Entry::Vacant(slot) => {
                let group = Group::new(group_id, name, members.iter().copied());
                slot.insert(group.clone());
                group
            }
        };

        for member in &group.members {
            self.index_member(*member, group_id);
        }

        info!(%group_id, members = group.members.len(), "Group created");
        Ok(group)
    }

    async fn get(&self, group_id: GroupId) -> AppResult<Group> {
        self.groups
            .get(&group_id)
            .map(|g| g.clone())
            .ok_or_else(|| AppError::not_found(format!("Group {group_id} not found")))
    }

    async fn add_member(&self, group_id: GroupId, user_id: UserId) -> AppResult<()> {
        {
            let mut group = self
                .groups
                .get_mut(&group_id)
                .ok_or_else(|| AppError::not_found(format!("Group {group_id} not found")))?;
            group.members.insert(user_id);
        }
        self.index_member(user_id, group_id);
        Ok(())
    }

    async fn remove_member(&self, group_id: GroupId, user_id: UserId) -> AppResult<()> {
        {
            let mut group = self
                .groups
                .get_mut(&group_id)
                .ok_or_else(|| AppError::not_found(format!("Group {group_id} not found")))?;
            group.members.remove(&user_id);
        }
        self.unindex_member(user_id, group_id);
        Ok(())
    }

    async fn members_of(&self, group_id: GroupId) -> AppResult<HashSet<UserId>> {
        self.groups
            .get(&group_id)
            .map(|g| g.members.iter().copied().collect())
            .ok_or_else(|| AppError::not_found(format!("Group {group_id} not found")))
    }

    async fn groups_of(&self, user_id: UserId) -> AppResult<HashSet<GroupId>> {
        Ok(self
            .memberships
            .get(&user_id)
            .map(|g| g.clone())
            .unwrap_or_default())
    }
}
