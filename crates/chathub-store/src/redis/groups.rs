//! Redis group directory.
//!
//! Group metadata lives in a hash, members in a set, and each user has a
//! reverse-index set of group IDs. Writes that touch several keys run as
//! Lua scripts so readers never observe a half-applied change.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use chathub_core::error::AppError;
use chathub_core::result::AppResult;
use chathub_core::types::{GroupId, UserId};
use chathub_entity::Group;

use super::client::{RedisClient, map_err};
use crate::keys;
use crate::traits::GroupDirectory;

/// Lua script for atomic group creation.
///
/// KEYS[1] = group hash
/// KEYS[2] = member set
/// KEYS[3..] = per-member group sets, aligned with ARGV[4..]
/// ARGV[1] = name
/// ARGV[2] = created_at (RFC 3339)
/// ARGV[3] = group id
/// ARGV[4..] = member ids
///
/// Returns 1 when created, 0 when the group already exists.
const CREATE_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 1 then
        return 0
    end
    redis.call('HSET', KEYS[1], 'name', ARGV[1], 'created_at', ARGV[2])
    for i = 4, #ARGV do
        redis.call('SADD', KEYS[2], ARGV[i])
        redis.call('SADD', KEYS[i - 1], ARGV[3])
    end
    return 1
"#;

/// Lua script for membership changes.
///
/// KEYS[1] = group hash
/// KEYS[2] = member set
/// KEYS[3] = user group set
/// ARGV[1] = 'SADD' or 'SREM'
/// ARGV[2] = user id
/// ARGV[3] = group id
///
/// Returns -1 when the group does not exist.
const MEMBERSHIP_SCRIPT: &str = r#"
    if redis.call('EXISTS', KEYS[1]) == 0 then
        return -1
    end
    redis.call(ARGV[1], KEYS[2], ARGV[2])
    redis.call(ARGV[1], KEYS[3], ARGV[3])
    return 1
"#;

/// Redis-backed group directory shared by every process.
#[derive(Debug, Clone)]
pub struct RedisGroupDirectory {
    client: RedisClient,
}

impl RedisGroupDirectory {
    /// Create a directory on the given client.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }

    async fn change_membership(
        &self,
        op: &str,
        group_id: GroupId,
        user_id: UserId,
    ) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        let result: i64 = redis::Script::new(MEMBERSHIP_SCRIPT)
            .key(self.client.prefixed_key(&keys::group_meta(group_id)))
            .key(self.client.prefixed_key(&keys::group_members(group_id)))
            .key(self.client.prefixed_key(&keys::user_groups(user_id)))
            .arg(op)
            .arg(user_id.to_string())
            .arg(group_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        if result < 0 {
            return Err(AppError::not_found(format!("Group {group_id} not found")));
        }
        Ok(())
    }
}

/// Parse IDs from a Redis set, skipping malformed members.
fn parse_ids<T: FromStr>(raw: &[String], key: &str) -> Vec<T> {
    raw.iter()
        .filter_map(|value| match value.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(key, value = %value, "Skipping malformed ID in set");
                None
            }
        })
        .collect()
}

#[async_trait]
impl GroupDirectory for RedisGroupDirectory {
    async fn create(&self, group_id: GroupId, name: &str, members: &[UserId]) -> AppResult<Group> {
        let group = Group::new(group_id, name, members.iter().copied());

        let create = redis::Script::new(CREATE_SCRIPT);
        let mut script = create.prepare_invoke();
        script
            .key(self.client.prefixed_key(&keys::group_meta(group_id)))
            .key(self.client.prefixed_key(&keys::group_members(group_id)))
            .arg(&group.name)
            .arg(group.created_at.to_rfc3339())
            .arg(group_id.to_string());
        for member in &group.members {
            script
                .key(self.client.prefixed_key(&keys::user_groups(*member)))
                .arg(member.to_string());
        }

        let mut conn = self.client.conn_mut();
        let created: i64 = script.invoke_async(&mut conn).await.map_err(map_err)?;
        if created == 0 {
            return Err(AppError::conflict(format!("Group {group_id} already exists")));
        }

        info!(%group_id, members = group.members.len(), "Group created");
        Ok(group)
    }

    async fn get(&self, group_id: GroupId) -> AppResult<Group> {
        let meta_key = self.client.prefixed_key(&keys::group_meta(group_id));
        let members_key = self.client.prefixed_key(&keys::group_members(group_id));

        let mut conn = self.client.conn_mut();
        let (meta, members): (HashMap<String, String>, Vec<String>) = redis::pipe()
            .atomic()
            .cmd("HGETALL")
            .arg(&meta_key)
            .cmd("SMEMBERS")
            .arg(&members_key)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        if meta.is_empty() {
            return Err(AppError::not_found(format!("Group {group_id} not found")));
        }

        let created_at = meta
            .get("created_at")
            .and_then(|v| DateTime::parse_from_rfc3339(v).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);

        Ok(Group {
            id: group_id,
            name: meta.get("name").cloned().unwrap_or_default(),
            members: parse_ids::<UserId>(&members, &members_key)
                .into_iter()
                .collect::<BTreeSet<_>>(),
            created_at,
        })
    }

    async fn add_member(&self, group_id: GroupId, user_id: UserId) -> AppResult<()> {
        self.change_membership("SADD", group_id, user_id).await
    }

    async fn remove_member(&self, group_id: GroupId, user_id: UserId) -> AppResult<()> {
        self.change_membership("SREM", group_id, user_id).await
    }

    async fn members_of(&self, group_id: GroupId) -> AppResult<HashSet<UserId>> {
        let meta_key = self.client.prefixed_key(&keys::group_meta(group_id));
        let members_key = self.client.prefixed_key(&keys::group_members(group_id));

        let mut conn = self.client.conn_mut();
        let (exists, members): (bool, Vec<String>) = redis::pipe()
            .atomic()
            .cmd("EXISTS")
            .arg(&meta_key)
            .cmd("SMEMBERS")
            .arg(&members_key)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        if !exists {
            return Err(AppError::not_found(format!("Group {group_id} not found")));
        }
        Ok(parse_ids(&members, &members_key).into_iter().collect())
    }

    async fn groups_of(&self, user_id: UserId) -> AppResult<HashSet<GroupId>> {
        let key = self.client.prefixed_key(&keys::user_groups(user_id));
        let mut conn = self.client.conn_mut();
        let raw: Vec<String> = redis::cmd("SMEMBERS")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(parse_ids(&raw, &key).into_iter().collect())
    }
}
