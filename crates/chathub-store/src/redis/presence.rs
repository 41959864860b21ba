//! Redis presence store using Lua scripts for atomicity.
//!
//! Layout per user:
//! - a sorted set of connection IDs scored by expiry (epoch ms)
//! - a hash of connection ID → serialized [`PresenceEntry`]
//!
//! A global sorted set indexes users by their latest expiry so the
//! sweeper can find stale users without scanning the keyspace.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use chathub_core::result::AppResult;
use chathub_core::types::{ConnectionId, ProcessId, UserId};
use chathub_entity::PresenceEntry;

use super::client::{RedisClient, map_err};
use crate::keys;
use crate::traits::PresenceStore;

/// Lua script for atomic registration.
///
/// KEYS[1] = connection zset
/// KEYS[2] = location hash
/// KEYS[3] = presence index
/// ARGV[1] = connection id
/// ARGV[2] = expiry (epoch ms)
/// ARGV[3] = ttl (ms)
/// ARGV[4] = serialized entry
/// ARGV[5] = user id
const REGISTER_SCRIPT: &str = r#"
    redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
    redis.call('HSET', KEYS[2], ARGV[1], ARGV[4])
    redis.call('PEXPIRE', KEYS[1], ARGV[3])
    redis.call('PEXPIRE', KEYS[2], ARGV[3])
    redis.call('ZADD', KEYS[3], 'GT', ARGV[2], ARGV[5])
    return 1
"#;

/// Lua script for atomic TTL refresh.
///
/// Same KEYS as registration.
/// ARGV[1] = connection id
/// ARGV[2] = new expiry (epoch ms)
/// ARGV[3] = ttl (ms)
/// ARGV[4] = now (epoch ms)
/// ARGV[5] = user id
///
/// Returns 1 when refreshed, 0 when the entry is missing or expired.
const HEARTBEAT_SCRIPT: &str = r#"
    local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
    if not score or tonumber(score) <= tonumber(ARGV[4]) then
        return 0
    end
    redis.call('ZADD', KEYS[1], ARGV[2], ARGV[1])
    redis.call('PEXPIRE', KEYS[1], ARGV[3])
    redis.call('PEXPIRE', KEYS[2], ARGV[3])
    redis.call('ZADD', KEYS[3], 'GT', ARGV[2], ARGV[5])
    return 1
"#;

/// Lua script for atomic removal of one connection.
///
/// Same KEYS as registration.
/// ARGV[1] = connection id
/// ARGV[2] = user id
const UNREGISTER_SCRIPT: &str = r#"
    redis.call('ZREM', KEYS[1], ARGV[1])
    redis.call('HDEL', KEYS[2], ARGV[1])
    if redis.call('ZCARD', KEYS[1]) == 0 then
        redis.call('DEL', KEYS[2])
        redis.call('ZREM', KEYS[3], ARGV[2])
    end
    return 1
"#;

/// Lua script pruning a user's expired connections.
///
/// Same KEYS as registration.
/// ARGV[1] = now (epoch ms)
/// ARGV[2] = user id
///
/// Returns the number of connections removed.
const PRUNE_SCRIPT: &str = r#"
    local stale = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
    for _, id in ipairs(stale) do
        redis.call('HDEL', KEYS[2], id)
    end
    redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
    if redis.call('ZCARD', KEYS[1]) == 0 then
        redis.call('DEL', KEYS[2])
        redis.call('ZREM', KEYS[3], ARGV[2])
    end
    return #stale
"#;

/// Redis-backed presence store shared by every process.
#[derive(Debug, Clone)]
pub struct RedisPresenceStore {
    client: RedisClient,
    ttl: Duration,
}

impl RedisPresenceStore {
    /// Create a store with the given entry TTL.
    pub fn new(client: RedisClient, ttl: Duration) -> Self {
        Self { client, ttl }
    }

    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    fn user_keys(&self, user_id: UserId) -> [String; 3] {
        [
            self.client.prefixed_key(&keys::presence_connections(user_id)),
            self.client.prefixed_key(&keys::presence_locations(user_id)),
            self.client.prefixed_key(&keys::presence_index()),
        ]
    }

    async fn prune(&self, user_id: UserId, now_ms: i64) -> AppResult<i64> {
        let [zset, hash, index] = self.user_keys(user_id);
        let mut conn = self.client.conn_mut();
        redis::Script::new(PRUNE_SCRIPT)
            .key(zset)
            .key(hash)
            .key(index)
            .arg(now_ms)
            .arg(user_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)
    }
}

#[async_trait]
impl PresenceStore for RedisPresenceStore {
    async fn register(
        &self,
        user_id: UserId,
        process_id: &ProcessId,
        connection_id: ConnectionId,
    ) -> AppResult<()> {
        let [zset, hash, index] = self.user_keys(user_id);
        let entry = serde_json::to_string(&PresenceEntry::new(process_id.clone(), connection_id))?;
        let expires_at = Utc::now().timestamp_millis() + self.ttl_ms();

        let mut conn = self.client.conn_mut();
        let _: i64 = redis::Script::new(REGISTER_SCRIPT)
            .key(zset)
            .key(hash)
            .key(index)
            .arg(connection_id.to_string())
            .arg(expires_at)
            .arg(self.ttl_ms())
            .arg(entry)
            .arg(user_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        debug!(%user_id, %connection_id, %process_id, "Presence registered");
        Ok(())
    }

    async fn heartbeat(&self, user_id: UserId, connection_id: ConnectionId) -> AppResult<bool> {
        let [zset, hash, index] = self.user_keys(user_id);
        let now = Utc::now().timestamp_millis();

        let mut conn = self.client.conn_mut();
        let refreshed: i64 = redis::Script::new(HEARTBEAT_SCRIPT)
            .key(zset)
            .key(hash)
            .key(index)
            .arg(connection_id.to_string())
            .arg(now + self.ttl_ms())
            .arg(self.ttl_ms())
            .arg(now)
            .arg(user_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        Ok(refreshed == 1)
    }

    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> AppResult<()> {
        let [zset, hash, index] = self.user_keys(user_id);
        let mut conn = self.client.conn_mut();
        let _: i64 = redis::Script::new(UNREGISTER_SCRIPT)
            .key(zset)
            .key(hash)
            .key(index)
            .arg(connection_id.to_string())
            .arg(user_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(map_err)?;

        debug!(%user_id, %connection_id, "Presence unregistered");
        Ok(())
    }

    async fn lookup(&self, user_id: UserId) -> AppResult<Vec<PresenceEntry>> {
        let now = Utc::now().timestamp_millis();
        self.prune(user_id, now).await?;

        let [zset, hash, _] = self.user_keys(user_id);
        let mut conn = self.client.conn_mut();
        let live: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&zset)
            .arg(format!("({now}"))
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        if live.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Option<String>> = redis::cmd("HMGET")
            .arg(&hash)
            .arg(&live)
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        let mut entries = Vec::with_capacity(live.len());
        for (connection_id, value) in live.iter().zip(raw) {
            let Some(value) = value else {
                debug!(%user_id, %connection_id, "Presence location vanished during lookup");
                continue;
            };
            match serde_json::from_str::<PresenceEntry>(&value) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(%user_id, %connection_id, error = %e, "Malformed presence entry"),
            }
        }
        entries.sort_by_key(|e| e.connected_at);
        Ok(entries)
    }

    async fn online_users(&self) -> AppResult<HashSet<UserId>> {
        let index = self.client.prefixed_key(&keys::presence_index());
        let now = Utc::now().timestamp_millis();
        let mut conn = self.client.conn_mut();
        let ids: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(&index)
            .arg(format!("({now}"))
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;

        Ok(ids.iter().filter_map(|id| id.parse().ok()).collect())
    }

    async fn evict_expired(&self) -> AppResult<u64> {
        let index = self.client.prefixed_key(&keys::presence_index());
        let now = Utc::now().timestamp_millis();
        let stale: Vec<String> = {
            let mut conn = self.client.conn_mut();
            redis::cmd("ZRANGEBYSCORE")
                .arg(&index)
                .arg("-inf")
                .arg(now)
                .query_async(&mut conn)
                .await
                .map_err(map_err)?
        };

        let mut removed = 0u64;
        for raw in stale {
            let Ok(user_id) = raw.parse::<UserId>() else {
                warn!(value = %raw, "Dropping malformed presence index member");
                let mut conn = self.client.conn_mut();
                let _: i64 = redis::cmd("ZREM")
                    .arg(&index)
                    .arg(&raw)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_err)?;
                continue;
            };
            removed += u64::try_from(self.prune(user_id, now).await?).unwrap_or(0);
        }

        if removed > 0 {
            debug!(removed, "Evicted expired presence entries");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<bool> {
        self.client.ping().await
    }
}
