//! In-process presence store.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;
use tracing::debug;

use chathub_core::result::AppResult;
use chathub_core::types::{ConnectionId, ProcessId, UserId};
use chathub_entity::PresenceEntry;

use crate::traits::PresenceStore;

/// One registered connection with its expiry deadline.
#[derive(Debug, Clone)]
struct Slot {
    process_id: ProcessId,
    connected_at: DateTime<Utc>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|deadline| deadline > now)
    }

    fn to_entry(&self, connection_id: ConnectionId) -> PresenceEntry {
        PresenceEntry {
            process_id: self.process_id.clone(),
            connection_id,
            connected_at: self.connected_at,
        }
    }
}

/// Presence store held in process memory.
///
/// Deadlines use the tokio clock, so TTL behaviour follows
/// `tokio::time::pause`/`advance` in tests.
#[derive(Debug)]
pub struct MemoryPresenceStore {
    users: DashMap<UserId, HashMap<ConnectionId, Slot>>,
    ttl: Duration,
}

impl MemoryPresenceStore {
    /// Create an empty store with the given entry TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            users: DashMap::new(),
            ttl,
        }
    }

    /// Expiry for an entry touched at `now`. A TTL past the clock's range
    /// never expires.
    fn deadline(&self, now: Instant) -> Option<Instant> {
        now.checked_add(self.ttl)
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn register(
        &self,
        user_id: UserId,
        process_id: &ProcessId,
        connection_id: ConnectionId,
    ) -> AppResult<()> {
        let expires_at = self.deadline(Instant::now());
        let mut slots = self.users.entry(user_id).or_default();
        slots
            .entry(connection_id)
            .and_modify(|slot| {
                slot.process_id = process_id.clone();
                slot.expires_at = expires_at;
            })
            .or_insert_with(|| Slot {
                process_id: process_id.clone(),
                connected_at: Utc::now(),
                expires_at,
            });
        Ok(())
    }

    async fn heartbeat(&self, user_id: UserId, connection_id: ConnectionId) -> AppResult<bool> {
        let now = Instant::now();
        let Some(mut slots) = self.users.get_mut(&user_id) else {
            return Ok(false);
        };

        match slots.get_mut(&connection_id) {
            Some(slot) if slot.is_live(now) => {
                slot.expires_at = self.deadline(now);
                Ok(true)
            }
            Some(_) => {
                slots.remove(&connection_id);
                debug!(%user_id, %connection_id, "Heartbeat for expired presence entry");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> AppResult<()> {
        if let Some(mut slots) = self.users.get_mut(&user_id) {
            slots.remove(&connection_id);
        }
        self.users.remove_if(&user_id, |_, slots| slots.is_empty());
        Ok(())
    }

    async fn lookup(&self, user_id: UserId) -> AppResult<Vec<PresenceEntry>> {
        let now = Instant::now();
        let Some(slots) = self.users.get(&user_id) else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<PresenceEntry> = slots
            .iter()
            .filter(|(_, slot)| slot.is_live(now))
            .map(|(id, slot)| slot.to_entry(*id))
            .collect();
        entries.sort_by_key(|e| e.connected_at);
        Ok(entries)
    }

    async fn online_users(&self) -> AppResult<HashSet<UserId>> {
        let now = Instant::now();
        Ok(self
            .users
            .iter()
            .filter(|entry| entry.value().values().any(|slot| slot.is_live(now)))
            .map(|entry| *entry.key())
            .collect())
    }

    async fn evict_expired(&self) -> AppResult<u64> {
        let now = Instant::now();
        let mut removed = 0u64;
        self.users.retain(|_, slots| {
            let before = slots.len();
            slots.retain(|_, slot| slot.is_live(now));
            removed += (before - slots.len()) as u64;
            !slots.is_empty()
        });
        if removed > 0 {
            debug!(removed, "Evicted expired presence entries");
        }
        Ok(removed)
    }

    async fn health_check(&self) -> AppResult<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryPresenceStore {
        MemoryPresenceStore::new(Duration::from_secs(90))
    }

    #[tokio::test]
    async fn test_two_connections_then_unregister_one() {
        let store = store();
        let user = UserId::new();
        let process = ProcessId::new("p1");
        let (c1, c2) = (ConnectionId::new(), ConnectionId::new());

        store.register(user, &process, c1).await.unwrap();
        store.register(user, &process, c2).await.unwrap();
        assert_eq!(store.lookup(user).await.unwrap().len(), 2);

        store.unregister(user, c1).await.unwrap();
        let entries = store.lookup(user).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].connection_id, c2);
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = store();
        let user = UserId::new();
        let process = ProcessId::new("p1");
        let conn = ConnectionId::new();

        store.register(user, &process, conn).await.unwrap();
        store.register(user, &process, conn).await.unwrap();
        assert_eq!(store.lookup(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unregister_absent_is_ok() {
        let store = store();
        store
            .unregister(UserId::new(), ConnectionId::new())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_expires_without_heartbeat() {
        let store = store();
        let user = UserId::new();
        let conn = ConnectionId::new();
        store.register(user, &ProcessId::new("p1"), conn).await.unwrap();

        tokio::time::advance(Duration::from_secs(91)).await;

        assert!(store.lookup(user).await.unwrap().is_empty());
        assert!(!store.online_users().await.unwrap().contains(&user));
        assert!(!store.heartbeat(user, conn).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_extends_ttl() {
        let store = store();
        let user = UserId::new();
        let conn = ConnectionId::new();
        store.register(user, &ProcessId::new("p1"), conn).await.unwrap();

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.heartbeat(user, conn).await.unwrap());
        tokio::time::advance(Duration::from_secs(60)).await;

        assert_eq!(store.lookup(user).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_expired_counts_removed() {
        let store = store();
        let process = ProcessId::new("p1");
        let (stale, fresh) = (UserId::new(), UserId::new());
        store.register(stale, &process, ConnectionId::new()).await.unwrap();
        store.register(stale, &process, ConnectionId::new()).await.unwrap();

        tokio::time::advance(Duration::from_secs(80)).await;
        store.register(fresh, &process, ConnectionId::new()).await.unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        assert_eq!(store.evict_expired().await.unwrap(), 2);
        let online = store.online_users().await.unwrap();
        assert!(online.contains(&fresh));
        assert!(!online.contains(&stale));
    }

    #[tokio::test]
    async fn test_heartbeat_unknown_returns_false() {
        let store = store();
        assert!(
            !store
                .heartbeat(UserId::new(), ConnectionId::new())
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_unbounded_ttl_never_expires() {
        let store = MemoryPresenceStore::new(Duration::MAX);
        let user = UserId::new();
        let conn = ConnectionId::new();

        store.register(user, &ProcessId::new("p1"), conn).await.unwrap();
        assert!(store.heartbeat(user, conn).await.unwrap());
        assert_eq!(store.evict_expired().await.unwrap(), 0);
        assert_eq!(store.lookup(user).await.unwrap().len(), 1);
    }
}
