// In-memory implementation of ModerationStore.
//
// Backs the core tests.
// DashMap's entry API gives us per-key atomicity, which is all the
// pipeline asks of a store.

use crate::core::moderation::{ModerationStore, StoreError};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

pub struct InMemoryModerationStore {
    values: DashMap<String, StoredValue>,
    sets: DashMap<String, HashSet<String>>,
    lists: DashMap<String, VecDeque<String>>,
}

impl InMemoryModerationStore {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
            sets: DashMap::new(),
            lists: DashMap::new(),
        }
    }

    /// Drop expired plain values. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.values.len();
        self.values.retain(|_, v| v.is_live(now));
        before - self.values.len()
    }
}

impl Default for InMemoryModerationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModerationStore for InMemoryModerationStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = Instant::now();
        Ok(self
            .values
            .get(key)
            .filter(|v| v.is_live(now))
            .map(|v| v.value.clone()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.values.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .values
            .remove(key)
            .map(|(_, v)| v.is_live(now))
            .unwrap_or(false))
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entry = self
            .values
            .entry(key.to_string())
            .or_insert_with(|| StoredValue {
                value: "0".to_string(),
                expires_at: ttl.map(|t| now + t),
            });

        // An expired counter starts a fresh window.
        if !entry.is_live(now) {
            entry.value = "0".to_string();
            entry.expires_at = ttl.map(|t| now + t);
        }

        let current: i64 = entry
            .value
            .parse()
            .map_err(|e| StoreError::corrupt(key, e))?;
        let next = current + 1;
        entry.value = next.to_string();
        Ok(next)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .sets
            .get_mut(key)
            .map(|mut set| set.remove(member))
            .unwrap_or(false))
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        Ok(self
            .sets
            .get(key)
            .map(|set| set.contains(member))
            .unwrap_or(false))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        let mut members: Vec<String> = self
            .sets
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let mut list = self.lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        Ok(list.len())
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lists.get_mut(key).and_then(|mut list| list.pop_front()))
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .lists
            .get(key)
            .map(|list| list.iter().skip(start).take(count).cloned().collect())
            .unwrap_or_default())
    }

    async fn list_remove(
        &self,
        key: &str,
        value: &str,
        count: usize,
    ) -> Result<usize, StoreError> {
        let Some(mut list) = self.lists.get_mut(key) else {
            return Ok(0);
        };

        let mut removed = 0;
        list.retain(|item| {
            if removed < count && item == value {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.lists.get(key).map(|list| list.len()).unwrap_or(0))
    }

    async fn list_trim(&self, key: &str, keep: usize) -> Result<(), StoreError> {
        if let Some(mut list) = self.lists.get_mut(key) {
            while list.len() > keep {
                list.pop_front();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_values_expire() {
        let store = InMemoryModerationStore::new();

        store
            .set("short", "lived", Some(Duration::from_millis(30)))
            .await
            .unwrap();
        store.set("forever", "here", None).await.unwrap();
        assert_eq!(store.get("short").await.unwrap().as_deref(), Some("lived"));

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.get("short").await.unwrap(), None);
        assert_eq!(store.get("forever").await.unwrap().as_deref(), Some("here"));
        assert_eq!(store.purge_expired(), 1);
    }

    #[tokio::test]
    async fn test_counter_restarts_after_expiry() {
        let store = InMemoryModerationStore::new();
        let ttl = Some(Duration::from_millis(30));

        assert_eq!(store.incr("hits", ttl).await.unwrap(), 1);
        assert_eq!(store.incr("hits", ttl).await.unwrap(), 2);

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(store.incr("hits", ttl).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_operations() {
        let store = InMemoryModerationStore::new();

        for v in ["a", "b", "a", "c"] {
            store.list_push("q", v).await.unwrap();
        }
        assert_eq!(store.list_len("q").await.unwrap(), 4);
        assert_eq!(store.list_range("q", 1, 2).await.unwrap(), vec!["b", "a"]);

        // Removes only the first matching element
        assert_eq!(store.list_remove("q", "a", 1).await.unwrap(), 1);
        assert_eq!(store.list_range("q", 0, 10).await.unwrap(), vec!["b", "a", "c"]);

        store.list_trim("q", 2).await.unwrap();
        assert_eq!(store.list_range("q", 0, 10).await.unwrap(), vec!["a", "c"]);

        assert_eq!(store.list_pop("q").await.unwrap().as_deref(), Some("a"));
        assert_eq!(store.list_pop("q").await.unwrap().as_deref(), Some("c"));
        assert_eq!(store.list_pop("q").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_operations() {
        let store = InMemoryModerationStore::new();

        assert!(store.set_add("s", "x").await.unwrap());
        assert!(!store.set_add("s", "x").await.unwrap());
        assert!(store.set_contains("s", "x").await.unwrap());
        assert!(store.set_remove("s", "x").await.unwrap());
        assert!(!store.set_contains("s", "x").await.unwrap());
        assert!(store.set_members("s").await.unwrap().is_empty());
    }
}
