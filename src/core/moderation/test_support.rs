// Test doubles shared by the moderation tests.

use super::moderation_store::{ModerationStore, StoreError};
use crate::infra::moderation::InMemoryModerationStore;
use async_trait::async_trait;
use std::time::Duration;

/// A store whose every call fails, for exercising fail-open paths.
pub struct FailingStore;

fn outage<T>() -> Result<T, StoreError> {
    Err(StoreError::Backend("store unavailable".to_string()))
}

#[async_trait]
impl ModerationStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        outage()
    }

    async fn set(&self, _key: &str, _value: &str, _ttl: Option<Duration>) -> Result<(), StoreError> {
        outage()
    }

    async fn delete(&self, _key: &str) -> Result<bool, StoreError> {
        outage()
    }

    async fn incr(&self, _key: &str, _ttl: Option<Duration>) -> Result<i64, StoreError> {
        outage()
    }

    async fn set_add(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        outage()
    }

    async fn set_remove(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        outage()
    }

    async fn set_contains(&self, _key: &str, _member: &str) -> Result<bool, StoreError> {
        outage()
    }

    async fn set_members(&self, _key: &str) -> Result<Vec<String>, StoreError> {
        outage()
    }

    async fn list_push(&self, _key: &str, _value: &str) -> Result<usize, StoreError> {
        outage()
    }

    async fn list_pop(&self, _key: &str) -> Result<Option<String>, StoreError> {
        outage()
    }

    async fn list_range(
        &self,
        _key: &str,
        _start: usize,
        _count: usize,
    ) -> Result<Vec<String>, StoreError> {
        outage()
    }

    async fn list_remove(
        &self,
        _key: &str,
        _value: &str,
        _count: usize,
    ) -> Result<usize, StoreError> {
        outage()
    }

    async fn list_len(&self, _key: &str) -> Result<usize, StoreError> {
        outage()
    }

    async fn list_trim(&self, _key: &str, _keep: usize) -> Result<(), StoreError> {
        outage()
    }
}

/// In-memory store whose `list_remove` always fails.
#[derive(Default)]
pub struct RemovalFailsStore(InMemoryModerationStore);

#[async_trait]
impl ModerationStore for RemovalFailsStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.0.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        self.0.delete(key).await
    }

    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError> {
        self.0.incr(key, ttl).await
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.0.set_add(key, member).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.0.set_remove(key, member).await
    }

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        self.0.set_contains(key, member).await
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError> {
        self.0.set_members(key).await
    }

    async fn list_push(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        self.0.list_push(key, value).await
    }

    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.0.list_pop(key).await
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError> {
        self.0.list_range(key, start, count).await
    }

    async fn list_remove(
        &self,
        _key: &str,
        _value: &str,
        _count: usize,
    ) -> Result<usize, StoreError> {
        outage()
    }

    async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        self.0.list_len(key).await
    }

    async fn list_trim(&self, key: &str, keep: usize) -> Result<(), StoreError> {
        self.0.list_trim(key, keep).await
    }
}
