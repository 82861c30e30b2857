// Storage port for the moderation pipeline.
//
// Every component talks to one shared store through these primitives. Each
// primitive must be atomic for a single key; nothing above this trait takes
// locks across keys.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Backend(String),

    #[error("Corrupt value at {key}: {message}")]
    Corrupt { key: String, message: String },
}

impl StoreError {
    pub fn corrupt(key: &str, err: impl std::fmt::Display) -> Self {
        StoreError::Corrupt {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Key/value, counter, set and list primitives shared by every moderation
/// component.
///
/// Implementations live in `infra::moderation` (SQLite for production,
/// DashMap for tests).
#[async_trait]
pub trait ModerationStore: Send + Sync {
    /// Read a plain value. Expired values read as `None`.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a plain value, replacing any previous value and expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Delete a plain value. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Increment a counter and return the new value.
    ///
    /// The expiry is only applied when the counter is created (or recreated
    /// after expiring), so a window starts at the first hit.
    async fn incr(&self, key: &str, ttl: Option<Duration>) -> Result<i64, StoreError>;

    /// Add a member to a set. Returns `true` if it was not already present.
    async fn set_add(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    /// Remove a member from a set. Returns `true` if it was present.
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_contains(&self, key: &str, member: &str) -> Result<bool, StoreError>;

    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;

    /// Append to the tail of a list. Returns the new length.
    async fn list_push(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Remove and return the head of a list. At most one caller receives a
    /// given element.
    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Read `count` elements starting at `start` (head = 0) without mutation.
    async fn list_range(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, StoreError>;

    /// Remove up to `count` elements equal to `value`, scanning from the head.
    async fn list_remove(&self, key: &str, value: &str, count: usize)
        -> Result<usize, StoreError>;

    async fn list_len(&self, key: &str) -> Result<usize, StoreError>;

    /// Keep only the newest `keep` elements (the tail) of a list.
    async fn list_trim(&self, key: &str, keep: usize) -> Result<(), StoreError>;
}

// ============================================================================
// KEYSPACE
// ============================================================================

pub(crate) mod keys {
    pub const PENDING_SUGGESTIONS: &str = "suggestions:pending";
    pub const SUGGESTION_SEQUENCE: &str = "suggestions:next_id";
    pub const APPLIED_ACTIONS: &str = "actions:applied";
    pub const NOTIFICATIONS: &str = "notifications";
    pub const AUDIT_ACTIONS: &str = "audit:actions";
    pub const WEIGHTS_OVERRIDE: &str = "config:weights";
    pub const THRESHOLDS_OVERRIDE: &str = "config:thresholds";

    pub fn ledger(scope: u64, actor: u64) -> String {
        format!("ledger:{}:{}", scope, actor)
    }

    pub fn last_message(scope: u64, actor: u64) -> String {
        format!("last_msg:{}:{}", scope, actor)
    }

    pub fn suggestion(id: u64) -> String {
        format!("suggestion:{}", id)
    }

    pub fn blocklist(dimension: &str) -> String {
        format!("blocklist:{}", dimension)
    }

    pub fn block_entry(dimension: &str, value: &str) -> String {
        format!("block:{}:{}", dimension, value)
    }

    pub fn ip_rate(address: &str) -> String {
        format!("rate:ip:{}", address)
    }

    pub fn country_rate(country: &str) -> String {
        format!("rate:country:{}", country)
    }
}
