// Bounded notification and audit logs.
//
// Both logs are plain store lists trimmed on every write, so only the newest
// `max_entries` survive. Dashboards read them newest-first.

use super::moderation_models::{AuditRecord, NotificationEntry};
use super::moderation_store::{keys, ModerationStore, StoreError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;

pub struct NotificationSink<S: ModerationStore> {
    store: Arc<S>,
    max_entries: usize,
}

impl<S: ModerationStore> NotificationSink<S> {
    pub fn new(store: Arc<S>, max_entries: usize) -> Self {
        Self {
            store,
            max_entries: max_entries.max(1),
        }
    }

    /// Append a notification, evicting the oldest beyond the cap.
    pub async fn notify(&self, entry: &NotificationEntry) -> Result<(), StoreError> {
        self.append(keys::NOTIFICATIONS, entry).await
    }

    /// Append an audit record, evicting the oldest beyond the cap.
    pub async fn record_action(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.append(keys::AUDIT_ACTIONS, record).await
    }

    /// Up to `limit` notifications, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<NotificationEntry>, StoreError> {
        self.newest(keys::NOTIFICATIONS, limit).await
    }

    /// Up to `limit` audit records, newest first.
    pub async fn recent_actions(&self, limit: usize) -> Result<Vec<AuditRecord>, StoreError> {
        self.newest(keys::AUDIT_ACTIONS, limit).await
    }

    async fn append<T: Serialize>(&self, key: &str, item: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(item).map_err(|e| StoreError::corrupt(key, e))?;
        let len = self.store.list_push(key, &raw).await?;
        if len > self.max_entries {
            self.store.list_trim(key, self.max_entries).await?;
        }
        Ok(())
    }

    async fn newest<T: DeserializeOwned>(&self, key: &str, limit: usize) -> Result<Vec<T>, StoreError> {
        let len = self.store.list_len(key).await?;
        let start = len.saturating_sub(limit);
        let raw = self.store.list_range(key, start, limit).await?;

        let mut items: Vec<T> = raw
            .iter()
            .filter_map(|value| match serde_json::from_str(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!(key, error = %e, "Skipping unreadable log entry");
                    None
                }
            })
            .collect();
        items.reverse();
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::moderation::InMemoryModerationStore;

    #[tokio::test]
    async fn test_log_is_trimmed_to_cap() {
        let store = Arc::new(InMemoryModerationStore::new());
        let sink = NotificationSink::new(Arc::clone(&store), 3);

        for i in 0..5 {
            sink.notify(&NotificationEntry::new(format!("n{}", i), "text"))
                .await
                .unwrap();
        }

        assert_eq!(store.list_len(keys::NOTIFICATIONS).await.unwrap(), 3);
        let titles: Vec<String> = sink
            .recent(10)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.title)
            .collect();
        assert_eq!(titles, vec!["n4", "n3", "n2"]);
    }

    #[tokio::test]
    async fn test_recent_limits_and_orders() {
        let sink = NotificationSink::new(Arc::new(InMemoryModerationStore::new()), 200);

        sink.record_action(&AuditRecord::new("block_ip", "10.0.0.1", "rate"))
            .await
            .unwrap();
        sink.record_action(&AuditRecord::new("unblock_ip", "10.0.0.1", "manual"))
            .await
            .unwrap();

        let actions = sink.recent_actions(1).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, "unblock_ip");
        assert!(sink.recent(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fields_survive_storage() {
        let sink = NotificationSink::new(Arc::new(InMemoryModerationStore::new()), 10);
        let entry = NotificationEntry::new("Blocked", "rate exceeded")
            .field("ip", "10.0.0.9")
            .field("count", 100);
        sink.notify(&entry).await.unwrap();

        let stored = sink.recent(1).await.unwrap();
        assert_eq!(stored[0].fields.get("ip").map(String::as_str), Some("10.0.0.9"));
        assert_eq!(stored[0].fields.get("count").map(String::as_str), Some("100"));
    }
}
