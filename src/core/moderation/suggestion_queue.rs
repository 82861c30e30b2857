// Pending suggestion queue.
//
// Suggestions are stored as an arena: each gets a unique id from a store
// counter, its record lives under `suggestion:{id}`, and the queue itself is
// an ordered list of ids. Removal always goes through the id, so two
// suggestions with identical content never get confused.

use super::moderation_models::Suggestion;
use super::moderation_store::{keys, ModerationStore, StoreError};
use std::sync::Arc;

/// A suggestion together with its 1-based position in the queue.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSuggestion {
    pub index: usize,
    pub suggestion: Suggestion,
}

impl PendingSuggestion {
    /// One-line rendering used by the review console.
    pub fn display_line(&self) -> String {
        let s = &self.suggestion;
        let reasons = if s.reasons.is_empty() {
            "-".to_string()
        } else {
            s.reasons.join(", ")
        };
        format!(
            "{}. [{}] scope={} actor={} score={} total={} reasons: {} ({})",
            self.index,
            s.suggested_action,
            s.scope,
            s.actor,
            s.score,
            s.total,
            reasons,
            s.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        )
    }
}

pub struct SuggestionQueue<S: ModerationStore> {
    store: Arc<S>,
}

impl<S: ModerationStore> SuggestionQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Assign an id and append the suggestion to the tail of the queue.
    pub async fn push(&self, mut suggestion: Suggestion) -> Result<Suggestion, StoreError> {
        let id = self.store.incr(keys::SUGGESTION_SEQUENCE, None).await?;
        suggestion.id = id as u64;

        let key = keys::suggestion(suggestion.id);
        let raw = serde_json::to_string(&suggestion).map_err(|e| StoreError::corrupt(&key, e))?;

        // Record first, so a reader never sees an id without its record.
        self.store.set(&key, &raw, None).await?;
        self.store
            .list_push(keys::PENDING_SUGGESTIONS, &suggestion.id.to_string())
            .await?;

        tracing::info!(
            id = suggestion.id,
            scope = suggestion.scope,
            actor = suggestion.actor,
            action = %suggestion.suggested_action,
            "Suggestion queued"
        );
        Ok(suggestion)
    }

    /// The first `limit` suggestions, without removing them.
    pub async fn list(&self, limit: usize) -> Result<Vec<PendingSuggestion>, StoreError> {
        let ids = self
            .store
            .list_range(keys::PENDING_SUGGESTIONS, 0, limit)
            .await?;

        let mut pending = Vec::with_capacity(ids.len());
        for (position, id) in ids.iter().enumerate() {
            if let Some(suggestion) = self.load(id).await? {
                pending.push(PendingSuggestion {
                    index: position + 1,
                    suggestion,
                });
            }
        }
        Ok(pending)
    }

    /// Suggestion at a 0-based queue position.
    pub async fn get_at(&self, position: usize) -> Result<Option<Suggestion>, StoreError> {
        let ids = self
            .store
            .list_range(keys::PENDING_SUGGESTIONS, position, 1)
            .await?;
        match ids.first() {
            Some(id) => self.load(id).await,
            None => Ok(None),
        }
    }

    /// Remove and return the head of the queue.
    pub async fn pop(&self) -> Result<Option<Suggestion>, StoreError> {
        while let Some(id) = self.store.list_pop(keys::PENDING_SUGGESTIONS).await? {
            if let Some(suggestion) = self.load(&id).await? {
                self.store.delete(&keys::suggestion(suggestion.id)).await?;
                return Ok(Some(suggestion));
            }
            // Stale id whose record is gone; keep looking.
        }
        Ok(None)
    }

    /// Remove one suggestion by id. Returns whether it was still queued.
    pub async fn remove(&self, id: u64) -> Result<bool, StoreError> {
        let removed = self
            .store
            .list_remove(keys::PENDING_SUGGESTIONS, &id.to_string(), 1)
            .await?;
        self.store.delete(&keys::suggestion(id)).await?;
        Ok(removed > 0)
    }

    #[cfg(test)]
    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.list_len(keys::PENDING_SUGGESTIONS).await
    }

    async fn load(&self, id: &str) -> Result<Option<Suggestion>, StoreError> {
        let key = match id.parse::<u64>() {
            Ok(id) => keys::suggestion(id),
            Err(e) => {
                tracing::warn!(id, error = %e, "Ignoring malformed suggestion id");
                return Ok(None);
            }
        };

        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::corrupt(&key, e)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{ClassifyResult, SuggestedAction};
    use crate::infra::moderation::InMemoryModerationStore;

    fn suggestion(actor: u64, action: SuggestedAction) -> Suggestion {
        let result = ClassifyResult {
            score: 40,
            reasons: vec!["contains_link".to_string()],
            total: 40,
            suggestion: action,
        };
        Suggestion::new(100, actor, &result)
    }

    fn queue() -> SuggestionQueue<InMemoryModerationStore> {
        SuggestionQueue::new(Arc::new(InMemoryModerationStore::new()))
    }

    #[tokio::test]
    async fn test_push_assigns_unique_ids_in_order() {
        let queue = queue();

        let a = queue.push(suggestion(1, SuggestedAction::Warn)).await.unwrap();
        let b = queue.push(suggestion(2, SuggestedAction::Mute)).await.unwrap();
        assert_ne!(a.id, b.id);

        let listed = queue.list(10).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].index, 1);
        assert_eq!(listed[0].suggestion.actor, 1);
        assert_eq!(listed[1].index, 2);
        assert_eq!(listed[1].suggestion.actor, 2);

        // Listing does not consume
        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let queue = queue();
        for actor in 0..5 {
            queue.push(suggestion(actor, SuggestedAction::Warn)).await.unwrap();
        }
        assert_eq!(queue.list(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_pop_empty_queue() {
        let queue = queue();
        assert_eq!(queue.pop().await.unwrap(), None);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_pop_returns_head() {
        let queue = queue();
        queue.push(suggestion(1, SuggestedAction::Warn)).await.unwrap();
        queue.push(suggestion(2, SuggestedAction::Ban)).await.unwrap();

        let head = queue.pop().await.unwrap().unwrap();
        assert_eq!(head.actor, 1);
        assert_eq!(queue.len().await.unwrap(), 1);
        assert_eq!(queue.get_at(0).await.unwrap().unwrap().actor, 2);
    }

    #[tokio::test]
    async fn test_duplicate_content_removed_by_id() {
        let queue = queue();
        let mut twin = suggestion(7, SuggestedAction::Mute);
        let first = queue.push(twin.clone()).await.unwrap();
        twin.timestamp = first.timestamp;
        let second = queue.push(twin).await.unwrap();

        assert!(queue.remove(second.id).await.unwrap());
        assert!(!queue.remove(second.id).await.unwrap());

        let remaining = queue.list(10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].suggestion.id, first.id);
    }

    #[tokio::test]
    async fn test_display_line() {
        let queue = queue();
        queue.push(suggestion(9, SuggestedAction::Warn)).await.unwrap();

        let line = queue.list(1).await.unwrap()[0].display_line();
        assert!(line.starts_with("1. [warn] scope=100 actor=9 score=40 total=40"));
        assert!(line.contains("contains_link"));
    }
}
