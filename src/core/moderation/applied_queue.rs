// Queue of admin-approved actions waiting for the executor.

use super::moderation_models::AppliedAction;
use super::moderation_store::{keys, ModerationStore, StoreError};
use std::sync::Arc;

pub struct AppliedActionQueue<S: ModerationStore> {
    store: Arc<S>,
}

impl<S: ModerationStore> AppliedActionQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append an approved action. Returns the new queue length.
    pub async fn push(&self, action: &AppliedAction) -> Result<usize, StoreError> {
        let raw = serde_json::to_string(action)
            .map_err(|e| StoreError::corrupt(keys::APPLIED_ACTIONS, e))?;
        self.store.list_push(keys::APPLIED_ACTIONS, &raw).await
    }

    /// Atomically take the head of the queue.
    ///
    /// An unreadable entry is still consumed and reported as
    /// [`StoreError::Corrupt`].
    pub async fn pop(&self) -> Result<Option<AppliedAction>, StoreError> {
        match self.store.list_pop(keys::APPLIED_ACTIONS).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StoreError::corrupt(keys::APPLIED_ACTIONS, e)),
            None => Ok(None),
        }
    }

    #[cfg(test)]
    pub async fn len(&self) -> Result<usize, StoreError> {
        self.store.list_len(keys::APPLIED_ACTIONS).await
    }
}
