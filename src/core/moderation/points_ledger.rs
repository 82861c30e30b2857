// Sliding-window points ledger.
//
// Each (scope, actor) pair owns a list of (timestamp, points) entries. Every
// update prunes entries that fell out of the window, appends the new score and
// writes the list back, returning the running total. Only the window bounds
// the list; zero-point updates are not stored.
//
// Read-prune-append-write is not atomic at the store level. Updates for the
// same key are serialized inside this process; updates from other processes
// can still overwrite each other, which is acceptable for best-effort scoring.

use super::moderation_models::LedgerEntry;
use super::moderation_store::{keys, ModerationStore, StoreError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Stored lists outlive the window slightly so a late read still sees them.
const EXPIRY_SLACK: Duration = Duration::from_secs(60);

pub struct PointsLedger<S: ModerationStore> {
    store: Arc<S>,
    writers: DashMap<String, Arc<Mutex<()>>>,
}

impl<S: ModerationStore> PointsLedger<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            writers: DashMap::new(),
        }
    }

    /// Add `points` for the actor and return the total within `window`.
    pub async fn update(
        &self,
        scope: u64,
        actor: u64,
        points: i64,
        window: Duration,
    ) -> Result<i64, StoreError> {
        self.update_at(scope, actor, points, window, Utc::now()).await
    }

    /// Same as [`update`](Self::update) with an explicit clock reading.
    pub async fn update_at(
        &self,
        scope: u64,
        actor: u64,
        points: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let key = keys::ledger(scope, actor);

        let writer = Arc::clone(
            self.writers
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let guard = writer.lock().await;
        let result = self.prune_and_append(&key, points, window, now).await;
        drop(guard);
        drop(writer);

        // Forget the writer lock once nobody else is waiting on it.
        self.writers
            .remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn prune_and_append(
        &self,
        key: &str,
        points: i64,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let mut entries = self.load(key).await?;

        let now_ms = now.timestamp_millis();
        let cutoff = now_ms - window.as_millis() as i64;
        entries.retain(|entry| entry.at_ms >= cutoff);
        if points != 0 {
            entries.push(LedgerEntry {
                at_ms: now_ms,
                points,
            });
        }

        let total = entries.iter().map(|entry| entry.points).sum();

        let raw = serde_json::to_string(&entries).map_err(|e| StoreError::corrupt(key, e))?;
        self.store.set(key, &raw, Some(window + EXPIRY_SLACK)).await?;

        Ok(total)
    }

    async fn load(&self, key: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                // Start over rather than wedge the actor's ledger forever.
                tracing::warn!(key, error = %e, "Discarding corrupt ledger");
                Ok(Vec::new())
            }
        }
    }
}
