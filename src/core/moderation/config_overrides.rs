// Scoring weights and action thresholds.
//
// Compiled-in defaults are merged with override blobs kept in the store, so
// admins can retune scoring without a restart. A resolved snapshot is cached
// for a short TTL; overrides that fail to load or parse are ignored.

use super::moderation_models::SuggestedAction;
use super::moderation_store::{keys, ModerationStore, StoreError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown setting '{0}'")]
    UnknownKey(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Points awarded per rule hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Weights {
    pub link: i64,
    pub mentions: i64,
    pub phone: i64,
    pub caps: i64,
    pub blacklist: i64,
    pub repeat: i64,
    pub attachment: i64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            link: 40,
            mentions: 25,
            phone: 15,
            caps: 10,
            blacklist: 30,
            repeat: 20,
            attachment: 20,
        }
    }
}

impl Weights {
    pub const KEYS: [&'static str; 7] = [
        "link",
        "mentions",
        "phone",
        "caps",
        "blacklist",
        "repeat",
        "attachment",
    ];

    fn slot(&mut self, key: &str) -> Option<&mut i64> {
        match key {
            "link" => Some(&mut self.link),
            "mentions" => Some(&mut self.mentions),
            "phone" => Some(&mut self.phone),
            "caps" => Some(&mut self.caps),
            "blacklist" => Some(&mut self.blacklist),
            "repeat" => Some(&mut self.repeat),
            "attachment" => Some(&mut self.attachment),
            _ => None,
        }
    }
}

/// Running-total thresholds for each suggestion level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Thresholds {
    pub warn: i64,
    pub mute: i64,
    pub ban: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warn: 30,
            mute: 70,
            ban: 120,
        }
    }
}

impl Thresholds {
    pub const KEYS: [&'static str; 3] = ["warn", "mute", "ban"];

    fn slot(&mut self, key: &str) -> Option<&mut i64> {
        match key {
            "warn" => Some(&mut self.warn),
            "mute" => Some(&mut self.mute),
            "ban" => Some(&mut self.ban),
            _ => None,
        }
    }

    /// Highest level whose threshold the total meets.
    pub fn suggest(&self, total: i64) -> SuggestedAction {
        if total >= self.ban {
            SuggestedAction::Ban
        } else if total >= self.mute {
            SuggestedAction::Mute
        } else if total >= self.warn {
            SuggestedAction::Warn
        } else {
            SuggestedAction::None
        }
    }
}

/// Effective scoring configuration after overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoringConfig {
    pub weights: Weights,
    pub thresholds: Thresholds,
}

type OverrideMap = BTreeMap<String, i64>;

pub struct ConfigOverrideStore<S: ModerationStore> {
    store: Arc<S>,
    cache_ttl: Duration,
    cached: RwLock<Option<(Instant, ScoringConfig)>>,
}

impl<S: ModerationStore> ConfigOverrideStore<S> {
    /// A zero `cache_ttl` re-reads the overrides on every call.
    pub fn new(store: Arc<S>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache_ttl,
            cached: RwLock::new(None),
        }
    }

    /// Effective weights and thresholds. Never fails: broken overrides fall
    /// back to the defaults.
    pub async fn resolve(&self) -> ScoringConfig {
        if !self.cache_ttl.is_zero() {
            if let Some((loaded_at, config)) = *self.cached.read().await {
                if loaded_at.elapsed() < self.cache_ttl {
                    return config;
                }
            }
        }

        let mut config = ScoringConfig::default();

        for (key, value) in self.load_override(keys::WEIGHTS_OVERRIDE).await {
            match config.weights.slot(&key) {
                Some(slot) => *slot = value,
                None => tracing::debug!(key = %key, "Ignoring unknown weight override"),
            }
        }
        for (key, value) in self.load_override(keys::THRESHOLDS_OVERRIDE).await {
            match config.thresholds.slot(&key) {
                Some(slot) => *slot = value,
                None => tracing::debug!(key = %key, "Ignoring unknown threshold override"),
            }
        }

        if !self.cache_ttl.is_zero() {
            *self.cached.write().await = Some((Instant::now(), config));
        }
        config
    }

    /// Override a single weight.
    pub async fn set_weight(&self, key: &str, value: i64) -> Result<(), ConfigError> {
        if !Weights::KEYS.contains(&key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        self.write_override(keys::WEIGHTS_OVERRIDE, key, value).await
    }

    /// Override a single threshold.
    pub async fn set_threshold(&self, key: &str, value: i64) -> Result<(), ConfigError> {
        if !Thresholds::KEYS.contains(&key) {
            return Err(ConfigError::UnknownKey(key.to_string()));
        }
        self.write_override(keys::THRESHOLDS_OVERRIDE, key, value).await
    }

    /// Drop all overrides and return to the defaults.
    pub async fn clear_overrides(&self) -> Result<(), ConfigError> {
        self.store.delete(keys::WEIGHTS_OVERRIDE).await?;
        self.store.delete(keys::THRESHOLDS_OVERRIDE).await?;
        self.invalidate().await;
        Ok(())
    }

    async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn load_override(&self, key: &str) -> OverrideMap {
        match self.fetch_override(key).await {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(key, error = %e, "Ignoring unreadable config override");
                OverrideMap::new()
            }
        }
    }

    async fn fetch_override(&self, key: &str) -> Result<OverrideMap, StoreError> {
        match self.store.get(key).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::corrupt(key, e)),
            None => Ok(OverrideMap::new()),
        }
    }

    async fn write_override(&self, blob: &str, key: &str, value: i64) -> Result<(), ConfigError> {
        // A corrupt blob is replaced rather than blocking every future write.
        let mut map = self.fetch_override(blob).await.unwrap_or_default();
        map.insert(key.to_string(), value);

        let raw = serde_json::to_string(&map).map_err(|e| StoreError::corrupt(blob, e))?;
        self.store.set(blob, &raw, None).await?;
        self.invalidate().await;
        tracing::info!(blob, key, value, "Scoring override updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::moderation::InMemoryModerationStore;

    fn overrides(cache_ttl: Duration) -> (Arc<InMemoryModerationStore>, ConfigOverrideStore<InMemoryModerationStore>) {
        let store = Arc::new(InMemoryModerationStore::new());
        let config = ConfigOverrideStore::new(Arc::clone(&store), cache_ttl);
        (store, config)
    }

    #[tokio::test]
    async fn test_defaults_without_overrides() {
        let (_, config) = overrides(Duration::ZERO);
        let resolved = config.resolve().await;

        assert_eq!(resolved.weights, Weights::default());
        assert_eq!(resolved.thresholds, Thresholds::default());
    }

    #[tokio::test]
    async fn test_overrides_merge_by_key() {
        let (store, config) = overrides(Duration::ZERO);
        store
            .set(keys::WEIGHTS_OVERRIDE, r#"{"link": 5, "bogus": 99}"#, None)
            .await
            .unwrap();
        store
            .set(keys::THRESHOLDS_OVERRIDE, r#"{"ban": 500}"#, None)
            .await
            .unwrap();

        let resolved = config.resolve().await;
        assert_eq!(resolved.weights.link, 5);
        assert_eq!(resolved.weights.mentions, 25);
        assert_eq!(resolved.thresholds.ban, 500);
        assert_eq!(resolved.thresholds.warn, 30);
    }

    #[tokio::test]
    async fn test_malformed_override_falls_back_to_defaults() {
        let (store, config) = overrides(Duration::ZERO);
        store
            .set(keys::WEIGHTS_OVERRIDE, "not json", None)
            .await
            .unwrap();
        store
            .set(keys::THRESHOLDS_OVERRIDE, r#"{"warn": 1}"#, None)
            .await
            .unwrap();

        let resolved = config.resolve().await;
        assert_eq!(resolved.weights, Weights::default());
        assert_eq!(resolved.thresholds.warn, 1);
    }

    #[tokio::test]
    async fn test_cached_snapshot_until_invalidated() {
        let (store, config) = overrides(Duration::from_secs(60));
        assert_eq!(config.resolve().await.weights.link, 40);

        // Written behind the cache's back - not visible yet
        store
            .set(keys::WEIGHTS_OVERRIDE, r#"{"link": 1}"#, None)
            .await
            .unwrap();
        assert_eq!(config.resolve().await.weights.link, 40);

        // Writes through the service invalidate the snapshot
        config.set_weight("caps", 3).await.unwrap();
        let resolved = config.resolve().await;
        assert_eq!(resolved.weights.link, 1);
        assert_eq!(resolved.weights.caps, 3);
    }

    #[tokio::test]
    async fn test_unknown_keys_rejected_on_write() {
        let (_, config) = overrides(Duration::ZERO);
        assert!(matches!(
            config.set_threshold("kick", 10).await,
            Err(ConfigError::UnknownKey(_))
        ));

        config.set_threshold("mute", 50).await.unwrap();
        assert_eq!(config.resolve().await.thresholds.mute, 50);

        config.clear_overrides().await.unwrap();
        assert_eq!(config.resolve().await.thresholds.mute, 70);
    }

    #[test]
    fn test_threshold_suggestion_picks_highest() {
        let thresholds = Thresholds::default();
        assert_eq!(thresholds.suggest(0), SuggestedAction::None);
        assert_eq!(thresholds.suggest(30), SuggestedAction::Warn);
        assert_eq!(thresholds.suggest(100), SuggestedAction::Mute);
        assert_eq!(thresholds.suggest(120), SuggestedAction::Ban);
    }
}
