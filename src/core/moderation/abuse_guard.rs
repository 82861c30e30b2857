// Abuse guard - per-address rate limiting and dimension blocklists.
//
// Every inbound request is counted per source address. Crossing the rate
// threshold either blocks the address or raises a block suggestion, and
// enough escalated addresses from one country escalate the country itself.
// Region, city and medium lists are only ever changed by admins.
//
// The guard only answers membership questions. Rejecting a blocked request is
// the caller's job. Store failures never block traffic: every store call
// has an explicit fail-open branch.

use super::moderation_models::{
    AuditRecord, BlockDimension, BlockEntry, Geo, NotificationEntry, RecordOutcome, RequestMeta,
};
use super::moderation_store::{keys, ModerationStore, StoreError};
use super::notifications::NotificationSink;
use super::settings::GuardSettings;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Header a client can set to declare its delivery medium.
pub const MEDIUM_HEADER: &str = "x-client-medium";
pub const DEFAULT_MEDIUM: &str = "web";

/// User-agent fragments of known bot clients, mapped to their medium.
const BOT_SIGNATURES: &[(&str, &str)] = &[
    ("telegrambot", "telegram"),
    ("discordbot", "discord"),
    ("slackbot", "slack"),
];

const RATE_REASON: &str = "rate";
const COUNTRY_REASON: &str = "country_escalation";
const MANUAL_REASON: &str = "manual";

// ============================================================================
// COLLABORATOR PORTS
// ============================================================================

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("Geo lookup failed: {0}")]
    Lookup(String),

    #[error("Unexpected geo response: {0}")]
    Malformed(String),
}

/// Resolves a source address to a location.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Geo, GeoError>;
}

/// Out-of-band channel for block suggestions that need a human.
#[async_trait]
pub trait AlertHook: Send + Sync {
    async fn alert(&self, entry: &NotificationEntry);
}

// ============================================================================
// GUARD
// ============================================================================

pub struct AbuseGuard<S: ModerationStore> {
    store: Arc<S>,
    notifications: Arc<NotificationSink<S>>,
    settings: GuardSettings,
    geo: Option<Arc<dyn GeoResolver>>,
    alerts: Option<Arc<dyn AlertHook>>,
}

impl<S: ModerationStore> AbuseGuard<S> {
    pub fn new(
        store: Arc<S>,
        notifications: Arc<NotificationSink<S>>,
        settings: GuardSettings,
        geo: Option<Arc<dyn GeoResolver>>,
        alerts: Option<Arc<dyn AlertHook>>,
    ) -> Self {
        Self {
            store,
            notifications,
            settings,
            geo,
            alerts,
        }
    }

    /// Count one request from `address` and report what is blocked.
    pub async fn record(&self, address: &str, meta: &RequestMeta) -> RecordOutcome {
        let count = match self
            .store
            .incr(&keys::ip_rate(address), Some(self.settings.window))
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(address, error = %e, "Rate counter unavailable, failing open");
                0
            }
        };

        // Any count at or over the threshold keeps the address blocked, so an
        // unblock mid-flood is undone by the next request. Suggestions and the
        // country counter only fire on the crossing itself.
        let over = count > 0 && count >= self.settings.rate_threshold;
        let crossed = over && count == self.settings.rate_threshold;
        if over && self.needs_escalation(address, crossed).await {
            self.escalate(BlockDimension::Ip, address, RATE_REASON, count)
                .await;
        }

        let geo = self.resolve_geo(address).await;

        if crossed {
            if let Some(country) = geo.country.as_deref() {
                self.count_escalated_address(country).await;
            }
        }

        let medium = detect_medium(meta);

        RecordOutcome {
            count,
            blocked: self.is_blocked(BlockDimension::Ip, address).await,
            country_blocked: self
                .is_blocked_opt(BlockDimension::Country, geo.country.as_deref())
                .await,
            blocked_region: self
                .is_blocked_opt(BlockDimension::Region, geo.region.as_deref())
                .await,
            blocked_city: self
                .is_blocked_opt(BlockDimension::City, geo.city.as_deref())
                .await,
            blocked_medium: self.is_blocked(BlockDimension::Medium, &medium).await,
            geo,
            medium,
        }
    }

    /// Admin block. Returns `false` when the value is blank or the store
    /// refused the write.
    pub async fn block(&self, dimension: BlockDimension, value: &str, reason: Option<&str>) -> bool {
        self.block_with_ttl(dimension, value, reason.unwrap_or(MANUAL_REASON), None)
            .await
    }

    pub async fn unblock(&self, dimension: BlockDimension, value: &str) -> bool {
        let Some(value) = normalize(dimension, value) else {
            return false;
        };

        if let Err(e) = self.remove_entry(dimension, &value).await {
            tracing::warn!(%dimension, value = %value, error = %e, "Failed to unblock");
            return false;
        }

        tracing::info!(%dimension, value = %value, "Unblocked");
        self.audit(AuditRecord::new(
            format!("unblock_{}", dimension),
            value.as_str(),
            MANUAL_REASON,
        ))
        .await;
        true
    }

    /// Membership check. A listed value whose entry expired counts as not
    /// blocked.
    pub async fn is_blocked(&self, dimension: BlockDimension, value: &str) -> bool {
        let Some(value) = normalize(dimension, value) else {
            return false;
        };

        match self.lookup_block(dimension, &value).await {
            Ok(blocked) => blocked,
            Err(e) => {
                tracing::warn!(%dimension, value = %value, error = %e, "Blocklist unavailable, failing open");
                false
            }
        }
    }

    /// Current entries of one blocklist, sorted by value. Members whose entry
    /// expired are pruned from the set on the way.
    pub async fn list_blocked(
        &self,
        dimension: BlockDimension,
    ) -> Result<Vec<(String, BlockEntry)>, StoreError> {
        let set_key = keys::blocklist(dimension.as_str());
        let mut members = self.store.set_members(&set_key).await?;
        members.sort();

        let mut entries = Vec::with_capacity(members.len());
        for value in members {
            let key = keys::block_entry(dimension.as_str(), &value);
            match self.store.get(&key).await? {
                Some(raw) => match serde_json::from_str::<BlockEntry>(&raw) {
                    Ok(entry) => entries.push((value, entry)),
                    Err(e) => tracing::warn!(key = %key, error = %e, "Skipping unreadable block entry"),
                },
                None => {
                    self.store.set_remove(&set_key, &value).await?;
                }
            }
        }
        Ok(entries)
    }

    async fn lookup_block(&self, dimension: BlockDimension, value: &str) -> Result<bool, StoreError> {
        if !self
            .store
            .set_contains(&keys::blocklist(dimension.as_str()), value)
            .await?
        {
            return Ok(false);
        }
        let entry = self
            .store
            .get(&keys::block_entry(dimension.as_str(), value))
            .await?;
        Ok(entry.is_some())
    }

    async fn block_with_ttl(
        &self,
        dimension: BlockDimension,
        value: &str,
        reason: &str,
        ttl: Option<Duration>,
    ) -> bool {
        let Some(value) = normalize(dimension, value) else {
            return false;
        };

        let entry = BlockEntry {
            reason: reason.to_string(),
            timestamp: Utc::now(),
        };
        if let Err(e) = self.write_entry(dimension, &value, &entry, ttl).await {
            tracing::warn!(%dimension, value = %value, error = %e, "Failed to block");
            return false;
        }

        tracing::info!(%dimension, value = %value, reason, "Blocked");
        self.publish(
            NotificationEntry::new(
                format!("{} blocked", dimension_label(dimension)),
                format!("{} {} was blocked ({})", dimension, value, reason),
            )
            .field(dimension.as_str(), &value)
            .field("reason", reason),
        )
        .await;
        self.audit(AuditRecord::new(
            format!("block_{}", dimension),
            value.as_str(),
            reason,
        ))
        .await;
        true
    }

    async fn write_entry(
        &self,
        dimension: BlockDimension,
        value: &str,
        entry: &BlockEntry,
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        let key = keys::block_entry(dimension.as_str(), value);
        let raw = serde_json::to_string(entry).map_err(|e| StoreError::corrupt(&key, e))?;
        self.store.set(&key, &raw, ttl).await?;
        self.store
            .set_add(&keys::blocklist(dimension.as_str()), value)
            .await?;
        Ok(())
    }

    async fn remove_entry(&self, dimension: BlockDimension, value: &str) -> Result<(), StoreError> {
        self.store
            .delete(&keys::block_entry(dimension.as_str(), value))
            .await?;
        self.store
            .set_remove(&keys::blocklist(dimension.as_str()), value)
            .await?;
        Ok(())
    }

    /// Block or suggest-block, depending on `auto_block`.
    async fn escalate(&self, dimension: BlockDimension, value: &str, reason: &str, count: i64) {
        if self.settings.auto_block {
            let ttl = match dimension {
                BlockDimension::Ip => Some(self.settings.block_ttl),
                _ => None,
            };
            self.block_with_ttl(dimension, value, reason, ttl).await;
            return;
        }

        tracing::warn!(%dimension, value, count, "Block suggested");
        let entry = NotificationEntry::new(
            format!("{} block suggested", dimension_label(dimension)),
            format!(
                "{} {} crossed its threshold ({} hits); review and block manually",
                dimension, value, count
            ),
        )
        .field(dimension.as_str(), value)
        .field("reason", reason)
        .field("count", count);

        self.publish(entry.clone()).await;
        self.audit(AuditRecord::new(
            format!("suggest_block_{}", dimension),
            value,
            reason,
        ))
        .await;

        if let Some(alerts) = &self.alerts {
            alerts.alert(&entry).await;
        }
    }

    async fn needs_escalation(&self, address: &str, crossed: bool) -> bool {
        if self.settings.auto_block {
            !self.is_blocked(BlockDimension::Ip, address).await
        } else {
            crossed
        }
    }

    async fn count_escalated_address(&self, country: &str) {
        let Some(country) = normalize(BlockDimension::Country, country) else {
            return;
        };

        let count = match self
            .store
            .incr(
                &keys::country_rate(&country),
                Some(self.settings.country_window),
            )
            .await
        {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(country = %country, error = %e, "Country counter unavailable, failing open");
                return;
            }
        };

        if count == self.settings.country_threshold {
            self.escalate(BlockDimension::Country, &country, COUNTRY_REASON, count)
                .await;
        }
    }

    async fn resolve_geo(&self, address: &str) -> Geo {
        let Some(resolver) = &self.geo else {
            return Geo::default();
        };

        match resolver.resolve(address).await {
            Ok(geo) => geo,
            Err(e) => {
                tracing::warn!(address, error = %e, "Geo lookup failed, continuing without location");
                Geo::default()
            }
        }
    }

    async fn is_blocked_opt(&self, dimension: BlockDimension, value: Option<&str>) -> bool {
        match value {
            Some(value) => self.is_blocked(dimension, value).await,
            None => false,
        }
    }

    async fn publish(&self, entry: NotificationEntry) {
        if let Err(e) = self.notifications.notify(&entry).await {
            tracing::warn!(title = %entry.title, error = %e, "Failed to write notification");
        }
    }

    async fn audit(&self, record: AuditRecord) {
        if let Err(e) = self.notifications.record_action(&record).await {
            tracing::warn!(kind = %record.kind, error = %e, "Failed to write audit record");
        }
    }
}

/// Infer the delivery medium of a request: the explicit header first, then
/// known bot user agents, else `web`.
pub fn detect_medium(meta: &RequestMeta) -> String {
    if let Some(declared) = meta.header(MEDIUM_HEADER) {
        let declared = declared.trim().to_lowercase();
        if !declared.is_empty() {
            return declared;
        }
    }

    if let Some(agent) = meta.header("user-agent") {
        let agent = agent.to_lowercase();
        for (signature, medium) in BOT_SIGNATURES {
            if agent.contains(signature) {
                return medium.to_string();
            }
        }
    }

    DEFAULT_MEDIUM.to_string()
}

/// Canonical stored form: countries upper-case, names lower-case.
fn normalize(dimension: BlockDimension, value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    Some(match dimension {
        BlockDimension::Ip => value.to_string(),
        BlockDimension::Country => value.to_uppercase(),
        BlockDimension::Region | BlockDimension::City | BlockDimension::Medium => {
            value.to_lowercase()
        }
    })
}

fn dimension_label(dimension: BlockDimension) -> &'static str {
    match dimension {
        BlockDimension::Ip => "IP",
        BlockDimension::Country => "Country",
        BlockDimension::Region => "Region",
        BlockDimension::City => "City",
        BlockDimension::Medium => "Medium",
    }
}
