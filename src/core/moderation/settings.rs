// Static moderation settings, read once from the environment at startup.
//
// Hot-reloadable scoring weights and thresholds live in the store instead
// (see config_overrides.rs).

use std::str::FromStr;
use std::time::Duration;

/// Phrases that score against a message when no `MOD_BLACKLIST` is set.
const DEFAULT_BLACKLIST: &[&str] = &["free crypto", "airdrop", "casino", "onlyfans"];

#[derive(Debug, Clone)]
pub struct ModerationSettings {
    /// Sliding window for the points ledger and repeat detection.
    pub window: Duration,
    /// Lowercased phrases matched as substrings.
    pub blacklist: Vec<String>,
    /// How long a resolved weights/thresholds snapshot is reused.
    pub config_cache_ttl: Duration,
    pub guard: GuardSettings,
    pub notification_max_entries: usize,
    pub executor_poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct GuardSettings {
    /// Requests per window before an address escalates.
    pub rate_threshold: i64,
    pub window: Duration,
    pub block_ttl: Duration,
    /// Escalated addresses from one country before the country escalates.
    pub country_threshold: i64,
    pub country_window: Duration,
    /// Block automatically instead of only suggesting a block.
    pub auto_block: bool,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            rate_threshold: 100,
            window: Duration::from_secs(60),
            block_ttl: Duration::from_secs(3600),
            country_threshold: 10,
            country_window: Duration::from_secs(24 * 60 * 60),
            auto_block: true,
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            blacklist: DEFAULT_BLACKLIST.iter().map(|s| s.to_string()).collect(),
            config_cache_ttl: Duration::from_secs(5),
            guard: GuardSettings::default(),
            notification_max_entries: 200,
            executor_poll_interval: Duration::from_secs(2),
        }
    }
}

impl ModerationSettings {
    /// Build settings from environment variables, falling back to defaults
    /// for anything missing or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let guard_defaults = GuardSettings::default();

        let blacklist = std::env::var("MOD_BLACKLIST")
            .ok()
            .map(|raw| parse_phrase_list(&raw))
            .unwrap_or(defaults.blacklist);

        Self {
            window: env_secs("MOD_WINDOW_SECS").unwrap_or(defaults.window),
            blacklist,
            config_cache_ttl: env_secs("MOD_CONFIG_CACHE_SECS")
                .unwrap_or(defaults.config_cache_ttl),
            guard: GuardSettings {
                rate_threshold: env_parse("GUARD_RATE_THRESHOLD")
                    .unwrap_or(guard_defaults.rate_threshold),
                window: env_secs("GUARD_WINDOW_SECS").unwrap_or(guard_defaults.window),
                block_ttl: env_secs("GUARD_BLOCK_TTL_SECS").unwrap_or(guard_defaults.block_ttl),
                country_threshold: env_parse("GUARD_COUNTRY_THRESHOLD")
                    .unwrap_or(guard_defaults.country_threshold),
                country_window: guard_defaults.country_window,
                auto_block: env_parse("GUARD_AUTO_BLOCK").unwrap_or(guard_defaults.auto_block),
            },
            notification_max_entries: env_parse("NOTIFICATION_MAX_ENTRIES")
                .unwrap_or(defaults.notification_max_entries),
            executor_poll_interval: env_secs("EXECUTOR_POLL_SECS")
                .unwrap_or(defaults.executor_poll_interval),
        }
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name).map(Duration::from_secs)
}

/// Split a comma-separated phrase list, dropping blanks.
pub fn parse_phrase_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phrase_list_parsing() {
        let phrases = parse_phrase_list(" Free Crypto, ,casino ,");
        assert_eq!(phrases, vec!["free crypto".to_string(), "casino".to_string()]);
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let settings = ModerationSettings::default();
        assert_eq!(settings.guard.rate_threshold, 100);
        assert_eq!(settings.guard.window, Duration::from_secs(60));
        assert_eq!(settings.guard.block_ttl, Duration::from_secs(3600));
        assert_eq!(settings.guard.country_threshold, 10);
        assert_eq!(settings.notification_max_entries, 200);
        assert_eq!(settings.executor_poll_interval, Duration::from_secs(2));
    }
}
