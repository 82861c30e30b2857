// Message classifier - rule-based scoring for a single message.
//
// Rules are additive and stack independently. The per-message score feeds
// the points ledger, and the running total decides the suggestion.
//
// Store failures never reject a message: each lookup that fails is logged
// and the affected rule is skipped.

use super::config_overrides::ConfigOverrideStore;
use super::moderation_models::{ClassifyResult, IncomingMessage};
use super::moderation_store::{keys, ModerationStore, StoreError};
use super::points_ledger::PointsLedger;
use regex::Regex;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:https?://|www\.|\bt\.me/|\btelegram\.me/)\S+|\b[a-z0-9-]+\.(?:com|net|org|io|ru|me|gg|xyz|info|biz|click|link)\b",
    )
    .expect("link pattern is valid")
});

// `\B@` skips e-mail addresses; `<@id>` is the platform's mention syntax.
static MENTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\B@\w{2,}|<@[!&]?\d+>").expect("mention pattern is valid")
});

// Mentions, channel links and custom emoji all embed long numeric ids.
static PLATFORM_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(?:@[!&]?|#|a?:\w+:)\d+>").expect("platform token pattern is valid")
});

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\+?\d(?:[\s().-]{0,2}\d){6,}").expect("phone pattern is valid")
});

const MIN_MENTIONS: usize = 3;
const MIN_CAPS_LETTERS: usize = 6;
const CAPS_RATIO: f64 = 0.7;

pub struct Classifier<S: ModerationStore> {
    store: Arc<S>,
    config: Arc<ConfigOverrideStore<S>>,
    ledger: Arc<PointsLedger<S>>,
    blacklist: Vec<String>,
    window: Duration,
}

impl<S: ModerationStore> Classifier<S> {
    pub fn new(
        store: Arc<S>,
        config: Arc<ConfigOverrideStore<S>>,
        ledger: Arc<PointsLedger<S>>,
        blacklist: Vec<String>,
        window: Duration,
    ) -> Self {
        Self {
            store,
            config,
            ledger,
            blacklist: blacklist.into_iter().map(|p| p.to_lowercase()).collect(),
            window,
        }
    }

    /// Score a message and fold it into the actor's running total.
    pub async fn classify(
        &self,
        scope: u64,
        actor: u64,
        message: &IncomingMessage,
    ) -> ClassifyResult {
        let scoring = self.config.resolve().await;
        let weights = scoring.weights;
        let text = message.text.as_str();

        let mut score = 0;
        let mut reasons = Vec::new();

        if message.media_kind.is_link_like() || LINK_RE.is_match(text) {
            score += weights.link;
            reasons.push("contains_link".to_string());
        }

        let mentions = MENTION_RE.find_iter(text).count();
        if mentions >= MIN_MENTIONS {
            score += weights.mentions;
            reasons.push(format!("many_mentions:{}", mentions));
        }

        if PHONE_RE.is_match(&PLATFORM_TOKEN_RE.replace_all(text, " ")) {
            score += weights.phone;
            reasons.push("phone_or_digits".to_string());
        }

        if is_shouting(text) {
            score += weights.caps;
            reasons.push("high_caps".to_string());
        }

        let lowered = text.to_lowercase();
        for phrase in &self.blacklist {
            if lowered.contains(phrase.as_str()) {
                score += weights.blacklist;
                reasons.push(format!("blacklist:{}", phrase));
            }
        }

        if !text.is_empty() {
            match self.remember_message(scope, actor, text).await {
                Ok(true) => {
                    score += weights.repeat;
                    reasons.push("repeated_message".to_string());
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(scope, actor, error = %e, "Repeat check unavailable, skipping rule");
                }
            }
        }

        if message.media_kind.is_attachment() {
            score += weights.attachment;
            reasons.push("has_attachment".to_string());
        }

        let total = match self.ledger.update(scope, actor, score, self.window).await {
            Ok(total) => total,
            Err(e) => {
                // Without history the message still counts on its own.
                tracing::warn!(scope, actor, error = %e, "Points ledger unavailable");
                score
            }
        };

        let suggestion = scoring.thresholds.suggest(total);
        if score > 0 {
            tracing::debug!(scope, actor, score, total, %suggestion, ?reasons, "Message scored");
        }

        ClassifyResult {
            score,
            reasons,
            total,
            suggestion,
        }
    }

    /// Store this text as the actor's last message and report whether it
    /// repeats the previous one.
    async fn remember_message(&self, scope: u64, actor: u64, text: &str) -> Result<bool, StoreError> {
        let key = keys::last_message(scope, actor);
        let previous = self.store.get(&key).await?;
        self.store.set(&key, text, Some(self.window)).await?;
        Ok(previous.as_deref() == Some(text))
    }
}

/// More than 70% uppercase over at least six letters.
fn is_shouting(text: &str) -> bool {
    let letters: Vec<char> = text.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() < MIN_CAPS_LETTERS {
        return false;
    }
    let upper = letters.iter().filter(|c| c.is_uppercase()).count();
    upper as f64 / letters.len() as f64 > CAPS_RATIO
}
