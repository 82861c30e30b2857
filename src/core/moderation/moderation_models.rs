// Moderation domain models - data structures shared by the pipeline.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts platform messages into these and back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// MESSAGES & SCORING
// ============================================================================

/// What kind of media accompanied a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    None,
    Photo,
    Video,
    Sticker,
    Document,
    WebPage,
    Other,
}

impl MediaKind {
    /// Media that the classifier treats as a link.
    pub fn is_link_like(self) -> bool {
        matches!(self, MediaKind::WebPage | MediaKind::Document)
    }

    /// Media that the classifier treats as an attachment.
    pub fn is_attachment(self) -> bool {
        matches!(self, MediaKind::Photo | MediaKind::Video | MediaKind::Sticker)
    }
}

/// A message as seen by the classifier.
#[derive(Debug, Clone, Default)]
pub struct IncomingMessage {
    pub text: String,
    pub media_kind: MediaKind,
}

impl IncomingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            media_kind: MediaKind::None,
        }
    }

    pub fn with_media(mut self, media_kind: MediaKind) -> Self {
        self.media_kind = media_kind;
        self
    }
}

/// Recommendation derived from an actor's running total.
///
/// Variants are ordered by severity so thresholds can be compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestedAction {
    None,
    Warn,
    Mute,
    Ban,
}

impl fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestedAction::None => write!(f, "none"),
            SuggestedAction::Warn => write!(f, "warn"),
            SuggestedAction::Mute => write!(f, "mute"),
            SuggestedAction::Ban => write!(f, "ban"),
        }
    }
}

/// Output of classifying a single message.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifyResult {
    /// Points awarded to this message alone.
    pub score: i64,
    /// Machine-readable rule hits, e.g. `contains_link` or `blacklist:casino`.
    pub reasons: Vec<String>,
    /// Running total for the actor within the window, including this score.
    pub total: i64,
    pub suggestion: SuggestedAction,
}

/// One scored event in an actor's ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unix timestamp in milliseconds.
    pub at_ms: i64,
    pub points: i64,
}

// ============================================================================
// REVIEW
// ============================================================================

/// A queued, not-yet-enforced moderation recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// Assigned by the queue on push. Zero until then.
    #[serde(default)]
    pub id: u64,
    pub scope: u64,
    pub actor: u64,
    pub suggested_action: SuggestedAction,
    pub score: i64,
    #[serde(default)]
    pub total: i64,
    pub reasons: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Suggestion {
    pub fn new(scope: u64, actor: u64, result: &ClassifyResult) -> Self {
        Self {
            id: 0,
            scope,
            actor,
            suggested_action: result.suggestion,
            score: result.score,
            total: result.total,
            reasons: result.reasons.clone(),
            timestamp: Utc::now(),
        }
    }
}

/// What an admin decided to do with a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Ban,
    Mute,
    Warn,
    Ignore,
    /// Anything a newer or older writer put in the queue that we don't know.
    #[serde(other)]
    Unknown,
}

impl FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ban" => Ok(ReviewAction::Ban),
            "mute" => Ok(ReviewAction::Mute),
            "warn" => Ok(ReviewAction::Warn),
            "ignore" => Ok(ReviewAction::Ignore),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewAction::Ban => write!(f, "ban"),
            ReviewAction::Mute => write!(f, "mute"),
            ReviewAction::Warn => write!(f, "warn"),
            ReviewAction::Ignore => write!(f, "ignore"),
            ReviewAction::Unknown => write!(f, "unknown"),
        }
    }
}

/// An admin-approved suggestion awaiting enforcement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedAction {
    pub applier: u64,
    pub action: ReviewAction,
    pub suggestion: Suggestion,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// ABUSE GUARD
// ============================================================================

/// One of the independently managed blocklists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockDimension {
    Ip,
    Country,
    Region,
    City,
    Medium,
}

impl BlockDimension {
    pub fn as_str(self) -> &'static str {
        match self {
            BlockDimension::Ip => "ip",
            BlockDimension::Country => "country",
            BlockDimension::Region => "region",
            BlockDimension::City => "city",
            BlockDimension::Medium => "medium",
        }
    }
}

impl fmt::Display for BlockDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata stored alongside a blocked value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Resolved location of an address. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Geo {
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
}

impl Geo {
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.country.is_none() && self.region.is_none() && self.city.is_none()
    }
}

/// Request metadata used for medium detection.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    headers: HashMap<String, String>,
}

impl RequestMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Header names are case-insensitive.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Everything `AbuseGuard::record` learned about one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordOutcome {
    /// Requests seen from this address in the current window.
    pub count: i64,
    pub geo: Geo,
    pub medium: String,
    pub blocked: bool,
    pub country_blocked: bool,
    pub blocked_region: bool,
    pub blocked_city: bool,
    pub blocked_medium: bool,
}

// ============================================================================
// NOTIFICATIONS
// ============================================================================

/// Entry in the bounded notification log read by dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEntry {
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEntry {
    pub fn new(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            text: text.into(),
            fields: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn field(mut self, name: &str, value: impl ToString) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }
}

/// Audit trail record for block decisions and escalations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// e.g. `block_ip`, `suggest_block_country`, `unblock_city`.
    pub kind: String,
    pub target: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(kind: impl Into<String>, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: target.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}
