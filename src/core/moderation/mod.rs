// Core moderation module - message scoring, review queues and abuse guard.
// Everything here talks to storage through the ModerationStore port.

pub mod abuse_guard;
pub mod applied_queue;
pub mod classifier;
pub mod config_overrides;
pub mod executor;
pub mod moderation_models;
pub mod moderation_store;
pub mod notifications;
pub mod pipeline;
pub mod points_ledger;
pub mod review;
pub mod settings;
pub mod suggestion_queue;

#[cfg(test)]
pub mod test_support;

pub use abuse_guard::{AbuseGuard, AlertHook, GeoError, GeoResolver};
pub use applied_queue::AppliedActionQueue;
pub use classifier::Classifier;
pub use config_overrides::{ConfigError, ConfigOverrideStore, Thresholds, Weights};
pub use executor::{
    EnforcementError, EnforcementKind, Enforcer, Executor, PostingPermissions,
};
pub use moderation_models::*;
pub use moderation_store::{ModerationStore, StoreError};
pub use notifications::NotificationSink;
pub use pipeline::ModerationPipeline;
pub use points_ledger::PointsLedger;
pub use review::{ReviewConsole, ReviewService};
pub use settings::ModerationSettings;
pub use suggestion_queue::SuggestionQueue;
