// Discord layer - commands, event handlers and platform adapters.

#[path = "moderation/mod.rs"]
pub mod moderation;

use crate::core::moderation::{
    AbuseGuard, ConfigOverrideStore, ModerationPipeline, NotificationSink, ReviewConsole,
};
use crate::infra::moderation::SqliteModerationStore;
use std::sync::Arc;

/// Store backing every service the bot runs.
pub type Store = SqliteModerationStore;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Shared state handed to every command and event.
pub struct Data {
    pub pipeline: Arc<ModerationPipeline<Store>>,
    pub review: Arc<ReviewConsole<Store>>,
    pub guard: Arc<AbuseGuard<Store>>,
    pub config: Arc<ConfigOverrideStore<Store>>,
    pub notifications: Arc<NotificationSink<Store>>,
}
