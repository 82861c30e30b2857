// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, APIs)
// - `discord/` = Discord-specific adapters (commands, events, enforcement)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start the background workers
// 4. Set up the Discord framework

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::moderation::{
    AbuseGuard, AlertHook, AppliedActionQueue, Classifier, ConfigOverrideStore, Executor,
    GeoResolver, ModerationPipeline, ModerationSettings, NotificationSink, PointsLedger,
    ReviewConsole, ReviewService, SuggestionQueue,
};
use crate::discord::moderation::alerts::DiscordAlertHook;
use crate::discord::moderation::enforcer::DiscordEnforcer;
use crate::discord::moderation::spam_handler::handle_message_for_moderation;
use crate::discord::{Data, Error};
use crate::infra::moderation::{HttpGeoResolver, SqliteModerationStore};
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_DB_PATH: &str = "data/moderation.db";
const PURGE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Event handler for non-command Discord events.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    if let serenity::FullEvent::Message { new_message } = event {
        handle_message_for_moderation(new_message, &*data.pipeline).await;
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Get Discord bot token from environment
    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    let settings = ModerationSettings::from_env();
    let db_path =
        std::env::var("MODERATION_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Every service shares one store. This is the "composition root" where
    // we wire everything together.

    let store = Arc::new(
        SqliteModerationStore::new(&db_path)
            .await
            .expect("Failed to initialize moderation store"),
    );

    // Enforcement and alerts talk to Discord outside of any command context.
    let http = Arc::new(serenity::Http::new(&token));

    let notifications = Arc::new(NotificationSink::new(
        Arc::clone(&store),
        settings.notification_max_entries,
    ));
    let config = Arc::new(ConfigOverrideStore::new(
        Arc::clone(&store),
        settings.config_cache_ttl,
    ));
    let ledger = Arc::new(PointsLedger::new(Arc::clone(&store)));
    let classifier = Arc::new(Classifier::new(
        Arc::clone(&store),
        Arc::clone(&config),
        ledger,
        settings.blacklist.clone(),
        settings.window,
    ));

    let suggestions = Arc::new(SuggestionQueue::new(Arc::clone(&store)));
    let applied = Arc::new(AppliedActionQueue::new(Arc::clone(&store)));
    let pipeline = Arc::new(ModerationPipeline::new(
        classifier,
        Arc::clone(&suggestions),
        Arc::clone(&notifications),
    ));
    let review = Arc::new(ReviewConsole::new(Arc::new(ReviewService::new(
        suggestions,
        Arc::clone(&applied),
    ))));

    let geo: Option<Arc<dyn GeoResolver>> = match std::env::var("GEO_LOOKUP_URL") {
        Ok(url) => match HttpGeoResolver::new(url) {
            Ok(resolver) => Some(Arc::new(resolver)),
            Err(e) => {
                tracing::warn!("Geo lookups disabled: {}", e);
                None
            }
        },
        Err(_) => None,
    };
    let alerts: Option<Arc<dyn AlertHook>> = std::env::var("MOD_ALERT_CHANNEL_ID")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|id| *id != 0)
        .map(|channel_id| {
            Arc::new(DiscordAlertHook::new(Arc::clone(&http), channel_id)) as Arc<dyn AlertHook>
        });
    let guard = Arc::new(AbuseGuard::new(
        Arc::clone(&store),
        Arc::clone(&notifications),
        settings.guard.clone(),
        geo,
        alerts,
    ));

    // Create the data structure that will be shared across all commands
    let data = Data {
        pipeline,
        review,
        guard,
        config,
        notifications,
    };

    // ========================================================================
    // BACKGROUND WORKERS
    // ========================================================================

    // Enforcement executor: drains approved actions into Discord API calls.
    let executor = Executor::new(
        applied,
        Arc::new(DiscordEnforcer::new(Arc::clone(&http))),
        settings.executor_poll_interval,
    );
    tokio::spawn(async move { executor.run().await });

    // Expired counters, block entries and last-message records pile up in
    // SQLite until swept.
    let purge_store = Arc::clone(&store);
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(PURGE_INTERVAL).await;
            match purge_store.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => tracing::debug!(removed, "Purged expired moderation keys"),
                Err(e) => tracing::warn!("Moderation key purge failed: {}", e),
            }
        }
    });

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![
                discord::moderation::commands::review(),
                discord::moderation::commands::block(),
                discord::moderation::commands::unblock(),
                discord::moderation::commands::blocklist(),
                discord::moderation::commands::guardcheck(),
                discord::moderation::commands::modlog(),
                discord::moderation::commands::modconfig(),
            ],
            // Event handler for messages and other events
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                tracing::info!("Bot is starting up...");

                // Register slash commands globally (can take up to an hour to propagate)
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;

                tracing::info!("Commands registered, moderation bot is ready");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
