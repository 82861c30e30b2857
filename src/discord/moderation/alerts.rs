// Posts block suggestions into a staff channel.

use crate::core::moderation::{AlertHook, NotificationEntry};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

pub struct DiscordAlertHook {
    http: Arc<serenity::Http>,
    channel_id: serenity::ChannelId,
}

impl DiscordAlertHook {
    pub fn new(http: Arc<serenity::Http>, channel_id: u64) -> Self {
        Self {
            http,
            channel_id: serenity::ChannelId::new(channel_id),
        }
    }
}

#[async_trait]
impl AlertHook for DiscordAlertHook {
    async fn alert(&self, entry: &NotificationEntry) {
        let embed = build_alert_embed(entry);
        if let Err(err) = self
            .channel_id
            .send_message(&*self.http, serenity::CreateMessage::new().embed(embed))
            .await
        {
            tracing::warn!(
                channel_id = self.channel_id.get(),
                title = %entry.title,
                error = %err,
                "Failed to send moderation alert"
            );
        }
    }
}

fn build_alert_embed(entry: &NotificationEntry) -> serenity::CreateEmbed {
    let mut embed = serenity::CreateEmbed::new()
        .title(format!("🚨 {}", entry.title))
        .description(&entry.text)
        .color(0xE67E22)
        .timestamp(
            serenity::Timestamp::from_unix_timestamp(entry.timestamp.timestamp())
                .unwrap_or_else(|_| serenity::Timestamp::now()),
        );

    for (name, value) in &entry.fields {
        embed = embed.field(name, value, true);
    }
    embed
}
