// Discord-specific message intake - translates guild messages into pipeline input.

use crate::core::moderation::{IncomingMessage, MediaKind, ModerationPipeline, ModerationStore};
use poise::serenity_prelude as serenity;

/// Feed a guild message through the moderation pipeline.
///
/// Nothing is enforced here; flagged messages end up in the review queue.
pub async fn handle_message_for_moderation<S: ModerationStore>(
    msg: &serenity::Message,
    pipeline: &ModerationPipeline<S>,
) {
    // Skip bots
    if msg.author.bot {
        return;
    }

    // Only check guild messages
    let Some(guild_id) = msg.guild_id else {
        return;
    };

    let incoming = IncomingMessage::text(msg.content.clone()).with_media(media_kind_of(msg));
    let verdict = pipeline
        .handle_message(guild_id.get(), msg.author.id.get(), &incoming)
        .await;

    let Some(suggestion) = verdict.suggestion else {
        if verdict.result.score > 0 {
            tracing::debug!(
                guild_id = guild_id.get(),
                user_id = msg.author.id.get(),
                score = verdict.result.score,
                total = verdict.result.total,
                reasons = ?verdict.result.reasons,
                "Message scored below review thresholds"
            );
        }
        return;
    };

    tracing::info!(
        guild_id = guild_id.get(),
        user_id = msg.author.id.get(),
        message_id = msg.id.get(),
        id = suggestion.id,
        action = %suggestion.suggested_action,
        total = suggestion.total,
        "Message flagged for review"
    );
}

/// Pick the single most telling media kind for a message.
fn media_kind_of(msg: &serenity::Message) -> MediaKind {
    if !msg.sticker_items.is_empty() {
        return MediaKind::Sticker;
    }
    if let Some(attachment) = msg.attachments.first() {
        return attachment_kind(attachment.content_type.as_deref(), &attachment.filename);
    }
    if msg.embeds.iter().any(|e| e.url.is_some()) {
        return MediaKind::WebPage;
    }
    MediaKind::None
}

fn attachment_kind(content_type: Option<&str>, filename: &str) -> MediaKind {
    let content_type = content_type.unwrap_or_default().to_lowercase();
    if content_type.starts_with("image/") {
        return MediaKind::Photo;
    }
    if content_type.starts_with("video/") {
        return MediaKind::Video;
    }

    let name = filename.to_lowercase();
    if [".png", ".jpg", ".jpeg", ".gif", ".webp"]
        .iter()
        .any(|ext| name.ends_with(ext))
    {
        MediaKind::Photo
    } else if [".mp4", ".mov", ".webm"].iter().any(|ext| name.ends_with(ext)) {
        MediaKind::Video
    } else {
        MediaKind::Document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_kind_prefers_content_type() {
        assert_eq!(attachment_kind(Some("image/png"), "file.bin"), MediaKind::Photo);
        assert_eq!(attachment_kind(Some("video/mp4"), "clip"), MediaKind::Video);
    }

    #[test]
    fn test_attachment_kind_falls_back_to_extension() {
        assert_eq!(attachment_kind(None, "Cat.JPG"), MediaKind::Photo);
        assert_eq!(attachment_kind(None, "clip.webm"), MediaKind::Video);
        assert_eq!(attachment_kind(Some("application/pdf"), "offer.pdf"), MediaKind::Document);
    }
}
