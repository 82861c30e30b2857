// Moderation slash commands - review queue, blocklists and scoring config.
//
// Thin wrappers: parse Discord input, call the core service, format a reply.

use crate::core::moderation::{BlockDimension, ConfigError, RequestMeta, Thresholds, Weights};
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Discord caps messages at 2000 characters; leave room for code fences.
const REPLY_CHUNK: usize = 1900;
const MAX_LOG_ENTRIES: usize = 20;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum DimensionChoice {
    #[name = "IP address"]
    Ip,
    #[name = "Country"]
    Country,
    #[name = "Region"]
    Region,
    #[name = "City"]
    City,
    #[name = "Medium"]
    Medium,
}

impl From<DimensionChoice> for BlockDimension {
    fn from(value: DimensionChoice) -> Self {
        match value {
            DimensionChoice::Ip => BlockDimension::Ip,
            DimensionChoice::Country => BlockDimension::Country,
            DimensionChoice::Region => BlockDimension::Region,
            DimensionChoice::City => BlockDimension::City,
            DimensionChoice::Medium => BlockDimension::Medium,
        }
    }
}

/// Review pending moderation suggestions.
///
/// Commands: `list [n]`, `pop`, `apply <index> <ban|mute|warn|ignore>`, `help`.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn review(
    ctx: Context<'_>,
    #[description = "list [n] | pop | apply <index> <action> | help"] command: Option<String>,
) -> Result<(), Error> {
    let line = command.as_deref().unwrap_or("help");
    let reply = ctx.data().review.handle(ctx.author().id.get(), line).await;

    for chunk in split_reply(&reply, REPLY_CHUNK) {
        ctx.say(format!("```\n{}\n```", chunk)).await?;
    }
    Ok(())
}

/// Block a value in one of the abuse blocklists.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn block(
    ctx: Context<'_>,
    #[description = "Which blocklist"] dimension: DimensionChoice,
    #[description = "Value to block (address, country code, name...)"] value: String,
    #[description = "Reason (default: manual)"] reason: Option<String>,
) -> Result<(), Error> {
    let dimension = BlockDimension::from(dimension);

    if ctx
        .data()
        .guard
        .block(dimension, &value, reason.as_deref())
        .await
    {
        ctx.say(format!("🚫 Blocked {} `{}`.", dimension, value.trim()))
            .await?;
    } else {
        ctx.say(format!("❌ Could not block {} `{}`.", dimension, value.trim()))
            .await?;
    }
    Ok(())
}

/// Remove a value from one of the abuse blocklists.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn unblock(
    ctx: Context<'_>,
    #[description = "Which blocklist"] dimension: DimensionChoice,
    #[description = "Value to unblock"] value: String,
) -> Result<(), Error> {
    let dimension = BlockDimension::from(dimension);

    if ctx.data().guard.unblock(dimension, &value).await {
        ctx.say(format!("✅ Unblocked {} `{}`.", dimension, value.trim()))
            .await?;
    } else {
        ctx.say(format!("❌ Could not unblock {} `{}`.", dimension, value.trim()))
            .await?;
    }
    Ok(())
}

/// Show the entries of a blocklist.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn blocklist(
    ctx: Context<'_>,
    #[description = "Which blocklist"] dimension: DimensionChoice,
) -> Result<(), Error> {
    let dimension = BlockDimension::from(dimension);
    let entries = ctx.data().guard.list_blocked(dimension).await?;

    let description = if entries.is_empty() {
        "Nothing blocked.".to_string()
    } else {
        entries
            .iter()
            .map(|(value, entry)| {
                format!(
                    "• `{}` - {} (<t:{}:R>)",
                    value,
                    entry.reason,
                    entry.timestamp.timestamp()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = serenity::CreateEmbed::new()
        .title(format!("🚫 Blocked {} values", dimension))
        .description(truncate(&description, 4000))
        .color(0xC0392B)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} entr{}",
            entries.len(),
            if entries.len() == 1 { "y" } else { "ies" }
        )));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Run an address through the abuse guard and show what it reports.
///
/// Counts as a real request against the address' rate window.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn guardcheck(
    ctx: Context<'_>,
    #[description = "Source address"] address: String,
    #[description = "User-Agent header"] user_agent: Option<String>,
    #[description = "Declared client medium"] medium: Option<String>,
) -> Result<(), Error> {
    let mut meta = RequestMeta::new();
    if let Some(agent) = user_agent {
        meta = meta.with_header("user-agent", agent);
    }
    if let Some(medium) = medium {
        meta = meta.with_header("x-client-medium", medium);
    }

    let outcome = ctx.data().guard.record(address.trim(), &meta).await;
    let flag = |blocked: bool| if blocked { "🚫 blocked" } else { "✅ allowed" };
    let or_unknown = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());

    let embed = serenity::CreateEmbed::new()
        .title(format!("🛡️ Guard check for `{}`", address.trim()))
        .color(if outcome.blocked { 0xC0392B } else { 0x2ECC71 })
        .field("Requests in window", outcome.count.to_string(), true)
        .field("Medium", format!("{} ({})", outcome.medium, flag(outcome.blocked_medium)), true)
        .field("Address", flag(outcome.blocked), true)
        .field(
            "Country",
            format!("{} ({})", or_unknown(&outcome.geo.country), flag(outcome.country_blocked)),
            true,
        )
        .field(
            "Region",
            format!("{} ({})", or_unknown(&outcome.geo.region), flag(outcome.blocked_region)),
            true,
        )
        .field(
            "City",
            format!("{} ({})", or_unknown(&outcome.geo.city), flag(outcome.blocked_city)),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Recent moderation notifications and audit records.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn modlog(
    ctx: Context<'_>,
    #[description = "How many entries (default 10, max 20)"] count: Option<u32>,
) -> Result<(), Error> {
    let limit = (count.unwrap_or(10) as usize).clamp(1, MAX_LOG_ENTRIES);
    let notifications = ctx.data().notifications.recent(limit).await?;
    let actions = ctx.data().notifications.recent_actions(limit).await?;

    let notes = if notifications.is_empty() {
        "None".to_string()
    } else {
        notifications
            .iter()
            .map(|n| format!("<t:{}:R> **{}** - {}", n.timestamp.timestamp(), n.title, n.text))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let audit = if actions.is_empty() {
        "None".to_string()
    } else {
        actions
            .iter()
            .map(|a| {
                format!(
                    "<t:{}:R> `{}` {} ({})",
                    a.timestamp.timestamp(),
                    a.kind,
                    a.target,
                    a.reason
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let embed = serenity::CreateEmbed::new()
        .title("📋 Moderation log")
        .color(serenity::Color::BLURPLE)
        .field("Notifications", truncate(&notes, 1024), false)
        .field("Audit", truncate(&audit, 1024), false);

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Scoring weights and action thresholds.
#[poise::command(
    slash_command,
    guild_only,
    required_permissions = "ADMINISTRATOR",
    subcommands("show", "weight", "threshold", "reset")
)]
pub async fn modconfig(_ctx: Context<'_>) -> Result<(), Error> {
    Ok(())
}

/// Show the effective scoring configuration.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn show(ctx: Context<'_>) -> Result<(), Error> {
    let scoring = ctx.data().config.resolve().await;
    let w = scoring.weights;
    let t = scoring.thresholds;

    let embed = serenity::CreateEmbed::new()
        .title("⚙️ Moderation scoring")
        .color(serenity::Color::BLURPLE)
        .field(
            "Weights",
            format!(
                "link: {}\nmentions: {}\nphone: {}\ncaps: {}\nblacklist: {}\nrepeat: {}\nattachment: {}",
                w.link, w.mentions, w.phone, w.caps, w.blacklist, w.repeat, w.attachment
            ),
            true,
        )
        .field(
            "Thresholds",
            format!("warn: {}\nmute: {}\nban: {}", t.warn, t.mute, t.ban),
            true,
        );

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Override one rule weight.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn weight(
    ctx: Context<'_>,
    #[description = "Rule name (link, mentions, phone, caps, blacklist, repeat, attachment)"]
    key: String,
    #[description = "Points for one hit"] value: i64,
) -> Result<(), Error> {
    match ctx.data().config.set_weight(key.trim(), value).await {
        Ok(()) => {
            ctx.say(format!("✅ Weight `{}` set to {}.", key.trim(), value))
                .await?;
        }
        Err(ConfigError::UnknownKey(k)) => {
            ctx.say(format!(
                "❌ Unknown weight `{}`. Valid: {}",
                k,
                Weights::KEYS.join(", ")
            ))
            .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Override one action threshold.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn threshold(
    ctx: Context<'_>,
    #[description = "Level (warn, mute, ban)"] key: String,
    #[description = "Running total needed"] value: i64,
) -> Result<(), Error> {
    match ctx.data().config.set_threshold(key.trim(), value).await {
        Ok(()) => {
            ctx.say(format!("✅ Threshold `{}` set to {}.", key.trim(), value))
                .await?;
        }
        Err(ConfigError::UnknownKey(k)) => {
            ctx.say(format!(
                "❌ Unknown threshold `{}`. Valid: {}",
                k,
                Thresholds::KEYS.join(", ")
            ))
            .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

/// Drop all overrides and go back to the defaults.
#[poise::command(slash_command, guild_only, required_permissions = "ADMINISTRATOR")]
pub async fn reset(ctx: Context<'_>) -> Result<(), Error> {
    ctx.data().config.clear_overrides().await?;
    ctx.say("♻️ Scoring overrides cleared.").await?;
    Ok(())
}

/// Split on line boundaries into pieces of at most `limit` bytes.
fn split_reply(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        let line = truncate(line, limit);
        if !current.is_empty() && current.len() + 1 + line.len() > limit {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }
    if !current.is_empty() || chunks.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Cut to at most `max` bytes on a char boundary.
fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max.saturating_sub(3);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_reply_respects_limit() {
        let text = (0..50)
            .map(|i| format!("{}. [warn] scope=1 actor={}", i, i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_reply(&text, 200);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.len() <= 200));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn test_split_reply_short_text() {
        assert_eq!(split_reply("Queue is empty.", 1900), vec!["Queue is empty."]);
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("short", 10), "short");
        let cut = truncate("ééééé", 6);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= 6);
    }
}
