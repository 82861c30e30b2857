// Discord enforcement - turns approved bans and mutes into API calls.

use crate::core::moderation::{EnforcementError, EnforcementKind, Enforcer, PostingPermissions};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Longest timeout Discord accepts.
const MAX_TIMEOUT_SECS: i64 = 28 * 24 * 60 * 60;
/// Kept off the limit so a fast local clock is not rejected.
const TIMEOUT_MARGIN_SECS: i64 = 5 * 60;
const BAN_REASON: &str = "Approved in moderation review";

/// Scope is a guild id, actor is a user id.
pub struct DiscordEnforcer {
    http: Arc<serenity::Http>,
}

impl DiscordEnforcer {
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Enforcer for DiscordEnforcer {
    async fn enforce(
        &self,
        kind: EnforcementKind,
        scope: u64,
        actor: u64,
    ) -> Result<String, EnforcementError> {
        if scope == 0 || actor == 0 {
            return Err(EnforcementError::Rejected(format!(
                "invalid target guild={} user={}",
                scope, actor
            )));
        }
        let guild_id = serenity::GuildId::new(scope);
        let user_id = serenity::UserId::new(actor);

        match kind {
            EnforcementKind::Ban => {
                guild_id
                    .ban_with_reason(&*self.http, user_id, 0, BAN_REASON)
                    .await
                    .map_err(rejected)?;
                Ok(format!("banned {} from {}", user_id, guild_id))
            }
            EnforcementKind::Restrict(permissions) => {
                // Discord has no per-permission mute for a member, so any
                // restriction becomes a full timeout.
                if permissions != PostingPermissions::NONE {
                    tracing::debug!(?permissions, "Partial restriction mapped to timeout");
                }

                let until = serenity::Timestamp::from_unix_timestamp(timeout_until(
                    chrono::Utc::now().timestamp(),
                ))
                .map_err(|e| EnforcementError::Rejected(e.to_string()))?;

                let member = guild_id
                    .edit_member(
                        &*self.http,
                        user_id,
                        serenity::EditMember::new().disable_communication_until_datetime(until),
                    )
                    .await
                    .map_err(rejected)?;
                Ok(format!(
                    "timed out {} in {} until {}",
                    member.user.id, guild_id, until
                ))
            }
        }
    }
}

fn timeout_until(now_secs: i64) -> i64 {
    now_secs + MAX_TIMEOUT_SECS - TIMEOUT_MARGIN_SECS
}

fn rejected(e: serenity::Error) -> EnforcementError {
    match e {
        serenity::Error::Http(http) => EnforcementError::Rejected(http.to_string()),
        other => EnforcementError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_stays_under_platform_limit() {
        let now = 1_700_000_000;
        let until = timeout_until(now);
        assert!(until < now + MAX_TIMEOUT_SECS);
        assert!(until > now + 27 * 24 * 60 * 60);
    }
}
