// Admin review of pending suggestions.
//
// `ReviewService` is the typed API (list / pop / apply). `ReviewConsole` wraps
// it in the plain-text command language used from chat:
//
//   list [n]                               show the first n suggestions
//   pop                                    discard the head of the queue
//   apply <index> <ban|mute|warn|ignore>   approve a suggestion
//   help
//
// Review assumes one admin session at a time. Two admins applying the same
// index concurrently can both succeed.

use super::applied_queue::AppliedActionQueue;
use super::moderation_models::{AppliedAction, ReviewAction, Suggestion};
use super::moderation_store::{ModerationStore, StoreError};
use super::suggestion_queue::{PendingSuggestion, SuggestionQueue};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_LIST_LIMIT: usize = 10;
const MAX_LIST_LIMIT: usize = 50;

const APPLY_USAGE: &str = "Usage: apply <index> <ban|mute|warn|ignore>";
const LIST_USAGE: &str = "Usage: list [n]";

const HELP_TEXT: &str = "Moderation review commands:\n\
    list [n] - show the first n pending suggestions (default 10)\n\
    pop - discard the oldest pending suggestion\n\
    apply <index> <ban|mute|warn|ignore> - approve a suggestion for enforcement\n\
    help - show this message";

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("Invalid action '{0}'. Usage: apply <index> <ban|mute|warn|ignore>")]
    InvalidAction(String),

    #[error("Suggestion #{0} not found.")]
    NotFound(usize),

    #[error("Review queue unavailable: {0}")]
    Store(#[from] StoreError),
}

pub struct ReviewService<S: ModerationStore> {
    suggestions: Arc<SuggestionQueue<S>>,
    applied: Arc<AppliedActionQueue<S>>,
}

impl<S: ModerationStore> ReviewService<S> {
    pub fn new(suggestions: Arc<SuggestionQueue<S>>, applied: Arc<AppliedActionQueue<S>>) -> Self {
        Self {
            suggestions,
            applied,
        }
    }

    pub async fn list(&self, limit: usize) -> Result<Vec<PendingSuggestion>, ReviewError> {
        Ok(self.suggestions.list(limit).await?)
    }

    /// Discard the head of the queue. `None` means the queue was empty.
    pub async fn pop(&self) -> Result<Option<Suggestion>, ReviewError> {
        Ok(self.suggestions.pop().await?)
    }

    /// Approve the suggestion shown at `display_index` (1-based).
    pub async fn apply(
        &self,
        display_index: usize,
        action: &str,
        applier: u64,
    ) -> Result<AppliedAction, ReviewError> {
        let action: ReviewAction = action.parse().map_err(ReviewError::InvalidAction)?;

        let suggestion = match display_index.checked_sub(1) {
            Some(position) => self.suggestions.get_at(position).await?,
            None => None,
        }
        .ok_or(ReviewError::NotFound(display_index))?;

        let applied = AppliedAction {
            applier,
            action,
            suggestion,
            timestamp: Utc::now(),
        };
        self.applied.push(&applied).await?;

        // The action is queued from here on; a failed removal must not be
        // reported as a failed apply.
        match self.suggestions.remove(applied.suggestion.id).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!(
                id = applied.suggestion.id,
                "Suggestion was already removed by another reviewer"
            ),
            Err(e) => tracing::warn!(
                id = applied.suggestion.id,
                error = %e,
                "Applied suggestion could not be removed from the queue"
            ),
        }

        tracing::info!(
            applier,
            action = %applied.action,
            scope = applied.suggestion.scope,
            actor = applied.suggestion.actor,
            "Suggestion applied"
        );
        Ok(applied)
    }
}

/// Text front-end for [`ReviewService`].
pub struct ReviewConsole<S: ModerationStore> {
    review: Arc<ReviewService<S>>,
}

impl<S: ModerationStore> ReviewConsole<S> {
    pub fn new(review: Arc<ReviewService<S>>) -> Self {
        Self { review }
    }

    /// Run one command line on behalf of `applier` and render the reply.
    pub async fn handle(&self, applier: u64, line: &str) -> String {
        let args: Vec<&str> = line.split_whitespace().collect();
        let result = match args.as_slice() {
            [] | ["help"] => Ok(HELP_TEXT.to_string()),
            ["list"] => self.list(DEFAULT_LIST_LIMIT).await,
            ["list", n] => match n.parse::<usize>() {
                Ok(n) if n > 0 => self.list(n.min(MAX_LIST_LIMIT)).await,
                _ => Ok(LIST_USAGE.to_string()),
            },
            ["pop"] => self.pop().await,
            ["apply", index, action] => match index.parse::<usize>() {
                Ok(index) => self.apply(applier, index, action).await,
                Err(_) => Ok(APPLY_USAGE.to_string()),
            },
            ["apply", ..] => Ok(APPLY_USAGE.to_string()),
            [other, ..] => Ok(format!("Unknown command '{}'.\n{}", other, HELP_TEXT)),
        };

        result.unwrap_or_else(|e| e.to_string())
    }

    async fn list(&self, limit: usize) -> Result<String, ReviewError> {
        let pending = self.review.list(limit).await?;
        if pending.is_empty() {
            return Ok("Queue is empty.".to_string());
        }

        let lines: Vec<String> = pending.iter().map(PendingSuggestion::display_line).collect();
        Ok(format!("Pending suggestions:\n{}", lines.join("\n")))
    }

    async fn pop(&self) -> Result<String, ReviewError> {
        Ok(match self.review.pop().await? {
            Some(s) => format!(
                "Discarded [{}] suggestion for actor {} in scope {}.",
                s.suggested_action, s.actor, s.scope
            ),
            None => "Queue is empty.".to_string(),
        })
    }

    async fn apply(&self, applier: u64, index: usize, action: &str) -> Result<String, ReviewError> {
        let applied = self.review.apply(index, action, applier).await?;
        Ok(format!(
            "Applied {} to actor {} in scope {} (suggestion #{}).",
            applied.action, applied.suggestion.actor, applied.suggestion.scope, index
        ))
    }
}
