// Message intake - classify, then queue anything worth a human look.

use super::classifier::Classifier;
use super::moderation_models::{
    ClassifyResult, IncomingMessage, NotificationEntry, SuggestedAction, Suggestion,
};
use super::moderation_store::ModerationStore;
use super::notifications::NotificationSink;
use super::suggestion_queue::SuggestionQueue;
use std::sync::Arc;

/// Outcome of one inbound message.
#[derive(Debug, Clone)]
pub struct MessageVerdict {
    pub result: ClassifyResult,
    /// The queued suggestion, if the total crossed a threshold.
    pub suggestion: Option<Suggestion>,
}

pub struct ModerationPipeline<S: ModerationStore> {
    classifier: Arc<Classifier<S>>,
    suggestions: Arc<SuggestionQueue<S>>,
    notifications: Arc<NotificationSink<S>>,
}

impl<S: ModerationStore> ModerationPipeline<S> {
    pub fn new(
        classifier: Arc<Classifier<S>>,
        suggestions: Arc<SuggestionQueue<S>>,
        notifications: Arc<NotificationSink<S>>,
    ) -> Self {
        Self {
            classifier,
            suggestions,
            notifications,
        }
    }

    pub async fn handle_message(
        &self,
        scope: u64,
        actor: u64,
        message: &IncomingMessage,
    ) -> MessageVerdict {
        let result = self.classifier.classify(scope, actor, message).await;

        if result.suggestion == SuggestedAction::None {
            return MessageVerdict {
                result,
                suggestion: None,
            };
        }

        let suggestion = match self.suggestions.push(Suggestion::new(scope, actor, &result)).await {
            Ok(suggestion) => Some(suggestion),
            Err(e) => {
                tracing::warn!(scope, actor, error = %e, "Failed to queue suggestion");
                None
            }
        };

        let entry = NotificationEntry::new(
            format!("Suggested {}", result.suggestion),
            format!(
                "Actor {} in scope {} reached {} points",
                actor, scope, result.total
            ),
        )
        .field("scope", scope)
        .field("actor", actor)
        .field("score", result.score)
        .field("total", result.total)
        .field("reasons", result.reasons.join(", "));

        if let Err(e) = self.notifications.notify(&entry).await {
            tracing::warn!(scope, actor, error = %e, "Failed to write notification");
        }

        MessageVerdict { result, suggestion }
    }
}
