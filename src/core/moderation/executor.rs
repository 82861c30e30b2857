// Enforcement executor - drains the applied-action queue.
//
// The executor pops one approved action at a time and turns it into a call
// against the chat platform. Pops are atomic, so several executors never
// handle the same item, but a popped item is gone for good: a failed
// enforcement is logged and not retried.

use super::applied_queue::AppliedActionQueue;
use super::moderation_models::{AppliedAction, ReviewAction};
use super::moderation_store::{ModerationStore, StoreError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// ENFORCEMENT PORT
// ============================================================================

/// Posting rights applied to a restricted member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostingPermissions {
    pub send_messages: bool,
    pub send_media: bool,
    pub add_reactions: bool,
    pub create_threads: bool,
}

impl PostingPermissions {
    /// The fixed set used for mutes: nothing may be posted.
    pub const NONE: PostingPermissions = PostingPermissions {
        send_messages: false,
        send_media: false,
        add_reactions: false,
        create_threads: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnforcementKind {
    Ban,
    Restrict(PostingPermissions),
}

impl fmt::Display for EnforcementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnforcementKind::Ban => write!(f, "ban"),
            EnforcementKind::Restrict(_) => write!(f, "restrict"),
        }
    }
}

#[derive(Debug, Error)]
pub enum EnforcementError {
    /// The platform answered but refused the call.
    #[error("Platform rejected enforcement: {0}")]
    Rejected(String),

    /// The platform could not be reached.
    #[error("Platform unavailable: {0}")]
    Unavailable(String),
}

/// Makes an approved action effective on the chat platform.
#[async_trait]
pub trait Enforcer: Send + Sync {
    /// Returns the platform's raw response on success.
    async fn enforce(
        &self,
        kind: EnforcementKind,
        scope: u64,
        actor: u64,
    ) -> Result<String, EnforcementError>;
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// What the executor did with one popped action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Enforced(EnforcementKind),
    EnforcementFailed(EnforcementKind),
    /// warn / ignore: recorded in the log only.
    LoggedOnly(ReviewAction),
    UnknownAction,
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Enforced(kind) => write!(f, "enforced {}", kind),
            Dispatch::EnforcementFailed(kind) => write!(f, "failed to enforce {}", kind),
            Dispatch::LoggedOnly(action) => write!(f, "logged {}", action),
            Dispatch::UnknownAction => f.write_str("skipped unknown action"),
        }
    }
}

pub struct Executor<S: ModerationStore, E: Enforcer> {
    queue: Arc<AppliedActionQueue<S>>,
    enforcer: Arc<E>,
    poll_interval: Duration,
}

impl<S: ModerationStore, E: Enforcer> Executor<S, E> {
    pub fn new(queue: Arc<AppliedActionQueue<S>>, enforcer: Arc<E>, poll_interval: Duration) -> Self {
        Self {
            queue,
            enforcer,
            poll_interval,
        }
    }

    /// Poll forever. Sleeps only while the queue is empty or unreachable.
    pub async fn run(&self) {
        tracing::info!(
            poll_secs = self.poll_interval.as_secs_f64(),
            "Enforcement executor started"
        );

        loop {
            match self.poll_once().await {
                Ok(Some(dispatch)) => {
                    tracing::debug!(%dispatch, "Applied action processed");
                    continue;
                }
                Ok(None) => {}
                Err(StoreError::Corrupt { key, message }) => {
                    // The bad entry was consumed by the pop; move on.
                    tracing::error!(key = %key, error = %message, "Dropped unreadable applied action");
                    continue;
                }
                Err(e) => tracing::error!(error = %e, "Failed to poll applied actions"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Pop and dispatch a single action. `Ok(None)` means the queue was empty.
    pub async fn poll_once(&self) -> Result<Option<Dispatch>, StoreError> {
        let Some(applied) = self.queue.pop().await? else {
            return Ok(None);
        };
        Ok(Some(self.dispatch(&applied).await))
    }

    async fn dispatch(&self, applied: &AppliedAction) -> Dispatch {
        let scope = applied.suggestion.scope;
        let actor = applied.suggestion.actor;

        let kind = match applied.action {
            ReviewAction::Ban => EnforcementKind::Ban,
            ReviewAction::Mute => EnforcementKind::Restrict(PostingPermissions::NONE),
            ReviewAction::Warn | ReviewAction::Ignore => {
                tracing::info!(
                    scope,
                    actor,
                    action = %applied.action,
                    applier = applied.applier,
                    "Applied action needs no enforcement"
                );
                return Dispatch::LoggedOnly(applied.action);
            }
            ReviewAction::Unknown => {
                tracing::warn!(scope, actor, applier = applied.applier, "Skipping unknown applied action");
                return Dispatch::UnknownAction;
            }
        };

        match self.enforcer.enforce(kind, scope, actor).await {
            Ok(raw) => {
                tracing::info!(scope, actor, %kind, response = %raw, "Enforcement succeeded");
                Dispatch::Enforced(kind)
            }
            Err(e) => {
                tracing::error!(scope, actor, %kind, error = %e, "Enforcement failed, action dropped");
                Dispatch::EnforcementFailed(kind)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{ClassifyResult, SuggestedAction, Suggestion};
    use crate::core::moderation::moderation_store::keys;
    use crate::infra::moderation::InMemoryModerationStore;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Records every call and answers with a fixed outcome.
    struct RecordingEnforcer {
        calls: Mutex<Vec<(EnforcementKind, u64, u64)>>,
        succeed: bool,
    }

    impl RecordingEnforcer {
        fn new(succeed: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                succeed,
            }
        }

        fn calls(&self) -> Vec<(EnforcementKind, u64, u64)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Enforcer for RecordingEnforcer {
        async fn enforce(
            &self,
            kind: EnforcementKind,
            scope: u64,
            actor: u64,
        ) -> Result<String, EnforcementError> {
            self.calls.lock().unwrap().push((kind, scope, actor));
            if self.succeed {
                Ok("{\"ok\":true}".to_string())
            } else {
                Err(EnforcementError::Rejected("{\"ok\":false}".to_string()))
            }
        }
    }

    fn applied(action: ReviewAction) -> AppliedAction {
        let result = ClassifyResult {
            score: 40,
            reasons: vec![],
            total: 130,
            suggestion: SuggestedAction::Ban,
        };
        AppliedAction {
            applier: 1,
            action,
            suggestion: Suggestion::new(10, 20, &result),
            timestamp: Utc::now(),
        }
    }

    fn executor(
        succeed: bool,
    ) -> (
        Arc<InMemoryModerationStore>,
        Arc<AppliedActionQueue<InMemoryModerationStore>>,
        Arc<RecordingEnforcer>,
        Executor<InMemoryModerationStore, RecordingEnforcer>,
    ) {
        let store = Arc::new(InMemoryModerationStore::new());
        let queue = Arc::new(AppliedActionQueue::new(Arc::clone(&store)));
        let enforcer = Arc::new(RecordingEnforcer::new(succeed));
        let executor = Executor::new(
            Arc::clone(&queue),
            Arc::clone(&enforcer),
            Duration::from_millis(10),
        );
        (store, queue, enforcer, executor)
    }

    #[tokio::test]
    async fn test_ban_calls_enforce_once() {
        let (_, queue, enforcer, executor) = executor(true);
        queue.push(&applied(ReviewAction::Ban)).await.unwrap();

        let dispatch = executor.poll_once().await.unwrap();

        assert_eq!(dispatch, Some(Dispatch::Enforced(EnforcementKind::Ban)));
        assert_eq!(enforcer.calls(), vec![(EnforcementKind::Ban, 10, 20)]);
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_enforcement_is_not_requeued() {
        let (_, queue, enforcer, executor) = executor(false);
        queue.push(&applied(ReviewAction::Ban)).await.unwrap();

        let dispatch = executor.poll_once().await.unwrap();

        assert_eq!(dispatch, Some(Dispatch::EnforcementFailed(EnforcementKind::Ban)));
        assert_eq!(enforcer.calls().len(), 1);
        assert_eq!(queue.len().await.unwrap(), 0);
        assert_eq!(executor.poll_once().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_mute_restricts_posting() {
        let (_, queue, enforcer, executor) = executor(true);
        queue.push(&applied(ReviewAction::Mute)).await.unwrap();

        executor.poll_once().await.unwrap();

        assert_eq!(
            enforcer.calls(),
            vec![(EnforcementKind::Restrict(PostingPermissions::NONE), 10, 20)]
        );
    }

    #[tokio::test]
    async fn test_warn_and_ignore_only_log() {
        let (_, queue, enforcer, executor) = executor(true);
        queue.push(&applied(ReviewAction::Warn)).await.unwrap();
        queue.push(&applied(ReviewAction::Ignore)).await.unwrap();

        assert_eq!(
            executor.poll_once().await.unwrap(),
            Some(Dispatch::LoggedOnly(ReviewAction::Warn))
        );
        assert_eq!(
            executor.poll_once().await.unwrap(),
            Some(Dispatch::LoggedOnly(ReviewAction::Ignore))
        );
        assert!(enforcer.calls().is_empty());
    }

    #[test]
    fn test_dispatch_display() {
        assert_eq!(Dispatch::Enforced(EnforcementKind::Ban).to_string(), "enforced ban");
        assert_eq!(
            Dispatch::LoggedOnly(ReviewAction::Warn).to_string(),
            "logged warn"
        );
        assert_eq!(Dispatch::UnknownAction.to_string(), "skipped unknown action");
    }

    #[tokio::test]
    async fn test_unknown_action_skipped() {
        let (store, _, enforcer, executor) = executor(true);
        let raw = serde_json::to_string(&applied(ReviewAction::Warn))
            .unwrap()
            .replace("\"action\":\"warn\"", "\"action\":\"kick\"");
        store.list_push(keys::APPLIED_ACTIONS, &raw).await.unwrap();

        assert_eq!(executor.poll_once().await.unwrap(), Some(Dispatch::UnknownAction));
        assert!(enforcer.calls().is_empty());
    }

    #[tokio::test]
    async fn test_run_loop_drains_queue() {
        let (_, queue, enforcer, executor) = executor(true);
        queue.push(&applied(ReviewAction::Ban)).await.unwrap();
        queue.push(&applied(ReviewAction::Mute)).await.unwrap();

        let executor = Arc::new(executor);
        let runner = Arc::clone(&executor);
        let handle = tokio::spawn(async move { runner.run().await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(enforcer.calls().len(), 2);
        assert_eq!(queue.len().await.unwrap(), 0);
    }
}
