use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    domain::{ActionKind, ClassifiedAction, PolicyEntry, ProcessingRequest, RuleDuration, RuleKind},
    error::ConfigurationError,
    notify::NotificationDispatcher,
};

use super::{
    normalizer::{domain_root, NormalizeError},
    temporal::expiry_after_minutes,
};

/// Failure of a single action; the rest of the bucket still runs.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error(transparent)]
    Url(#[from] NormalizeError),
    #[error(transparent)]
    Duration(#[from] ConfigurationError),
    #[error("timed action `{0}` has no duration")]
    MissingDuration(String),
}

/// A policy-affecting action that ran, kept for digest grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedAction {
    pub kind: ActionKind,
    pub duration: Option<RuleDuration>,
    pub label: String,
    pub url: String,
}

/// Policy entry an open action grants for `url` at `now_ms`; `None` for notifications.
pub fn policy_entry_for(
    action: &ClassifiedAction,
    url: &str,
    now_ms: i64,
) -> Result<Option<PolicyEntry>, ActionError> {
    let expiry = || -> Result<i64, ActionError> {
        let minutes = action
            .duration_minutes
            .ok_or_else(|| ActionError::MissingDuration(action.label.clone()))?;
        Ok(expiry_after_minutes(minutes, now_ms)?)
    };
    let entry = match &action.kind {
        RuleKind::SendEmail { .. } => return Ok(None),
        RuleKind::OpenUrl => PolicyEntry::open(url),
        RuleKind::OpenUrlFor(_) => PolicyEntry::open_until(url, expiry()?),
        RuleKind::OpenDomain => PolicyEntry::open(domain_root(url)?),
        RuleKind::OpenDomainFor(_) => PolicyEntry::open_until(domain_root(url)?, expiry()?),
    };
    Ok(Some(entry))
}

pub struct RuleExecutor {
    dispatcher: Arc<NotificationDispatcher>,
}

impl RuleExecutor {
    pub fn new(dispatcher: Arc<NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Runs the winning bucket in order, accumulating entries and done labels on
    /// `request`. Notifications are sent only when `notify` is set.
    pub async fn execute(
        &self,
        request: &mut ProcessingRequest,
        actions: &[ClassifiedAction],
        now: DateTime<Utc>,
        notify: bool,
    ) -> Vec<ExecutedAction> {
        let now_ms = now.timestamp_millis();
        let mut executed = Vec::new();
        for action in actions {
            if let RuleKind::SendEmail { template } = &action.kind {
                if !notify {
                    continue;
                }
                if self
                    .dispatcher
                    .dispatch(template, &action.recipients, request, now)
                    .await
                {
                    request.actions_done.push(action.label.clone());
                }
                continue;
            }

            match policy_entry_for(action, &request.url, now_ms) {
                Ok(Some(entry)) => {
                    tracing::debug!(
                        target: "executor",
                        subscriber = %request.subscriber,
                        url = %entry.url,
                        exp = ?entry.exp,
                        label = %action.label,
                        "policy entry produced"
                    );
                    request.entries.push(entry);
                    request.actions_done.push(action.label.clone());
                    executed.push(ExecutedAction {
                        kind: action.kind.action_kind(),
                        duration: action.kind.duration(),
                        label: action.label.clone(),
                        url: request.url.clone(),
                    });
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(
                    target: "executor",
                    subscriber = %request.subscriber,
                    url = %request.url,
                    label = %action.label,
                    error = %err,
                    "action failed; continuing with the rest of the bucket"
                ),
            }
        }
        executed
    }
}
