use std::sync::Arc;

use crate::{
    db::ReferenceStore,
    domain::{
        ActionBucket, ActionRule, BucketKey, Category, ClassifiedAction, FilterProfile,
        RuleDuration, RuleKind,
    },
    error::{ConfigurationError, EngineError},
};

use super::temporal::to_minutes;

const SEND_EMAIL: &str = "Send email template";
const OPEN_URL_FOR: &str = "Open URL for";
const OPEN_URL: &str = "Open URL";
const OPEN_DOMAIN_FOR: &str = "Open Domain for";
const OPEN_DOMAIN: &str = "Open Domain";

/// Which default rules fill the fallback bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleScope {
    Request,
    Traffic,
}

/// Derives the rule kind from a free-text label. Keywords are checked in a fixed
/// precedence order and the first hit wins. `Ok(None)` means no keyword matched.
pub fn parse_label(label: &str) -> Result<Option<RuleKind>, ConfigurationError> {
    if let Some((_, rest)) = label.split_once(SEND_EMAIL) {
        return Ok(Some(RuleKind::SendEmail {
            template: rest.trim().to_string(),
        }));
    }
    if let Some((_, rest)) = label.split_once(OPEN_URL_FOR) {
        return parse_duration(label, rest).map(|d| Some(RuleKind::OpenUrlFor(d)));
    }
    if label.contains(OPEN_URL) {
        return Ok(Some(RuleKind::OpenUrl));
    }
    if let Some((_, rest)) = label.split_once(OPEN_DOMAIN_FOR) {
        return parse_duration(label, rest).map(|d| Some(RuleKind::OpenDomainFor(d)));
    }
    if label.contains(OPEN_DOMAIN) {
        return Ok(Some(RuleKind::OpenDomain));
    }
    Ok(None)
}

fn parse_duration(label: &str, rest: &str) -> Result<RuleDuration, ConfigurationError> {
    let mut parts = rest.split_whitespace();
    let (Some(amount), Some(unit)) = (parts.next(), parts.next()) else {
        return Err(ConfigurationError::InvalidDuration(label.to_string()));
    };
    let amount = amount
        .parse::<i64>()
        .ok()
        .filter(|amount| *amount > 0)
        .ok_or_else(|| ConfigurationError::InvalidDuration(label.to_string()))?;
    Ok(RuleDuration {
        amount,
        unit: unit.parse()?,
    })
}

/// Turns a configured rule into an action descriptor, normalising any duration to minutes.
pub fn classify_rule(rule: &ActionRule) -> Result<Option<ClassifiedAction>, ConfigurationError> {
    let Some(kind) = rule.kind.clone() else {
        return Ok(None);
    };
    let duration_minutes = kind
        .duration()
        .map(|d| to_minutes(d.amount, d.unit))
        .transpose()?;
    Ok(Some(ClassifiedAction {
        kind,
        duration_minutes,
        label: rule.label.clone(),
        recipients: rule.recipients.clone(),
    }))
}

fn classify_all(rules: &[ActionRule]) -> Result<Vec<ClassifiedAction>, ConfigurationError> {
    let mut actions = Vec::with_capacity(rules.len());
    for rule in rules {
        match classify_rule(rule)? {
            Some(action) => actions.push(action),
            None => tracing::debug!(
                target: "classifier",
                rule = rule.id,
                label = %rule.label,
                "label carries no rule keyword; ignored"
            ),
        }
    }
    Ok(actions)
}

pub struct ActionClassifier {
    store: Arc<dyn ReferenceStore>,
}

impl ActionClassifier {
    pub fn new(store: Arc<dyn ReferenceStore>) -> Self {
        Self { store }
    }

    /// One bucket per matched category in resolver order; the default bucket is added
    /// only when no category produced an action.
    pub async fn buckets(
        &self,
        categories: &[Category],
        profile: &FilterProfile,
        scope: RuleScope,
    ) -> Result<Vec<ActionBucket>, EngineError> {
        let mut buckets = Vec::with_capacity(categories.len() + 1);
        for category in categories {
            let rules = self.store.rules_for_category(profile.id, category.id).await?;
            buckets.push(ActionBucket {
                key: BucketKey::Category(category.tag_id),
                actions: classify_all(&rules)?,
            });
        }

        if buckets.iter().all(ActionBucket::is_empty) {
            let rules = self.store.default_rules(profile.id, scope).await?;
            let actions = classify_all(&rules)?;
            if !actions.is_empty() {
                buckets.push(ActionBucket {
                    key: BucketKey::Default,
                    actions,
                });
            }
        }

        tracing::debug!(
            target: "classifier",
            profile = profile.id,
            buckets = buckets.len(),
            "action buckets built"
        );
        Ok(buckets)
    }
}
