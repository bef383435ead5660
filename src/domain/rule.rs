use std::{fmt, str::FromStr};

use crate::error::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl TimeUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Minutes => "Minutes",
            TimeUnit::Hours => "Hours",
            TimeUnit::Days => "Days",
            TimeUnit::Weeks => "Weeks",
        }
    }

    pub fn minutes(self) -> i64 {
        match self {
            TimeUnit::Minutes => 1,
            TimeUnit::Hours => 60,
            TimeUnit::Days => 60 * 24,
            TimeUnit::Weeks => 60 * 24 * 7,
        }
    }
}

impl FromStr for TimeUnit {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Minutes" => Ok(TimeUnit::Minutes),
            "Hours" => Ok(TimeUnit::Hours),
            "Days" => Ok(TimeUnit::Days),
            "Weeks" => Ok(TimeUnit::Weeks),
            other => Err(ConfigurationError::UnsupportedUnit(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleDuration {
    pub amount: i64,
    pub unit: TimeUnit,
}

impl fmt::Display for RuleDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.unit.as_str())
    }
}

/// Rule kind derived from an action label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RuleKind {
    SendEmail { template: String },
    OpenUrl,
    OpenUrlFor(RuleDuration),
    OpenDomain,
    OpenDomainFor(RuleDuration),
}

impl RuleKind {
    pub fn action_kind(&self) -> ActionKind {
        match self {
            RuleKind::SendEmail { .. } => ActionKind::SendEmail,
            RuleKind::OpenUrl => ActionKind::OpenUrl,
            RuleKind::OpenUrlFor(_) => ActionKind::OpenUrlFor,
            RuleKind::OpenDomain => ActionKind::OpenDomain,
            RuleKind::OpenDomainFor(_) => ActionKind::OpenDomainFor,
        }
    }

    pub fn duration(&self) -> Option<RuleDuration> {
        match self {
            RuleKind::OpenUrlFor(duration) | RuleKind::OpenDomainFor(duration) => Some(*duration),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    SendEmail,
    OpenUrl,
    OpenUrlFor,
    OpenDomain,
    OpenDomainFor,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionKind::SendEmail => "Send email template",
            ActionKind::OpenUrl => "Open URL",
            ActionKind::OpenUrlFor => "Open URL for",
            ActionKind::OpenDomain => "Open Domain",
            ActionKind::OpenDomainFor => "Open Domain for",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub admin: bool,
    pub client: bool,
    pub custom: Vec<String>,
}

impl Recipients {
    /// Splits the stored comma separated custom address column.
    pub fn parse_custom(raw: Option<&str>) -> Vec<String> {
        raw.unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Configured action rule. `kind` is derived from `label` when the rule is loaded;
/// `None` means the label carries no known keyword and the rule contributes nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRule {
    pub id: i64,
    pub profile_id: i64,
    pub category_id: Option<i64>,
    pub label: String,
    pub kind: Option<RuleKind>,
    pub is_default: bool,
    pub is_default_traffic: bool,
    pub recipients: Recipients,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedAction {
    pub kind: RuleKind,
    pub duration_minutes: Option<i64>,
    pub label: String,
    pub recipients: Recipients,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketKey {
    Category(i64),
    Default,
}

impl fmt::Display for BucketKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BucketKey::Category(tag_id) => write!(f, "category:{tag_id}"),
            BucketKey::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionBucket {
    pub key: BucketKey,
    pub actions: Vec<ClassifiedAction>,
}

impl ActionBucket {
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_parsing_rejects_unknown_names() {
        assert_eq!("Hours".parse::<TimeUnit>(), Ok(TimeUnit::Hours));
        assert_eq!(
            "Fortnights".parse::<TimeUnit>(),
            Err(ConfigurationError::UnsupportedUnit("Fortnights".into()))
        );
    }

    #[test]
    fn custom_recipients_skip_blank_parts() {
        assert_eq!(
            Recipients::parse_custom(Some(" a@example.com, ,b@example.com")),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(Recipients::parse_custom(None).is_empty());
    }
}
