use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

pub const POLICY_RULE_OPEN: &str = "open";

/// External content tag mirrored locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub tag_id: i64,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterProfile {
    pub id: i64,
    pub name: String,
    pub is_default: bool,
    pub traffic_recording: bool,
}

/// Directive pushed to the platform's inspector URL list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub url: String,
    pub rule: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

impl PolicyEntry {
    pub fn open(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rule: POLICY_RULE_OPEN.to_string(),
            exp: None,
        }
    }

    pub fn open_until(url: impl Into<String>, exp: i64) -> Self {
        Self {
            exp: Some(exp),
            ..Self::open(url)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric id expected by the platform: the ASCII digits of the raw id.
    pub fn numeric(&self) -> Result<i64, ConfigurationError> {
        let digits: String = self.0.chars().filter(char::is_ascii_digit).collect();
        digits
            .parse::<i64>()
            .map_err(|_| ConfigurationError::InvalidSubscriberId(self.0.clone()))
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriberInfo {
    pub full_name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EmailTemplate {
    pub name: String,
    pub subject: String,
    pub html: String,
}

/// Pre/post text shown around one digest sub-list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DigestText {
    pub section: String,
    pub text_type: String,
    #[serde(default)]
    pub duration_label: Option<String>,
    #[serde(default)]
    pub is_default: bool,
    pub text: String,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct QueueSnapshot {
    pub access_requests: usize,
    pub traffic_reports: usize,
}
