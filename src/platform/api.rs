use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{
    domain::{SubscriberId, SubscriberInfo},
    error::ExternalServiceError,
};

pub const LOGIN_PATH: &str = "/api/user/login-by-password";
pub const SEARCH_URL_PATH: &str = "/api/tags/search-url";
pub const TAG_VALUE_PATH: &str = "/api/tags/value/edit/get";
pub const GET_SETTINGS_PATH: &str = "/api/user/get-filter-settings";
pub const SET_SETTINGS_PATH: &str = "/user/ajax/set-filter-settings";
pub const SEARCH_USER_PATH: &str = "/api/users/search-user";
pub const TAG_LIST_PATH: &str = "/api/tags/list";
pub const TRAFFIC_RECORD_PATH: &str = "/api/user/get-traffic-record";

static SUBSCRIBER_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"user::(\d+)::").expect("valid subscriber marker regex"));

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub phone: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SearchUrlRequest<'a> {
    pub search: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SearchUrlResponse {
    #[serde(rename = "foundHost", default)]
    pub found_host: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagValueRequest<'a> {
    pub host: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SearchUserRequest {
    pub search: i64,
    #[serde(rename = "lastSurfing")]
    pub last_surfing: bool,
}

#[derive(Debug, Deserialize)]
pub struct SearchUserResponse {
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

#[derive(Debug, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

impl From<UserRecord> for SubscriberInfo {
    fn from(record: UserRecord) -> Self {
        Self {
            full_name: record.full_name,
            email: record.email,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TagListRequest {
    pub inspector: bool,
}

#[derive(Debug, Deserialize)]
pub struct TagListResponse {
    #[serde(default)]
    pub list: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "id")]
    pub tag_id: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
pub struct TrafficRecordRequest<'a> {
    pub key: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SetSettingsRequest<'a> {
    pub id: i64,
    #[serde(rename = "filterSettings")]
    pub filter_settings: &'a Value,
    #[serde(rename = "inspectorSettings")]
    pub inspector_settings: &'a Map<String, Value>,
}

/// Subscriber filter settings as held by the platform. Only the inspector URL list
/// is interpreted; everything else round-trips untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubscriberPolicy {
    pub filter_settings: Value,
    pub inspector_settings: Map<String, Value>,
}

impl SubscriberPolicy {
    pub fn from_settings(mut settings: Value) -> Result<Self, ExternalServiceError> {
        let object = settings
            .as_object_mut()
            .ok_or_else(|| malformed(GET_SETTINGS_PATH, "settings is not an object"))?;
        let filter_settings = object.remove("filterSettings").unwrap_or(Value::Null);
        let inspector_settings = match object.remove("inspectorSettings") {
            Some(Value::Object(map)) => map,
            None | Some(Value::Null) => Map::new(),
            Some(_) => {
                return Err(malformed(
                    GET_SETTINGS_PATH,
                    "inspectorSettings is not an object",
                ))
            }
        };
        Ok(Self {
            filter_settings,
            inspector_settings,
        })
    }

    pub fn urls(&self) -> Vec<Value> {
        match self.inspector_settings.get("urls") {
            Some(Value::Array(urls)) => urls.clone(),
            _ => Vec::new(),
        }
    }

    pub fn set_urls(&mut self, urls: Vec<Value>) {
        self.inspector_settings
            .insert("urls".to_string(), Value::Array(urls));
    }
}

/// URLs observed in one traffic record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrafficReport {
    pub subscriber: Option<SubscriberId>,
    pub blocked_urls: Vec<String>,
    pub denied_urls: Vec<String>,
}

pub fn parse_tag_ids(body: &Value) -> Result<Vec<i64>, ExternalServiceError> {
    let tags = body
        .get("tagValue")
        .and_then(|value| value.get("tags"))
        .and_then(Value::as_object)
        .ok_or_else(|| malformed(TAG_VALUE_PATH, "missing tagValue.tags"))?;
    tags.keys()
        .map(|key| {
            key.trim()
                .parse::<i64>()
                .map_err(|_| malformed(TAG_VALUE_PATH, &format!("non-numeric tag id `{key}`")))
        })
        .collect()
}

/// Sector-blocked and platform-denied URLs, each de-duplicated in first-seen order,
/// plus the subscriber named in any `user::<id>::` action marker.
pub fn parse_traffic_record(body: &Value) -> Result<TrafficReport, ExternalServiceError> {
    let entries = body
        .get("traffic")
        .and_then(Value::as_array)
        .ok_or_else(|| malformed(TRAFFIC_RECORD_PATH, "missing traffic list"))?;

    let mut report = TrafficReport::default();
    for entry in entries {
        let Some(items) = entry.as_array() else {
            continue;
        };
        let mut url = None;
        let mut sector = false;
        let mut denied = false;
        for item in items {
            match item.get("block").and_then(Value::as_str) {
                Some("sector") => sector = true,
                Some("deny") => denied = true,
                _ => {}
            }
            if let Some(candidate) = item.get("url").and_then(Value::as_str) {
                if candidate.starts_with("https://") || candidate.starts_with("http://") {
                    url = Some(candidate.to_string());
                }
            }
            if let Some(action) = item.get("action").and_then(Value::as_str) {
                if let Some(captures) = SUBSCRIBER_MARKER.captures(action) {
                    report.subscriber = Some(SubscriberId::new(&captures[1]));
                }
            }
        }
        if let Some(url) = url {
            if sector && !report.blocked_urls.contains(&url) {
                report.blocked_urls.push(url.clone());
            }
            if denied && !report.denied_urls.contains(&url) {
                report.denied_urls.push(url);
            }
        }
    }
    Ok(report)
}

pub(crate) fn malformed(endpoint: &'static str, reason: &str) -> ExternalServiceError {
    ExternalServiceError::Malformed {
        endpoint,
        reason: reason.to_string(),
    }
}
