//! In-memory doubles for the store, platform and mailer seams. Each double is
//! `Clone` and shares its state, so a test can hand one copy to the code under
//! test and inspect the other.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::{
    db::{ReferenceStore, RequestStatus, RequestStore},
    domain::{
        AccessRequest, ActionRule, Category, DigestText, EmailTemplate, FilterProfile, Recipients,
        SubscriberInfo, TrafficReportJob,
    },
    error::{ExternalServiceError, NotificationError, StoreError},
    notify::{Mailer, NotificationDispatcher, OutboundEmail},
    platform::{CatalogEntry, FilterPlatform, SubscriberPolicy, TrafficReport},
    policy::{parse_label, EngineSettings, ResolutionEngine, RuleScope},
};

pub const DEFAULT_PROFILE_ID: i64 = 1;

/// Fixed clock reading used by [`engine`].
pub const NOW_MS: i64 = 1_700_000_000_000;

/// Rule on the default profile with its kind parsed from `label`.
pub fn rule(id: i64, category_id: Option<i64>, label: &str) -> ActionRule {
    ActionRule {
        id,
        profile_id: DEFAULT_PROFILE_ID,
        category_id,
        label: label.to_string(),
        kind: parse_label(label).unwrap(),
        is_default: false,
        is_default_traffic: false,
        recipients: Recipients::default(),
    }
}

#[derive(Default)]
struct StoreState {
    default_profile: Option<FilterProfile>,
    categories: Vec<Category>,
    rules: Vec<ActionRule>,
    clients: HashMap<String, FilterProfile>,
    templates: HashMap<String, EmailTemplate>,
    digest_texts: Vec<DigestText>,
    access_requests: Vec<AccessRequest>,
    traffic_reports: Vec<TrafficReportJob>,
    finished_access: Vec<(i64, RequestStatus, Option<String>)>,
    finished_traffic: Vec<(i64, RequestStatus)>,
}

#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<StoreState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        let store = Self::default();
        store.state.lock().default_profile = Some(FilterProfile {
            id: DEFAULT_PROFILE_ID,
            name: "Default".into(),
            is_default: true,
            traffic_recording: false,
        });
        store
    }

    pub fn with_category(self, id: i64, tag_id: i64, description: &str) -> Self {
        self.state.lock().categories.push(Category {
            id,
            tag_id,
            description: description.into(),
        });
        self
    }

    pub fn with_rule(self, rule: ActionRule) -> Self {
        self.state.lock().rules.push(rule);
        self
    }

    pub fn with_default_rule(self, mut rule: ActionRule, scope: RuleScope) -> Self {
        rule.category_id = None;
        match scope {
            RuleScope::Request => rule.is_default = true,
            RuleScope::Traffic => rule.is_default_traffic = true,
        }
        self.with_rule(rule)
    }

    pub fn with_client_profile(self, email: &str, profile_id: i64, name: &str) -> Self {
        self.state.lock().clients.insert(
            email.into(),
            FilterProfile {
                id: profile_id,
                name: name.into(),
                is_default: false,
                traffic_recording: false,
            },
        );
        self
    }

    /// Turns traffic recording on for the default profile and every client profile.
    pub fn recording_traffic(self) -> Self {
        {
            let mut state = self.state.lock();
            if let Some(profile) = state.default_profile.as_mut() {
                profile.traffic_recording = true;
            }
            for profile in state.clients.values_mut() {
                profile.traffic_recording = true;
            }
        }
        self
    }

    pub fn with_template(self, name: &str, subject: &str, html: &str) -> Self {
        self.state.lock().templates.insert(
            name.into(),
            EmailTemplate {
                name: name.into(),
                subject: subject.into(),
                html: html.into(),
            },
        );
        self
    }

    pub fn with_digest_text(
        self,
        section: &str,
        text_type: &str,
        duration: Option<&str>,
        is_default: bool,
        text: &str,
    ) -> Self {
        self.state.lock().digest_texts.push(DigestText {
            section: section.into(),
            text_type: text_type.into(),
            duration_label: duration.map(str::to_string),
            is_default,
            text: text.into(),
        });
        self
    }

    pub fn with_access_request(self, id: i64, subscriber_id: &str, url: &str) -> Self {
        self.state.lock().access_requests.push(AccessRequest {
            id,
            subscriber_id: subscriber_id.into(),
            requested_url: url.into(),
            client_name: String::new(),
            client_email: String::new(),
            created_at: Utc::now(),
        });
        self
    }

    pub fn with_traffic_report(self, id: i64, report_key: &str) -> Self {
        self.state.lock().traffic_reports.push(TrafficReportJob {
            id,
            report_key: report_key.into(),
        });
        self
    }

    pub fn default_profile(&self) -> FilterProfile {
        self.state.lock().default_profile.clone().unwrap()
    }

    pub fn categories(&self) -> Vec<Category> {
        self.state.lock().categories.clone()
    }

    pub fn finished_access(&self) -> Vec<(i64, RequestStatus, Option<String>)> {
        self.state.lock().finished_access.clone()
    }

    pub fn finished_traffic(&self) -> Vec<(i64, RequestStatus)> {
        self.state.lock().finished_traffic.clone()
    }
}

#[async_trait]
impl ReferenceStore for FakeStore {
    async fn categories_by_tag_ids(&self, tag_ids: &[i64]) -> Result<Vec<Category>, StoreError> {
        Ok(self
            .state
            .lock()
            .categories
            .iter()
            .filter(|category| tag_ids.contains(&category.tag_id))
            .cloned()
            .collect())
    }

    async fn rules_for_category(
        &self,
        profile_id: i64,
        category_id: i64,
    ) -> Result<Vec<ActionRule>, StoreError> {
        Ok(self
            .state
            .lock()
            .rules
            .iter()
            .filter(|rule| rule.profile_id == profile_id && rule.category_id == Some(category_id))
            .cloned()
            .collect())
    }

    async fn default_rules(
        &self,
        profile_id: i64,
        scope: RuleScope,
    ) -> Result<Vec<ActionRule>, StoreError> {
        Ok(self
            .state
            .lock()
            .rules
            .iter()
            .filter(|rule| rule.profile_id == profile_id && rule.category_id.is_none())
            .filter(|rule| match scope {
                RuleScope::Request => rule.is_default,
                RuleScope::Traffic => rule.is_default_traffic,
            })
            .cloned()
            .collect())
    }

    async fn profile_for_client(&self, email: &str) -> Result<Option<FilterProfile>, StoreError> {
        Ok(self.state.lock().clients.get(email).cloned())
    }

    async fn email_template(&self, name: &str) -> Result<Option<EmailTemplate>, StoreError> {
        Ok(self.state.lock().templates.get(name).cloned())
    }

    async fn digest_texts(&self, section: &str) -> Result<Vec<DigestText>, StoreError> {
        Ok(self
            .state
            .lock()
            .digest_texts
            .iter()
            .filter(|text| text.section == section)
            .cloned()
            .collect())
    }

    async fn upsert_category(&self, tag_id: i64, description: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if let Some(existing) = state.categories.iter_mut().find(|c| c.tag_id == tag_id) {
            existing.description = description.into();
        } else {
            let id = state.categories.len() as i64 + 1;
            state.categories.push(Category {
                id,
                tag_id,
                description: description.into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RequestStore for FakeStore {
    async fn claim_access_requests(&self, limit: i64) -> Result<Vec<AccessRequest>, StoreError> {
        let mut state = self.state.lock();
        let take = (limit.max(0) as usize).min(state.access_requests.len());
        Ok(state.access_requests.drain(..take).collect())
    }

    async fn finish_access_request(
        &self,
        id: i64,
        status: RequestStatus,
        action_done: Option<&str>,
    ) -> Result<(), StoreError> {
        self.state
            .lock()
            .finished_access
            .push((id, status, action_done.map(str::to_string)));
        Ok(())
    }

    async fn claim_traffic_reports(&self, limit: i64) -> Result<Vec<TrafficReportJob>, StoreError> {
        let mut state = self.state.lock();
        let take = (limit.max(0) as usize).min(state.traffic_reports.len());
        Ok(state.traffic_reports.drain(..take).collect())
    }

    async fn finish_traffic_report(&self, id: i64, status: RequestStatus) -> Result<(), StoreError> {
        self.state.lock().finished_traffic.push((id, status));
        Ok(())
    }

    async fn requeue_interrupted(&self) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[derive(Default)]
struct PlatformState {
    tags: Vec<i64>,
    host_tags: HashMap<String, Vec<i64>>,
    fail_tags: bool,
    policy: SubscriberPolicy,
    reject_push: bool,
    pushed: Vec<(i64, SubscriberPolicy)>,
    subscribers: HashMap<i64, SubscriberInfo>,
    catalog: Vec<CatalogEntry>,
    traffic: HashMap<String, TrafficReport>,
}

#[derive(Clone, Default)]
pub struct FakePlatform {
    state: Arc<Mutex<PlatformState>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tags returned for any host without its own entry.
    pub fn with_tags(self, tags: Vec<i64>) -> Self {
        self.state.lock().tags = tags;
        self
    }

    /// Tags for one URL; the fake's host search echoes the URL back as the host.
    pub fn with_host_tags(self, url: &str, tags: Vec<i64>) -> Self {
        self.state.lock().host_tags.insert(url.into(), tags);
        self
    }

    pub fn failing_tags(self) -> Self {
        self.state.lock().fail_tags = true;
        self
    }

    pub fn with_policy(self, settings: Value) -> Self {
        self.state.lock().policy = SubscriberPolicy::from_settings(settings).unwrap();
        self
    }

    pub fn rejecting_push(self) -> Self {
        self.state.lock().reject_push = true;
        self
    }

    pub fn with_subscriber(self, id: i64, full_name: &str, email: &str) -> Self {
        self.state.lock().subscribers.insert(
            id,
            SubscriberInfo {
                full_name: full_name.into(),
                email: email.into(),
            },
        );
        self
    }

    pub fn with_catalog(self, entries: Vec<(i64, &str)>) -> Self {
        self.state.lock().catalog = entries
            .into_iter()
            .map(|(tag_id, description)| CatalogEntry {
                tag_id,
                description: description.into(),
            })
            .collect();
        self
    }

    pub fn with_traffic(self, key: &str, report: TrafficReport) -> Self {
        self.state.lock().traffic.insert(key.into(), report);
        self
    }

    pub fn pushed(&self) -> Vec<(i64, SubscriberPolicy)> {
        self.state.lock().pushed.clone()
    }
}

#[async_trait]
impl FilterPlatform for FakePlatform {
    async fn search_host(&self, url_or_domain: &str) -> Result<String, ExternalServiceError> {
        Ok(url_or_domain.to_string())
    }

    async fn lookup_tags(&self, host: &str) -> Result<Vec<i64>, ExternalServiceError> {
        let state = self.state.lock();
        if state.fail_tags {
            return Err(ExternalServiceError::Status {
                endpoint: "tags",
                status: 500,
            });
        }
        Ok(state
            .host_tags
            .get(host)
            .cloned()
            .unwrap_or_else(|| state.tags.clone()))
    }

    async fn fetch_policy(&self, _subscriber: i64) -> Result<SubscriberPolicy, ExternalServiceError> {
        Ok(self.state.lock().policy.clone())
    }

    async fn push_policy(
        &self,
        subscriber: i64,
        policy: &SubscriberPolicy,
    ) -> Result<(), ExternalServiceError> {
        let mut state = self.state.lock();
        if state.reject_push {
            return Err(ExternalServiceError::Status {
                endpoint: "set-filter-settings",
                status: 403,
            });
        }
        state.policy = policy.clone();
        state.pushed.push((subscriber, policy.clone()));
        Ok(())
    }

    async fn find_subscriber(
        &self,
        subscriber: i64,
    ) -> Result<Option<SubscriberInfo>, ExternalServiceError> {
        Ok(self.state.lock().subscribers.get(&subscriber).cloned())
    }

    async fn list_categories(&self) -> Result<Vec<CatalogEntry>, ExternalServiceError> {
        Ok(self.state.lock().catalog.clone())
    }

    async fn traffic_record(&self, key: &str) -> Result<TrafficReport, ExternalServiceError> {
        self.state
            .lock()
            .traffic
            .get(key)
            .cloned()
            .ok_or_else(|| ExternalServiceError::Status {
                endpoint: "get-traffic-record",
                status: 404,
            })
    }
}

#[derive(Clone, Default)]
pub struct FakeMailer {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    failing: Arc<Mutex<Vec<String>>>,
}

impl FakeMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_for(self, address: &str) -> Self {
        self.failing.lock().push(address.into());
        self
    }

    /// Successfully delivered messages in send order.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, email: OutboundEmail) -> Result<(), NotificationError> {
        if self.failing.lock().contains(&email.to) {
            return Err(NotificationError::Transport(format!("rejected {}", email.to)));
        }
        self.sent.lock().push(email);
        Ok(())
    }
}

/// Engine wired to the given doubles with the clock pinned at [`NOW_MS`].
pub fn engine(platform: &FakePlatform, store: &FakeStore, mailer: &FakeMailer) -> ResolutionEngine {
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::new(store.clone()),
        Arc::new(mailer.clone()),
        "admin@example.com".into(),
        chrono_tz::UTC,
    ));
    let now = Utc.timestamp_millis_opt(NOW_MS).unwrap();
    ResolutionEngine::new(
        Arc::new(platform.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        dispatcher,
        Arc::new(store.default_profile()),
        EngineSettings {
            downgrade_https: true,
            batch_concurrency: 4,
            digest_template: "digest".into(),
            digest_fallback_recipient: None,
        },
    )
    .with_clock(Arc::new(move || now))
}
