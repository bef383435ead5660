use chrono::{DateTime, Utc};

use super::{
    rule::ActionBucket,
    types::{Category, PolicyEntry, SubscriberId, SubscriberInfo},
};

/// One resolution pass for a single URL. Lives only while the URL is processed.
#[derive(Debug, Clone)]
pub struct ProcessingRequest {
    pub request_id: Option<i64>,
    pub subscriber: SubscriberId,
    pub url: String,
    pub client: SubscriberInfo,
    pub categories: Vec<Category>,
    pub chosen: Option<ActionBucket>,
    pub entries: Vec<PolicyEntry>,
    pub actions_done: Vec<String>,
}

impl ProcessingRequest {
    pub fn new(subscriber: SubscriberId, url: impl Into<String>) -> Self {
        Self {
            request_id: None,
            subscriber,
            url: url.into(),
            client: SubscriberInfo::default(),
            categories: Vec::new(),
            chosen: None,
            entries: Vec::new(),
            actions_done: Vec::new(),
        }
    }

    pub fn with_request_id(mut self, id: i64) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn with_client(mut self, client: SubscriberInfo) -> Self {
        self.client = client;
        self
    }

    /// Executed labels in the form stored on the originating request row.
    pub fn action_done_summary(&self) -> String {
        self.actions_done.join(" ,")
    }
}

/// Pending access request row written by the mailbox poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRequest {
    pub id: i64,
    pub subscriber_id: String,
    pub requested_url: String,
    pub client_name: String,
    pub client_email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficReportJob {
    pub id: i64,
    pub report_key: String,
}

#[derive(Debug, Clone)]
pub enum ProcessingJob {
    Access(AccessRequest),
    Traffic(TrafficReportJob),
}

impl ProcessingJob {
    pub fn describe(&self) -> String {
        match self {
            ProcessingJob::Access(request) => format!("access request {}", request.id),
            ProcessingJob::Traffic(report) => format!("traffic report {}", report.id),
        }
    }
}
