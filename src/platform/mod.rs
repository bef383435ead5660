pub mod api;
mod client;

use async_trait::async_trait;

use crate::{domain::SubscriberInfo, error::ExternalServiceError};

pub use api::{CatalogEntry, SubscriberPolicy, TrafficReport};
pub use client::PlatformClient;

/// Calls the core makes against the content-filtering platform. Every call is
/// single-attempt; only a 200 answer counts as success.
#[async_trait]
pub trait FilterPlatform: Send + Sync {
    /// Canonical host the platform files the URL under.
    async fn search_host(&self, url_or_domain: &str) -> Result<String, ExternalServiceError>;

    async fn lookup_tags(&self, host: &str) -> Result<Vec<i64>, ExternalServiceError>;

    async fn fetch_policy(&self, subscriber: i64) -> Result<SubscriberPolicy, ExternalServiceError>;

    async fn push_policy(
        &self,
        subscriber: i64,
        policy: &SubscriberPolicy,
    ) -> Result<(), ExternalServiceError>;

    async fn find_subscriber(
        &self,
        subscriber: i64,
    ) -> Result<Option<SubscriberInfo>, ExternalServiceError>;

    async fn list_categories(&self) -> Result<Vec<CatalogEntry>, ExternalServiceError>;

    async fn traffic_record(&self, key: &str) -> Result<TrafficReport, ExternalServiceError>;
}
