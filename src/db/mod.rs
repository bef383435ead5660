use std::{path::Path, str::FromStr, time::Duration};

use async_trait::async_trait;
use sqlx::{
    query,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions},
};

use crate::{
    domain::{
        AccessRequest, ActionRule, Category, DigestText, EmailTemplate, FilterProfile,
        TrafficReportJob,
    },
    error::StoreError,
    policy::RuleScope,
};

mod rows;
pub mod seed;
pub mod store;

pub use store::{NewActionRule, SqliteStore};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS categories (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        tag_id INTEGER NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS filter_profiles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        traffic_recording INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS filter_profiles_single_default
        ON filter_profiles (is_default) WHERE is_default = 1
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS action_rules (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        profile_id INTEGER NOT NULL REFERENCES filter_profiles (id),
        category_id INTEGER REFERENCES categories (id),
        label TEXT NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        is_default_traffic INTEGER NOT NULL DEFAULT 0,
        email_to_admin INTEGER NOT NULL DEFAULT 0,
        email_to_client INTEGER NOT NULL DEFAULT 0,
        custom_emails TEXT,
        position INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS clients (
        email TEXT PRIMARY KEY,
        profile_id INTEGER REFERENCES filter_profiles (id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS email_templates (
        name TEXT PRIMARY KEY,
        subject TEXT NOT NULL,
        html TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS digest_texts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        section TEXT NOT NULL,
        text_type TEXT NOT NULL,
        duration_label TEXT,
        is_default INTEGER NOT NULL DEFAULT 0,
        text TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS access_requests (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subscriber_id TEXT NOT NULL,
        requested_url TEXT NOT NULL,
        client_name TEXT NOT NULL DEFAULT '',
        client_email TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL DEFAULT 'pending',
        action_done TEXT,
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS traffic_reports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        report_key TEXT NOT NULL,
        status TEXT NOT NULL DEFAULT 'pending',
        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
        updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
    )
    "#,
];

pub async fn init_pool(db_path: &Path) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5))
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    for statement in SCHEMA {
        query(statement).execute(&pool).await?;
    }

    Ok(pool)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Pending,
    Queued,
    Done,
    Failed,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Queued => "queued",
            RequestStatus::Done => "done",
            RequestStatus::Failed => "failed",
        }
    }
}

/// Read access to configured reference data.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn categories_by_tag_ids(&self, tag_ids: &[i64]) -> Result<Vec<Category>, StoreError>;

    async fn rules_for_category(
        &self,
        profile_id: i64,
        category_id: i64,
    ) -> Result<Vec<ActionRule>, StoreError>;

    /// Category-less rules flagged as defaults for `scope`.
    async fn default_rules(
        &self,
        profile_id: i64,
        scope: RuleScope,
    ) -> Result<Vec<ActionRule>, StoreError>;

    async fn profile_for_client(&self, email: &str) -> Result<Option<FilterProfile>, StoreError>;

    async fn email_template(&self, name: &str) -> Result<Option<EmailTemplate>, StoreError>;

    async fn digest_texts(&self, section: &str) -> Result<Vec<DigestText>, StoreError>;

    async fn upsert_category(&self, tag_id: i64, description: &str) -> Result<(), StoreError>;
}

/// Lifecycle of inbound request rows.
#[async_trait]
pub trait RequestStore: Send + Sync {
    /// Moves up to `limit` pending access requests to `queued` and returns them.
    async fn claim_access_requests(&self, limit: i64) -> Result<Vec<AccessRequest>, StoreError>;

    async fn finish_access_request(
        &self,
        id: i64,
        status: RequestStatus,
        action_done: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn claim_traffic_reports(&self, limit: i64) -> Result<Vec<TrafficReportJob>, StoreError>;

    async fn finish_traffic_report(&self, id: i64, status: RequestStatus) -> Result<(), StoreError>;

    /// Returns queued rows left by an interrupted run to `pending`.
    async fn requeue_interrupted(&self) -> Result<u64, StoreError>;
}
