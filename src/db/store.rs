use async_trait::async_trait;
use sqlx::{query, query_as, sqlite::SqlitePool, QueryBuilder, Sqlite};

use crate::{
    domain::{
        AccessRequest, ActionRule, Category, DigestText, EmailTemplate, FilterProfile,
        TrafficReportJob,
    },
    error::StoreError,
    policy::{parse_label, RuleScope},
};

use super::{rows::ActionRuleRow, ReferenceStore, RequestStatus, RequestStore};

const RULE_COLUMNS: &str = "id, profile_id, category_id, label, is_default, is_default_traffic, \
     email_to_admin, email_to_client, custom_emails";

/// Action rule as written by the configuration side.
#[derive(Debug, Clone, Default)]
pub struct NewActionRule {
    pub profile_id: i64,
    pub category_id: Option<i64>,
    pub label: String,
    pub is_default: bool,
    pub is_default_traffic: bool,
    pub email_to_admin: bool,
    pub email_to_client: bool,
    pub custom_emails: Option<String>,
    pub position: i64,
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Loads the single default profile, creating it on first start.
    pub async fn ensure_default_profile(&self) -> Result<FilterProfile, StoreError> {
        query(
            r#"INSERT INTO filter_profiles (name, is_default, traffic_recording)
                SELECT 'Default', 1, 0
                WHERE NOT EXISTS (SELECT 1 FROM filter_profiles WHERE is_default = 1)"#,
        )
        .execute(&self.pool)
        .await?;

        let profile = query_as::<_, FilterProfile>(
            r#"SELECT id, name, is_default, traffic_recording FROM filter_profiles
                WHERE is_default = 1 LIMIT 1"#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(profile)
    }

    pub async fn insert_profile(
        &self,
        name: &str,
        traffic_recording: bool,
    ) -> Result<i64, StoreError> {
        let id = query(
            r#"INSERT INTO filter_profiles (name, is_default, traffic_recording) VALUES (?1, 0, ?2)"#,
        )
        .bind(name)
        .bind(traffic_recording)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn set_traffic_recording(
        &self,
        profile_id: i64,
        enabled: bool,
    ) -> Result<(), StoreError> {
        query(r#"UPDATE filter_profiles SET traffic_recording = ?2 WHERE id = ?1"#)
            .bind(profile_id)
            .bind(enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn assign_client(&self, email: &str, profile_id: i64) -> Result<(), StoreError> {
        query(r#"INSERT OR REPLACE INTO clients (email, profile_id) VALUES (?1, ?2)"#)
            .bind(email.trim())
            .bind(profile_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Rejects labels whose duration cannot be parsed, so stored rules always classify.
    pub async fn insert_action_rule(&self, rule: NewActionRule) -> Result<i64, StoreError> {
        parse_label(&rule.label)?;
        let id = query(
            r#"INSERT INTO action_rules (profile_id, category_id, label, is_default,
                    is_default_traffic, email_to_admin, email_to_client, custom_emails, position)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"#,
        )
        .bind(rule.profile_id)
        .bind(rule.category_id)
        .bind(rule.label)
        .bind(rule.is_default)
        .bind(rule.is_default_traffic)
        .bind(rule.email_to_admin)
        .bind(rule.email_to_client)
        .bind(rule.custom_emails)
        .bind(rule.position)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn upsert_template(&self, template: &EmailTemplate) -> Result<(), StoreError> {
        query(r#"INSERT OR REPLACE INTO email_templates (name, subject, html) VALUES (?1, ?2, ?3)"#)
            .bind(&template.name)
            .bind(&template.subject)
            .bind(&template.html)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn insert_digest_text(&self, text: &DigestText) -> Result<(), StoreError> {
        query(
            r#"INSERT INTO digest_texts (section, text_type, duration_label, is_default, text)
                VALUES (?1, ?2, ?3, ?4, ?5)"#,
        )
        .bind(&text.section)
        .bind(&text.text_type)
        .bind(&text.duration_label)
        .bind(text.is_default)
        .bind(&text.text)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn has_rules(&self) -> Result<bool, StoreError> {
        let (count,) = query_as::<_, (i64,)>(r#"SELECT COUNT(*) FROM action_rules"#)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    #[cfg(test)]
    pub async fn insert_access_request(
        &self,
        subscriber_id: &str,
        requested_url: &str,
    ) -> Result<i64, StoreError> {
        let id = query(
            r#"INSERT INTO access_requests (subscriber_id, requested_url) VALUES (?1, ?2)"#,
        )
        .bind(subscriber_id)
        .bind(requested_url)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    #[cfg(test)]
    pub async fn insert_traffic_report(&self, report_key: &str) -> Result<i64, StoreError> {
        let id = query(r#"INSERT INTO traffic_reports (report_key) VALUES (?1)"#)
            .bind(report_key)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    #[cfg(test)]
    pub async fn access_request_state(
        &self,
        id: i64,
    ) -> Result<Option<(String, Option<String>)>, StoreError> {
        let state = query_as::<_, (String, Option<String>)>(
            r#"SELECT status, action_done FROM access_requests WHERE id = ?1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(state)
    }

    async fn fetch_rules(
        &self,
        sql: &str,
        profile_id: i64,
        second: Option<i64>,
    ) -> Result<Vec<ActionRule>, StoreError> {
        let mut statement = query_as::<_, ActionRuleRow>(sql).bind(profile_id);
        if let Some(value) = second {
            statement = statement.bind(value);
        }
        let rows = statement.fetch_all(&self.pool).await?;
        let mut rules = Vec::with_capacity(rows.len());
        for row in rows {
            rules.push(ActionRule::try_from(row)?);
        }
        Ok(rules)
    }
}

#[async_trait]
impl ReferenceStore for SqliteStore {
    async fn categories_by_tag_ids(&self, tag_ids: &[i64]) -> Result<Vec<Category>, StoreError> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id, tag_id, description FROM categories WHERE tag_id IN (");
        let mut separated = builder.separated(", ");
        for tag_id in tag_ids {
            separated.push_bind(*tag_id);
        }
        separated.push_unseparated(") ORDER BY tag_id");
        let categories = builder
            .build_query_as::<Category>()
            .fetch_all(&self.pool)
            .await?;
        Ok(categories)
    }

    async fn rules_for_category(
        &self,
        profile_id: i64,
        category_id: i64,
    ) -> Result<Vec<ActionRule>, StoreError> {
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM action_rules \
             WHERE profile_id = ?1 AND category_id = ?2 ORDER BY position, id"
        );
        self.fetch_rules(&sql, profile_id, Some(category_id)).await
    }

    async fn default_rules(
        &self,
        profile_id: i64,
        scope: RuleScope,
    ) -> Result<Vec<ActionRule>, StoreError> {
        let flag = match scope {
            RuleScope::Request => "is_default",
            RuleScope::Traffic => "is_default_traffic",
        };
        let sql = format!(
            "SELECT {RULE_COLUMNS} FROM action_rules \
             WHERE profile_id = ?1 AND category_id IS NULL AND {flag} = 1 ORDER BY position, id"
        );
        self.fetch_rules(&sql, profile_id, None).await
    }

    async fn profile_for_client(&self, email: &str) -> Result<Option<FilterProfile>, StoreError> {
        let profile = query_as::<_, FilterProfile>(
            r#"SELECT p.id, p.name, p.is_default, p.traffic_recording
                FROM clients c JOIN filter_profiles p ON p.id = c.profile_id
                WHERE c.email = ?1"#,
        )
        .bind(email.trim())
        .fetch_optional(&self.pool)
        .await?;
        Ok(profile)
    }

    async fn email_template(&self, name: &str) -> Result<Option<EmailTemplate>, StoreError> {
        let template = query_as::<_, EmailTemplate>(
            r#"SELECT name, subject, html FROM email_templates WHERE name = ?1"#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(template)
    }

    async fn digest_texts(&self, section: &str) -> Result<Vec<DigestText>, StoreError> {
        let texts = query_as::<_, DigestText>(
            r#"SELECT section, text_type, duration_label, is_default, text
                FROM digest_texts WHERE section = ?1 ORDER BY id"#,
        )
        .bind(section)
        .fetch_all(&self.pool)
        .await?;
        Ok(texts)
    }

    async fn upsert_category(&self, tag_id: i64, description: &str) -> Result<(), StoreError> {
        query(
            r#"INSERT INTO categories (tag_id, description) VALUES (?1, ?2)
                ON CONFLICT (tag_id) DO UPDATE SET description = excluded.description"#,
        )
        .bind(tag_id)
        .bind(description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn claim_access_requests(&self, limit: i64) -> Result<Vec<AccessRequest>, StoreError> {
        let mut requests = query_as::<_, AccessRequest>(
            r#"UPDATE access_requests SET status = 'queued', updated_at = CURRENT_TIMESTAMP
                WHERE id IN (
                    SELECT id FROM access_requests WHERE status = 'pending' ORDER BY id LIMIT ?1
                )
                RETURNING id, subscriber_id, requested_url, client_name, client_email, created_at"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        requests.sort_by_key(|request| request.id);
        Ok(requests)
    }

    async fn finish_access_request(
        &self,
        id: i64,
        status: RequestStatus,
        action_done: Option<&str>,
    ) -> Result<(), StoreError> {
        query(
            r#"UPDATE access_requests
                SET status = ?2, action_done = COALESCE(?3, action_done), updated_at = CURRENT_TIMESTAMP
                WHERE id = ?1"#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(action_done)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn claim_traffic_reports(&self, limit: i64) -> Result<Vec<TrafficReportJob>, StoreError> {
        let mut reports = query_as::<_, TrafficReportJob>(
            r#"UPDATE traffic_reports SET status = 'queued', updated_at = CURRENT_TIMESTAMP
                WHERE id IN (
                    SELECT id FROM traffic_reports WHERE status = 'pending' ORDER BY id LIMIT ?1
                )
                RETURNING id, report_key"#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        reports.sort_by_key(|report| report.id);
        Ok(reports)
    }

    async fn finish_traffic_report(&self, id: i64, status: RequestStatus) -> Result<(), StoreError> {
        query(
            r#"UPDATE traffic_reports SET status = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?1"#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn requeue_interrupted(&self) -> Result<u64, StoreError> {
        let mut restored = 0;
        for sql in [
            "UPDATE access_requests SET status = 'pending' WHERE status = 'queued'",
            "UPDATE traffic_reports SET status = 'pending' WHERE status = 'queued'",
        ] {
            restored += query(sql).execute(&self.pool).await?.rows_affected();
        }
        Ok(restored)
    }
}
