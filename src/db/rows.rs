use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use crate::{
    domain::{
        AccessRequest, ActionRule, Category, DigestText, EmailTemplate, FilterProfile, Recipients,
        TrafficReportJob,
    },
    error::ConfigurationError,
    policy::parse_label,
};

impl<'r> FromRow<'r, SqliteRow> for Category {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            tag_id: row.try_get("tag_id")?,
            description: row.try_get("description")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for FilterProfile {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            is_default: row.try_get("is_default")?,
            traffic_recording: row.try_get("traffic_recording")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for EmailTemplate {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            name: row.try_get("name")?,
            subject: row.try_get("subject")?,
            html: row.try_get("html")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for DigestText {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            section: row.try_get("section")?,
            text_type: row.try_get("text_type")?,
            duration_label: row.try_get("duration_label")?,
            is_default: row.try_get("is_default")?,
            text: row.try_get("text")?,
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for AccessRequest {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let created_at: Option<DateTime<Utc>> = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            subscriber_id: row.try_get("subscriber_id")?,
            requested_url: row.try_get("requested_url")?,
            client_name: row.try_get("client_name")?,
            client_email: row.try_get("client_email")?,
            created_at: created_at.unwrap_or_else(Utc::now),
        })
    }
}

impl<'r> FromRow<'r, SqliteRow> for TrafficReportJob {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            report_key: row.try_get("report_key")?,
        })
    }
}

/// Raw `action_rules` row; the rule kind is derived from the label on conversion.
#[derive(Debug, Clone)]
pub struct ActionRuleRow {
    pub id: i64,
    pub profile_id: i64,
    pub category_id: Option<i64>,
    pub label: String,
    pub is_default: bool,
    pub is_default_traffic: bool,
    pub email_to_admin: bool,
    pub email_to_client: bool,
    pub custom_emails: Option<String>,
}

impl<'r> FromRow<'r, SqliteRow> for ActionRuleRow {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            profile_id: row.try_get("profile_id")?,
            category_id: row.try_get("category_id")?,
            label: row.try_get("label")?,
            is_default: row.try_get("is_default")?,
            is_default_traffic: row.try_get("is_default_traffic")?,
            email_to_admin: row.try_get("email_to_admin")?,
            email_to_client: row.try_get("email_to_client")?,
            custom_emails: row.try_get("custom_emails")?,
        })
    }
}

impl TryFrom<ActionRuleRow> for ActionRule {
    type Error = ConfigurationError;

    fn try_from(row: ActionRuleRow) -> Result<Self, Self::Error> {
        let kind = parse_label(&row.label)?;
        Ok(Self {
            id: row.id,
            profile_id: row.profile_id,
            category_id: row.category_id,
            kind,
            is_default: row.is_default,
            is_default_traffic: row.is_default_traffic,
            recipients: Recipients {
                admin: row.email_to_admin,
                client: row.email_to_client,
                custom: Recipients::parse_custom(row.custom_emails.as_deref()),
            },
            label: row.label,
        })
    }
}
