use std::{fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::{DigestText, EmailTemplate, FilterProfile};

use super::{NewActionRule, ReferenceStore, SqliteStore};

/// Initial profiles, rules and templates for a fresh database.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedFile {
    pub default_profile: Option<SeedProfile>,
    pub profiles: Vec<SeedProfile>,
    pub templates: Vec<EmailTemplate>,
    pub digest_texts: Vec<DigestText>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedProfile {
    pub name: String,
    pub traffic_recording: bool,
    pub clients: Vec<String>,
    pub rules: Vec<SeedRule>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SeedRule {
    /// Platform tag the rule applies to; `None` for category-less default rules.
    pub tag_id: Option<i64>,
    pub description: Option<String>,
    pub label: String,
    pub is_default: bool,
    pub is_default_traffic: bool,
    pub email_to_admin: bool,
    pub email_to_client: bool,
    pub custom_emails: Option<String>,
    pub position: i64,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedSummary {
    pub profiles: usize,
    pub rules: usize,
    pub templates: usize,
}

pub fn read_seed(path: &Path) -> Result<SeedFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read seed file {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse seed file {}", path.display()))
}

/// Loads the seed into the store unless rules are already configured.
pub async fn apply_seed(
    store: &SqliteStore,
    default_profile: &FilterProfile,
    seed: SeedFile,
) -> Result<Option<SeedSummary>> {
    if store.has_rules().await? {
        tracing::info!(target: "db", "rules already configured; seed skipped");
        return Ok(None);
    }

    let mut summary = SeedSummary::default();

    if let Some(profile) = seed.default_profile {
        store
            .set_traffic_recording(default_profile.id, profile.traffic_recording)
            .await?;
        summary.rules += seed_profile(store, default_profile.id, profile).await?;
    }

    for profile in seed.profiles {
        let id = store
            .insert_profile(&profile.name, profile.traffic_recording)
            .await?;
        summary.profiles += 1;
        summary.rules += seed_profile(store, id, profile).await?;
    }

    for template in &seed.templates {
        store.upsert_template(template).await?;
        summary.templates += 1;
    }
    for text in &seed.digest_texts {
        store.insert_digest_text(text).await?;
    }

    tracing::info!(
        target: "db",
        profiles = summary.profiles,
        rules = summary.rules,
        templates = summary.templates,
        "seed applied"
    );
    Ok(Some(summary))
}

async fn seed_profile(store: &SqliteStore, profile_id: i64, profile: SeedProfile) -> Result<usize> {
    for email in &profile.clients {
        store.assign_client(email, profile_id).await?;
    }

    let mut inserted = 0;
    for rule in profile.rules {
        let category_id = match rule.tag_id {
            Some(tag_id) => Some(category_for_tag(store, tag_id, rule.description.as_deref()).await?),
            None => None,
        };
        store
            .insert_action_rule(NewActionRule {
                profile_id,
                category_id,
                label: rule.label.clone(),
                is_default: rule.is_default,
                is_default_traffic: rule.is_default_traffic,
                email_to_admin: rule.email_to_admin,
                email_to_client: rule.email_to_client,
                custom_emails: rule.custom_emails,
                position: rule.position,
            })
            .await
            .with_context(|| format!("invalid rule `{}` in profile {profile_id}", rule.label))?;
        inserted += 1;
    }
    Ok(inserted)
}

/// Existing descriptions win over the seed's; the catalogue sync refreshes them later.
async fn category_for_tag(
    store: &SqliteStore,
    tag_id: i64,
    description: Option<&str>,
) -> Result<i64> {
    if let Some(category) = store.categories_by_tag_ids(&[tag_id]).await?.pop() {
        return Ok(category.id);
    }
    store
        .upsert_category(tag_id, description.unwrap_or_default())
        .await?;
    store
        .categories_by_tag_ids(&[tag_id])
        .await?
        .pop()
        .map(|category| category.id)
        .with_context(|| format!("category for tag {tag_id} was not stored"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::init_pool, domain::RuleKind, policy::RuleScope};

    const SEED: &str = r#"{
        "default_profile": {
            "traffic_recording": true,
            "rules": [
                { "tag_id": 42, "description": "news", "label": "Open URL for 2 Hours", "position": 1 },
                { "label": "Open Domain", "is_default": true }
            ]
        },
        "profiles": [
            {
                "name": "strict",
                "clients": ["c@example.com"],
                "rules": [{ "tag_id": 42, "label": "Send email template notice", "email_to_admin": true }]
            }
        ],
        "templates": [{ "name": "notice", "subject": "Hi", "html": "<p>{url}</p>" }],
        "digest_texts": [{ "section": "open", "text_type": "pre_text", "text": "Opened:" }]
    }"#;

    #[tokio::test]
    async fn seed_populates_empty_store_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(init_pool(&dir.path().join("seed.db")).await.unwrap());
        let default_profile = store.ensure_default_profile().await.unwrap();

        let seed: SeedFile = serde_json::from_str(SEED).unwrap();
        let summary = apply_seed(&store, &default_profile, seed).await.unwrap();
        assert_eq!(
            summary,
            Some(SeedSummary {
                profiles: 1,
                rules: 3,
                templates: 1
            })
        );

        let category = store.categories_by_tag_ids(&[42]).await.unwrap().remove(0);
        assert_eq!(category.description, "news");
        let rules = store
            .rules_for_category(default_profile.id, category.id)
            .await
            .unwrap();
        assert!(matches!(rules[0].kind, Some(RuleKind::OpenUrlFor(_))));
        let defaults = store
            .default_rules(default_profile.id, RuleScope::Request)
            .await
            .unwrap();
        assert_eq!(defaults[0].kind, Some(RuleKind::OpenDomain));

        let strict = store.profile_for_client("c@example.com").await.unwrap().unwrap();
        assert_eq!(strict.name, "strict");
        assert!(store.ensure_default_profile().await.unwrap().traffic_recording);
        assert!(store.email_template("notice").await.unwrap().is_some());
        assert_eq!(store.digest_texts("open").await.unwrap().len(), 1);

        let again: SeedFile = serde_json::from_str(SEED).unwrap();
        assert_eq!(apply_seed(&store, &default_profile, again).await.unwrap(), None);
    }

    #[tokio::test]
    async fn seed_with_bad_label_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(init_pool(&dir.path().join("seed.db")).await.unwrap());
        let default_profile = store.ensure_default_profile().await.unwrap();

        let seed: SeedFile = serde_json::from_str(
            r#"{ "default_profile": { "rules": [{ "label": "Open URL for 3 Fortnights" }] } }"#,
        )
        .unwrap();
        assert!(apply_seed(&store, &default_profile, seed).await.is_err());
    }
}
