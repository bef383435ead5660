use std::{collections::HashSet, sync::Arc};

use serde_json::Value;

use crate::{
    domain::{PolicyEntry, SubscriberId},
    error::EngineError,
    platform::FilterPlatform,
};

/// Dedup identity of a URL-list item: `(url, rule)` plus the raw `exp` when present.
/// `exp` is compared as written, so `0` and float timestamps stay distinct from a
/// missing expiry. Items without a string `url` have no identity and are always kept.
fn entry_identity(item: &Value) -> Option<(String, String, Option<String>)> {
    let url = item.get("url")?.as_str()?.to_string();
    let rule = item
        .get("rule")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let exp = item.get("exp").map(Value::to_string);
    Some((url, rule, exp))
}

/// New entries first, then the existing list, keeping the first occurrence of each identity.
pub fn merge_entries(fresh: &[PolicyEntry], existing: Vec<Value>) -> Vec<Value> {
    let mut seen = HashSet::new();
    let fresh_values = fresh.iter().map(|entry| {
        serde_json::to_value(entry).unwrap_or_else(|_| Value::String(entry.url.clone()))
    });
    fresh_values
        .chain(existing)
        .filter(|item| match entry_identity(item) {
            Some(identity) => seen.insert(identity),
            None => true,
        })
        .collect()
}

pub struct SyncEngine {
    platform: Arc<dyn FilterPlatform>,
}

impl SyncEngine {
    pub fn new(platform: Arc<dyn FilterPlatform>) -> Self {
        Self { platform }
    }

    /// Fetches the subscriber's settings, merges `entries` into the inspector URL
    /// list and pushes the result back in one call.
    pub async fn sync(
        &self,
        subscriber: &SubscriberId,
        entries: &[PolicyEntry],
    ) -> Result<usize, EngineError> {
        let numeric = subscriber.numeric()?;
        let mut policy = self.platform.fetch_policy(numeric).await?;
        let existing = policy.urls();
        let before = existing.len();
        let merged = merge_entries(entries, existing);
        let total = merged.len();
        policy.set_urls(merged);
        self.platform.push_policy(numeric, &policy).await?;

        tracing::info!(
            target: "sync",
            subscriber = %subscriber,
            added = total.saturating_sub(before),
            total,
            "policy synchronised"
        );
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePlatform;
    use serde_json::json;

    #[test]
    fn duplicates_collapse_to_first_occurrence() {
        let fresh = vec![
            PolicyEntry::open("http://a.example/"),
            PolicyEntry::open_until("http://b.example/", 10),
            PolicyEntry::open("http://a.example/"),
        ];
        let existing = vec![
            json!({"url": "http://b.example/", "rule": "open", "exp": 10}),
            json!({"url": "http://b.example/", "rule": "open", "exp": 20}),
            json!({"url": "http://a.example/", "rule": "block"}),
            json!("opaque"),
        ];
        let merged = merge_entries(&fresh, existing);
        assert_eq!(
            merged,
            vec![
                json!({"url": "http://a.example/", "rule": "open"}),
                json!({"url": "http://b.example/", "rule": "open", "exp": 10}),
                json!({"url": "http://b.example/", "rule": "open", "exp": 20}),
                json!({"url": "http://a.example/", "rule": "block"}),
                json!("opaque"),
            ]
        );
    }

    #[test]
    fn merging_twice_changes_nothing() {
        let fresh = vec![
            PolicyEntry::open_until("http://a.example/", 99),
            PolicyEntry::open_until("http://a.example/", 99),
            PolicyEntry::open("http://c.example/"),
        ];
        let existing = vec![json!({"url": "http://z.example/", "rule": "open"})];
        let once = merge_entries(&fresh, existing);
        let twice = merge_entries(&fresh, once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn zero_and_float_expiries_are_not_permanent() {
        let fresh = vec![PolicyEntry::open("http://a.example/")];
        let existing = vec![
            json!({"url": "http://a.example/", "rule": "open", "exp": 1_700_000_000_000.0}),
            json!({"url": "http://b.example/", "rule": "open", "exp": 0}),
            json!({"url": "http://b.example/", "rule": "open"}),
            json!({"url": "http://a.example/", "rule": "open"}),
        ];
        let merged = merge_entries(&fresh, existing);
        assert_eq!(
            merged,
            vec![
                json!({"url": "http://a.example/", "rule": "open"}),
                json!({"url": "http://a.example/", "rule": "open", "exp": 1_700_000_000_000.0}),
                json!({"url": "http://b.example/", "rule": "open", "exp": 0}),
                json!({"url": "http://b.example/", "rule": "open"}),
            ]
        );
    }

    #[test]
    fn timed_fresh_entry_matches_existing_integer_expiry() {
        let fresh = vec![PolicyEntry::open_until("http://a.example/", 1_700_000_000_000)];
        let existing = vec![json!({"url": "http://a.example/", "rule": "open", "exp": 1_700_000_000_000_i64})];
        assert_eq!(merge_entries(&fresh, existing).len(), 1);
    }

    #[tokio::test]
    async fn sync_pushes_merged_list() {
        let platform = FakePlatform::new().with_policy(json!({
            "filterSettings": {"level": 2},
            "inspectorSettings": {"urls": [{"url": "http://old.example/", "rule": "open"}]}
        }));
        let engine = SyncEngine::new(Arc::new(platform.clone()));
        let total = engine
            .sync(&SubscriberId::new("u77"), &[PolicyEntry::open("http://new.example/")])
            .await
            .unwrap();
        assert_eq!(total, 2);

        let pushed = platform.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0].0, 77);
        assert_eq!(
            pushed[0].1.urls(),
            vec![
                json!({"url": "http://new.example/", "rule": "open"}),
                json!({"url": "http://old.example/", "rule": "open"}),
            ]
        );
        assert_eq!(pushed[0].1.filter_settings, json!({"level": 2}));
    }

    #[tokio::test]
    async fn rejected_push_is_a_failure() {
        let platform = FakePlatform::new()
            .with_policy(json!({"inspectorSettings": {"urls": []}}))
            .rejecting_push();
        let engine = SyncEngine::new(Arc::new(platform));
        let result = engine
            .sync(&SubscriberId::new("5"), &[PolicyEntry::open("http://x.example/")])
            .await;
        assert!(matches!(result, Err(EngineError::External(_))));
    }
}
