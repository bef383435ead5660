use std::sync::Arc;

use crate::{
    db::ReferenceStore,
    domain::{Category, FilterProfile, SubscriberInfo},
    error::StoreError,
    platform::FilterPlatform,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCategories {
    /// Matched categories in ascending tag id order.
    pub categories: Vec<Category>,
    /// The tag lookup failed and was treated as "no match".
    pub lookup_failed: bool,
}

impl ResolvedCategories {
    pub fn match_count(&self) -> usize {
        self.categories.len()
    }
}

pub struct CategoryResolver {
    platform: Arc<dyn FilterPlatform>,
    store: Arc<dyn ReferenceStore>,
    default_profile: Arc<FilterProfile>,
}

impl CategoryResolver {
    pub fn new(
        platform: Arc<dyn FilterPlatform>,
        store: Arc<dyn ReferenceStore>,
        default_profile: Arc<FilterProfile>,
    ) -> Self {
        Self {
            platform,
            store,
            default_profile,
        }
    }

    /// Tag ids the platform associates with a URL. Platform failures become an
    /// empty set and are flagged rather than raised.
    pub async fn tag_ids(&self, url_or_domain: &str) -> (Vec<i64>, bool) {
        let host = match self.platform.search_host(url_or_domain).await {
            Ok(host) => host,
            Err(err) => {
                tracing::warn!(target: "resolver", url = url_or_domain, error = %err, "host search failed; using empty host");
                String::new()
            }
        };
        match self.platform.lookup_tags(&host).await {
            Ok(ids) => (ids, false),
            Err(err) => {
                tracing::warn!(target: "resolver", url = url_or_domain, host = %host, error = %err, "tag lookup failed; treating as no match");
                (Vec::new(), true)
            }
        }
    }

    pub async fn resolve(&self, url_or_domain: &str) -> Result<ResolvedCategories, StoreError> {
        let (ids, lookup_failed) = self.tag_ids(url_or_domain).await;
        let mut categories = if ids.is_empty() {
            Vec::new()
        } else {
            self.store.categories_by_tag_ids(&ids).await?
        };
        categories.sort_by_key(|category| category.tag_id);
        categories.dedup_by_key(|category| category.tag_id);

        tracing::debug!(
            target: "resolver",
            url = url_or_domain,
            tags = ids.len(),
            matched = categories.len(),
            "categories resolved"
        );
        Ok(ResolvedCategories {
            categories,
            lookup_failed,
        })
    }

    /// The client's own profile when one is recorded, else the system default.
    pub async fn profile_for(&self, client: &SubscriberInfo) -> Result<Arc<FilterProfile>, StoreError> {
        if client.email.is_empty() {
            return Ok(self.default_profile.clone());
        }
        Ok(match self.store.profile_for_client(&client.email).await? {
            Some(profile) => Arc::new(profile),
            None => self.default_profile.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakePlatform, FakeStore};

    fn resolver(platform: FakePlatform, store: FakeStore) -> CategoryResolver {
        let profile = Arc::new(store.default_profile());
        CategoryResolver::new(Arc::new(platform), Arc::new(store), profile)
    }

    #[tokio::test]
    async fn unknown_tags_are_dropped_and_order_is_by_tag() {
        let store = FakeStore::new()
            .with_category(1, 90, "games")
            .with_category(2, 42, "news");
        let platform = FakePlatform::new().with_tags(vec![90, 5, 42]);
        let resolved = resolver(platform, store)
            .resolve("http://a.example/")
            .await
            .unwrap();
        let tags: Vec<i64> = resolved.categories.iter().map(|c| c.tag_id).collect();
        assert_eq!(tags, vec![42, 90]);
        assert_eq!(resolved.match_count(), 2);
        assert!(!resolved.lookup_failed);
    }

    #[tokio::test]
    async fn failed_lookup_is_an_empty_match() {
        let store = FakeStore::new().with_category(1, 42, "news");
        let platform = FakePlatform::new().failing_tags();
        let resolved = resolver(platform, store)
            .resolve("http://a.example/")
            .await
            .unwrap();
        assert!(resolved.categories.is_empty());
        assert!(resolved.lookup_failed);
    }

    #[tokio::test]
    async fn client_profile_overrides_default() {
        let store = FakeStore::new().with_client_profile("c@example.com", 9, "strict");
        let resolver = resolver(FakePlatform::new(), store);
        let client = SubscriberInfo {
            full_name: "C".into(),
            email: "c@example.com".into(),
        };
        assert_eq!(resolver.profile_for(&client).await.unwrap().id, 9);
        let anonymous = SubscriberInfo::default();
        assert!(resolver.profile_for(&anonymous).await.unwrap().is_default);
    }
}
