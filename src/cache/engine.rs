//! Request-level entry point: policy, key derivation and serving in one call.

use std::sync::Arc;

use tracing::debug;

use super::config::CacheabilityConfig;
use super::keys::{PageKey, derive_key, is_mobile_variant};
use super::policy::{Bypass, evaluate};
use super::request::RequestDescriptor;
use super::serving::CachedPage;
use super::storage::{EntrySource, PageStore};

/// Result of consulting the cache for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The request must not be served from or written to the cache.
    Bypass(Bypass),
    Hit(CachedPage),
    /// Cacheable but absent or expired; render and store under this key.
    Miss(PageKey),
}

#[derive(Debug, Clone)]
pub struct PageCache {
    store: Arc<PageStore>,
}

impl PageCache {
    pub fn new(store: Arc<PageStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<PageStore> {
        &self.store
    }

    pub fn lookup(&self, request: &RequestDescriptor, config: &CacheabilityConfig) -> Lookup {
        let decision = if self.store.hooks().should_cache(request) {
            evaluate(request, config)
        } else {
            Err(Bypass::Extension)
        };

        if let Err(reason) = decision {
            debug!(
                op = "cache::engine::lookup",
                result = "bypass",
                reason = reason.as_str(),
                url = %request.url(),
                "Request bypasses the page cache"
            );
            return Lookup::Bypass(reason);
        }

        let key = derive_key(request, config);
        match self
            .store
            .get(&key, request.accepts_compressed_encoding, config)
        {
            Some(page) => Lookup::Hit(page),
            None => Lookup::Miss(key),
        }
    }

    /// Store a freshly rendered page for `request` under `key`.
    pub fn store_rendered(
        &self,
        request: &RequestDescriptor,
        key: &PageKey,
        html: &str,
        config: &CacheabilityConfig,
    ) -> bool {
        let url = request.url();
        self.store.store(
            key,
            EntrySource {
                url: &url,
                mobile: is_mobile_variant(request, config),
            },
            html,
            config,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::FixedClock;
    use crate::cache::deferred::InlineDeferred;
    use crate::cache::hooks::Hooks;
    use crate::cache::keys::hash_key;
    use crate::cache::serving::Encoding;

    fn cache(hooks: Hooks) -> (tempfile::TempDir, PageCache) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = PageStore::open(
            dir.path(),
            Arc::new(FixedClock::at(1_000)),
            Arc::new(InlineDeferred),
            hooks,
        )
        .expect("store");
        (dir, PageCache::new(Arc::new(store)))
    }

    #[test]
    fn miss_then_hit() {
        let (_dir, cache) = cache(Hooks::new());
        let config = CacheabilityConfig::default();
        let request = RequestDescriptor::get("https://example.com/post/")
            .expect("request")
            .accepting_gzip(true);

        let Lookup::Miss(key) = cache.lookup(&request, &config) else {
            panic!("expected a miss");
        };
        assert_eq!(key, hash_key("https://example.com/post/"));
        assert!(cache.store_rendered(&request, &key, "<p>rendered</p>", &config));

        match cache.lookup(&request, &config) {
            Lookup::Hit(page) => assert_eq!(page.encoding, Encoding::Gzip),
            other => panic!("expected a hit, got {other:?}"),
        }
    }

    #[test]
    fn policy_rejection_is_reported() {
        let (_dir, cache) = cache(Hooks::new());
        let request = RequestDescriptor::get("https://example.com/")
            .expect("request")
            .with_method("POST");
        assert_eq!(
            cache.lookup(&request, &CacheabilityConfig::default()),
            Lookup::Bypass(Bypass::Method)
        );
    }

    #[test]
    fn hook_veto_precedes_policy() {
        let hooks = Hooks::new().on_should_cache(|_, request| !request.url().contains("/live/"));
        let (_dir, cache) = cache(hooks);
        let request = RequestDescriptor::get("https://example.com/live/").expect("request");
        assert_eq!(
            cache.lookup(&request, &CacheabilityConfig::default()),
            Lookup::Bypass(Bypass::Extension)
        );
    }

    #[test]
    fn mobile_variant_is_stored_separately() {
        let (_dir, cache) = cache(Hooks::new());
        let config = CacheabilityConfig {
            mobile_cache: true,
            ..Default::default()
        };
        let mobile = RequestDescriptor::get("http://host/foo/")
            .expect("request")
            .mobile(true);
        let Lookup::Miss(key) = cache.lookup(&mobile, &config) else {
            panic!("expected a miss");
        };
        cache.store_rendered(&mobile, &key, "<p>m</p>", &config);

        let record = cache.store().metadata(&key).expect("record");
        assert!(record.mobile);
        assert_eq!(record.url, "http://host/foo/");

        let desktop = RequestDescriptor::get("http://host/foo/").expect("request");
        assert!(matches!(cache.lookup(&desktop, &config), Lookup::Miss(_)));
    }
}
