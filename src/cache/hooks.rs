//! Extension points.
//!
//! Each hook is an ordered list of handlers invoked synchronously; the output
//! of one handler feeds the next. Every chain runs once per operation.

use std::fmt;
use std::sync::Arc;

use super::purge::ContentChange;
use super::request::RequestDescriptor;

type ShouldCacheHook = Arc<dyn Fn(bool, &RequestDescriptor) -> bool + Send + Sync>;
type PurgeUrlsHook = Arc<dyn Fn(Vec<String>, &ContentChange) -> Vec<String> + Send + Sync>;
type MinifyHook = Arc<dyn Fn(bool, &str) -> bool + Send + Sync>;
type BeforeStoreHook = Arc<dyn Fn(String) -> String + Send + Sync>;

/// Registered extension handlers.
#[derive(Clone, Default)]
pub struct Hooks {
    should_cache: Vec<ShouldCacheHook>,
    purge_urls: Vec<PurgeUrlsHook>,
    minify: Vec<MinifyHook>,
    before_store: Vec<BeforeStoreHook>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("should_cache", &self.should_cache.len())
            .field("purge_urls", &self.purge_urls.len())
            .field("minify", &self.minify.len())
            .field("before_store", &self.before_store.len())
            .finish()
    }
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override cacheability before the built-in policy runs. Seeded with `true`.
    pub fn on_should_cache(
        mut self,
        handler: impl Fn(bool, &RequestDescriptor) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.should_cache.push(Arc::new(handler));
        self
    }

    /// Rewrite the related-URL set of an invalidation.
    pub fn on_purge_urls(
        mut self,
        handler: impl Fn(Vec<String>, &ContentChange) -> Vec<String> + Send + Sync + 'static,
    ) -> Self {
        self.purge_urls.push(Arc::new(handler));
        self
    }

    /// Veto minification for a document. Seeded with `true`.
    pub fn on_minify(
        mut self,
        handler: impl Fn(bool, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.minify.push(Arc::new(handler));
        self
    }

    /// Transform HTML before it is minified and written.
    pub fn on_before_store(
        mut self,
        handler: impl Fn(String) -> String + Send + Sync + 'static,
    ) -> Self {
        self.before_store.push(Arc::new(handler));
        self
    }

    pub(crate) fn should_cache(&self, request: &RequestDescriptor) -> bool {
        self.should_cache
            .iter()
            .fold(true, |decision, handler| handler(decision, request))
    }

    pub(crate) fn filter_purge_urls(
        &self,
        urls: Vec<String>,
        change: &ContentChange,
    ) -> Vec<String> {
        self.purge_urls
            .iter()
            .fold(urls, |urls, handler| handler(urls, change))
    }

    pub(crate) fn should_minify(&self, html: &str) -> bool {
        self.minify
            .iter()
            .fold(true, |decision, handler| handler(decision, html))
    }

    pub(crate) fn before_store(&self, html: String) -> String {
        self.before_store
            .iter()
            .fold(html, |html, handler| handler(html))
    }
}
