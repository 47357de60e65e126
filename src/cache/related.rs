//! Related-URL computation for content invalidation.

use std::collections::HashSet;
use std::fmt;

use time::Date;
use url::Url;

use super::purge::ContentChange;

/// Permalink knowledge supplied by the host site.
pub trait SiteLinks: Send + Sync + fmt::Debug {
    fn home_url(&self) -> String;
    /// The posts index page, when it is distinct from home.
    fn posts_index_url(&self) -> Option<String>;
    fn author_url(&self, author_id: &str) -> Option<String>;
    /// Year, month and day archives for `date`.
    fn date_archive_urls(&self, date: Date) -> Vec<String>;
    fn feed_urls(&self) -> Vec<String>;
}

/// Pretty-permalink URL scheme rooted at a site origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermalinkLayout {
    base: String,
    posts_index_path: Option<String>,
}

impl PermalinkLayout {
    pub fn new(base_url: &str, posts_index_path: Option<&str>) -> Self {
        Self {
            base: base_url.trim_end_matches('/').to_string(),
            posts_index_path: posts_index_path
                .map(normalize_path)
                .filter(|path| path != "/"),
        }
    }

    /// Layout rooted at the origin of `url` (scheme, host and port).
    pub fn for_origin_of(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        parsed.host_str()?;
        Some(Self::new(&parsed.origin().ascii_serialization(), None))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }
}

impl SiteLinks for PermalinkLayout {
    fn home_url(&self) -> String {
        self.url("/")
    }

    fn posts_index_url(&self) -> Option<String> {
        self.posts_index_path.as_deref().map(|path| self.url(path))
    }

    fn author_url(&self, author_id: &str) -> Option<String> {
        let author_id = author_id.trim();
        (!author_id.is_empty()).then(|| self.url(&format!("/author/{author_id}/")))
    }

    fn date_archive_urls(&self, date: Date) -> Vec<String> {
        let year = date.year();
        let month = u8::from(date.month());
        let day = date.day();
        vec![
            self.url(&format!("/{year:04}/")),
            self.url(&format!("/{year:04}/{month:02}/")),
            self.url(&format!("/{year:04}/{month:02}/{day:02}/")),
        ]
    }

    fn feed_urls(&self) -> Vec<String> {
        vec![
            self.url("/feed/"),
            self.url("/feed/rdf/"),
            self.url("/feed/atom/"),
        ]
    }
}

fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{trimmed}/")
    }
}

/// Every URL whose rendering may embed `change`, deduplicated in first-seen order.
pub fn related_urls(change: &ContentChange, links: &dyn SiteLinks) -> Vec<String> {
    let mut urls = vec![change.canonical_url.clone(), links.home_url()];
    urls.extend(links.posts_index_url());
    urls.extend(change.content_type_archive_url.clone());
    if let Some(author_id) = &change.author_id {
        urls.extend(links.author_url(author_id));
    }
    if let Some(published_at) = change.published_at {
        urls.extend(links.date_archive_urls(published_at));
    }
    urls.extend(change.taxonomy_term_urls.iter().cloned());
    urls.extend(links.feed_urls());

    dedupe(urls)
}

/// Drop blank entries and repeats, keeping the first occurrence.
pub(crate) fn dedupe(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter()
        .filter(|url| !url.trim().is_empty())
        .filter(|url| seen.insert(url.clone()))
        .collect()
}
