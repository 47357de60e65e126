//! Invalidation engine.
//!
//! Turns content lifecycle events into key deletions, then forwards the same
//! URL set to the edge collaborator when one is attached.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use time::Date;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::edge::EdgePurger;

use super::events::{InvalidationEvent, InvalidationKind};
use super::related::{PermalinkLayout, SiteLinks, dedupe, related_urls};
use super::storage::{PageStore, PurgeReport};
use super::validate::validate_url;

/// Publication state of a content item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicationStatus {
    Publish,
    Future,
    Draft,
    Pending,
    Private,
    Trash,
}

impl PublicationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Future => "future",
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Private => "private",
            Self::Trash => "trash",
        }
    }

    /// Only published content is visible to anonymous visitors.
    pub fn is_public(self) -> bool {
        matches!(self, Self::Publish)
    }
}

impl FromStr for PublicationStatus {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "publish" | "published" => Ok(Self::Publish),
            "future" | "scheduled" => Ok(Self::Future),
            "draft" => Ok(Self::Draft),
            "pending" => Ok(Self::Pending),
            "private" => Ok(Self::Private),
            "trash" => Ok(Self::Trash),
            other => Err(format!("unknown publication status `{other}`")),
        }
    }
}

/// A content lifecycle event from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentChange {
    pub content_id: String,
    pub canonical_url: String,
    pub status: PublicationStatus,
    pub is_revision: bool,
    pub is_autosave: bool,
    pub published_at: Option<Date>,
    pub author_id: Option<String>,
    /// Archive URLs of every term the item belongs to, across all taxonomies.
    pub taxonomy_term_urls: Vec<String>,
    pub content_type_archive_url: Option<String>,
}

impl ContentChange {
    /// A published, canonical item with no archive context.
    pub fn published(content_id: &str, canonical_url: &str) -> Self {
        Self {
            content_id: content_id.to_string(),
            canonical_url: canonical_url.to_string(),
            status: PublicationStatus::Publish,
            is_revision: false,
            is_autosave: false,
            published_at: None,
            author_id: None,
            taxonomy_term_urls: Vec::new(),
            content_type_archive_url: None,
        }
    }
}

/// Why an invalidation did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Autosave,
    Revision,
    NotPublic,
    InvalidUrl,
}

impl SkipReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Autosave => "autosave",
            Self::Revision => "revision",
            Self::NotPublic => "not_public",
            Self::InvalidUrl => "invalid_url",
        }
    }
}

/// What happened at the edge for one invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeStatus {
    NotConfigured,
    Skipped,
    Purged,
    Failed,
}

impl EdgeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Skipped => "skipped",
            Self::Purged => "purged",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationReport {
    pub event_id: Uuid,
    pub kind: InvalidationKind,
    /// The final URL set, after the purge-URL hooks ran.
    pub urls: Vec<String>,
    pub skipped: Option<SkipReason>,
    /// URLs (or files, for a full purge) removed locally or already absent.
    pub local_deleted: usize,
    /// URLs (or files, for a full purge) whose local deletion failed.
    pub local_failures: usize,
    pub edge: EdgeStatus,
}

impl InvalidationReport {
    fn skipped(event: &InvalidationEvent, reason: SkipReason) -> Self {
        Self {
            event_id: event.id,
            kind: event.kind,
            urls: Vec::new(),
            skipped: Some(reason),
            local_deleted: 0,
            local_failures: 0,
            edge: EdgeStatus::Skipped,
        }
    }

    pub fn is_success(&self) -> bool {
        self.skipped.is_none() && self.local_failures == 0 && self.edge != EdgeStatus::Failed
    }
}

#[derive(Debug, Clone)]
pub struct PurgeEngine {
    store: Arc<PageStore>,
    links: Option<Arc<dyn SiteLinks>>,
    edge: Option<Arc<dyn EdgePurger>>,
}

impl PurgeEngine {
    pub fn new(store: Arc<PageStore>) -> Self {
        Self {
            store,
            links: None,
            edge: None,
        }
    }

    /// Site permalinks for related URLs. Without them, a pretty-permalink
    /// layout at the origin of each item's canonical URL is used.
    pub fn with_links(mut self, links: Arc<dyn SiteLinks>) -> Self {
        self.links = Some(links);
        self
    }

    pub fn with_edge(mut self, edge: Arc<dyn EdgePurger>) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn has_edge(&self) -> bool {
        self.edge.is_some()
    }

    /// Purge everything related to a published or updated item.
    pub async fn on_content_changed(&self, change: &ContentChange) -> InvalidationReport {
        let event = InvalidationEvent::begin(InvalidationKind::ContentChanged, &change.content_id);
        let reason = if change.is_autosave {
            Some(SkipReason::Autosave)
        } else if change.is_revision {
            Some(SkipReason::Revision)
        } else if !change.status.is_public() {
            Some(SkipReason::NotPublic)
        } else {
            None
        };
        if let Some(reason) = reason {
            return self.skip(&event, reason);
        }

        let Some(urls) = self.related_for(change) else {
            return self.skip(&event, SkipReason::InvalidUrl);
        };
        self.purge_set(&event, urls, true).await
    }

    /// Purge everything related to a removed item, whatever its last status.
    pub async fn on_content_deleted(&self, change: &ContentChange) -> InvalidationReport {
        let event = InvalidationEvent::begin(InvalidationKind::ContentDeleted, &change.content_id);
        if change.is_autosave {
            return self.skip(&event, SkipReason::Autosave);
        }
        if change.is_revision {
            return self.skip(&event, SkipReason::Revision);
        }

        let Some(urls) = self.related_for(change) else {
            return self.skip(&event, SkipReason::InvalidUrl);
        };
        self.purge_set(&event, urls, true).await
    }

    /// A comment changed: only the commented item's page is stale.
    pub async fn on_comment_changed(&self, canonical_url: &str) -> InvalidationReport {
        let event = InvalidationEvent::begin(InvalidationKind::CommentChanged, canonical_url);
        if !validate_url(canonical_url) {
            return self.skip(&event, SkipReason::InvalidUrl);
        }
        self.purge_set(&event, vec![canonical_url.to_string()], false)
            .await
    }

    pub async fn purge_url(&self, url: &str) -> InvalidationReport {
        let event = InvalidationEvent::begin(InvalidationKind::Url, url);
        if !validate_url(url) {
            return self.skip(&event, SkipReason::InvalidUrl);
        }
        self.purge_set(&event, vec![url.to_string()], true).await
    }

    /// Remove every local page and ask the edge to drop everything.
    pub async fn purge_all(&self) -> InvalidationReport {
        let started_at = Instant::now();
        let event = InvalidationEvent::begin(InvalidationKind::All, "*");

        let store = self.store.clone();
        let local = match tokio::task::spawn_blocking(move || store.purge_all()).await {
            Ok(report) => report,
            Err(err) => {
                error!(
                    event_id = %event.id,
                    op = "cache::purge::purge_all",
                    result = "join_error",
                    error = %err,
                    "Local purge task failed"
                );
                PurgeReport {
                    deleted: 0,
                    failed: 1,
                }
            }
        };

        let edge = match &self.edge {
            None => EdgeStatus::NotConfigured,
            Some(edge) if edge.purge_everything().await => EdgeStatus::Purged,
            Some(_) => EdgeStatus::Failed,
        };

        let report = InvalidationReport {
            event_id: event.id,
            kind: event.kind,
            urls: Vec::new(),
            skipped: None,
            local_deleted: local.deleted,
            local_failures: local.failed,
            edge,
        };
        log_complete(&report, started_at);
        report
    }

    /// `None` when the canonical URL is not an absolute http(s) URL.
    fn related_for(&self, change: &ContentChange) -> Option<Vec<String>> {
        if !validate_url(&change.canonical_url) {
            return None;
        }
        let computed = match &self.links {
            Some(links) => related_urls(change, links.as_ref()),
            None => related_urls(
                change,
                &PermalinkLayout::for_origin_of(&change.canonical_url)?,
            ),
        };
        Some(dedupe(self.store.hooks().filter_purge_urls(computed, change)))
    }

    async fn purge_set(
        &self,
        event: &InvalidationEvent,
        urls: Vec<String>,
        mark_purged: bool,
    ) -> InvalidationReport {
        let started_at = Instant::now();

        let store = self.store.clone();
        let local_urls = urls.clone();
        let local_failures = match tokio::task::spawn_blocking(move || {
            let failures = local_urls.iter().filter(|url| !store.purge_url(url)).count();
            if mark_purged {
                store.stats().mark_purged(store.now());
            }
            failures
        })
        .await
        {
            Ok(failures) => failures,
            Err(err) => {
                error!(
                    event_id = %event.id,
                    op = "cache::purge::local",
                    result = "join_error",
                    error = %err,
                    "Local purge task failed"
                );
                urls.len()
            }
        };

        let edge = self.forward(event, &urls).await;
        let report = InvalidationReport {
            event_id: event.id,
            kind: event.kind,
            local_deleted: urls.len().saturating_sub(local_failures),
            urls,
            skipped: None,
            local_failures,
            edge,
        };
        log_complete(&report, started_at);
        report
    }

    async fn forward(&self, event: &InvalidationEvent, urls: &[String]) -> EdgeStatus {
        let Some(edge) = &self.edge else {
            return EdgeStatus::NotConfigured;
        };
        if urls.is_empty() {
            return EdgeStatus::Skipped;
        }
        if edge.purge_urls(urls).await {
            EdgeStatus::Purged
        } else {
            warn!(
                event_id = %event.id,
                op = "cache::purge::edge",
                result = "failed",
                url_count = urls.len(),
                "Edge purge failed; local entries were still removed"
            );
            EdgeStatus::Failed
        }
    }

    fn skip(&self, event: &InvalidationEvent, reason: SkipReason) -> InvalidationReport {
        info!(
            event_id = %event.id,
            event_kind = %event.kind,
            reason = reason.as_str(),
            "Cache invalidation skipped"
        );
        InvalidationReport::skipped(event, reason)
    }
}

fn log_complete(report: &InvalidationReport, started_at: Instant) {
    info!(
        event_id = %report.event_id,
        event_kind = %report.kind,
        url_count = report.urls.len(),
        local_deleted = report.local_deleted,
        local_failures = report.local_failures,
        edge = report.edge.as_str(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "Cache invalidation complete"
    );
}
