//! Engine wiring from resolved settings.

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::{
    CacheabilityConfig, Clock, Deferred, Hooks, PageStore, PermalinkLayout, PurgeEngine,
    SiteLinks, SystemClock,
};
use crate::config::{EdgeSettings, Settings, SiteSettings};
use crate::edge::{CloudflareClient, EdgePurger};

use super::error::InfraError;

/// Open the page store at the configured directory.
pub fn open_store(
    settings: &Settings,
    deferred: Arc<dyn Deferred>,
    hooks: Hooks,
) -> Result<Arc<PageStore>, InfraError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = PageStore::open(&settings.cache.directory, clock, deferred, hooks)?;
    info!(
        op = "infra::runtime::open_store",
        result = "ok",
        cache_path = %store.layout().base().display(),
        "Page store opened"
    );
    Ok(Arc::new(store))
}

pub fn cacheability(settings: &Settings) -> Arc<CacheabilityConfig> {
    Arc::new(CacheabilityConfig::from(&settings.cache))
}

/// Permalink layout rooted at `site.base_url`, when one is configured.
pub fn site_links(site: &SiteSettings) -> Option<Arc<dyn SiteLinks>> {
    let base = site.base_url.as_deref()?;
    Some(Arc::new(PermalinkLayout::new(
        base,
        site.posts_index_path.as_deref(),
    )))
}

/// Edge client, attached only for a credentialed and verified connection.
pub fn edge_purger(edge: &EdgeSettings) -> Result<Option<Arc<dyn EdgePurger>>, InfraError> {
    if let Some(reason) = edge.credential_error.as_deref() {
        warn!(
            op = "infra::runtime::edge_purger",
            result = "credential_error",
            error = reason,
            "Edge purging disabled"
        );
        return Ok(None);
    }
    if !edge.is_usable() {
        return Ok(None);
    }
    let client = CloudflareClient::new(&edge.client_config())?;
    Ok(Some(Arc::new(client)))
}

pub fn purge_engine(settings: &Settings, store: Arc<PageStore>) -> Result<PurgeEngine, InfraError> {
    let mut engine = PurgeEngine::new(store);
    if let Some(links) = site_links(&settings.site) {
        engine = engine.with_links(links);
    }
    Ok(match edge_purger(&settings.edge)? {
        Some(edge) => engine.with_edge(edge),
        None => engine,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::ConnectionStatus;
    use crate::edge::DEFAULT_API_BASE_URL;

    fn edge(token: Option<&str>, status: ConnectionStatus) -> EdgeSettings {
        EdgeSettings {
            api_token: token.map(str::to_string),
            zone_id: Some("z1".to_string()),
            connection_status: status,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            timeout: Duration::from_secs(5),
            secret_key: None,
            credential_error: None,
        }
    }

    #[test]
    fn edge_requires_token_and_connection() {
        assert!(
            edge_purger(&edge(Some("tok"), ConnectionStatus::Connected))
                .expect("edge")
                .is_some()
        );
        assert!(
            edge_purger(&edge(Some("tok"), ConnectionStatus::Error))
                .expect("edge")
                .is_none()
        );
        assert!(
            edge_purger(&edge(None, ConnectionStatus::Connected))
                .expect("edge")
                .is_none()
        );
    }

    #[test]
    fn site_links_follow_configured_base() {
        let site = SiteSettings {
            base_url: Some("https://blog.example.com/".to_string()),
            posts_index_path: Some("blog".to_string()),
        };
        let links = site_links(&site).expect("links");
        assert_eq!(links.home_url(), "https://blog.example.com/");
        assert_eq!(
            links.posts_index_url().as_deref(),
            Some("https://blog.example.com/blog/")
        );
        assert!(site_links(&SiteSettings::default()).is_none());
    }
}
