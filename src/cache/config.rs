//! Cacheability configuration.
//!
//! An immutable snapshot handed to every cache call. Hosts rebuild it after
//! any settings write instead of mutating shared state.

use glob::Pattern;

const DEFAULT_TTL_SECONDS: u64 = 86_400;
const DEFAULT_STATS_FLUSH_EVERY: u64 = 10;
const DEFAULT_STATS_REFRESH_DELAY_SECS: u64 = 5;
pub(crate) const DEFAULT_LOGIN_COOKIE_PREFIX: &str = "wordpress_logged_in_";

pub(crate) const DEFAULT_ALLOWED_QUERY_PARAMS: [&str; 7] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_content",
    "utm_term",
    "fbclid",
    "gclid",
];

pub(crate) const DEFAULT_EXCLUDED_COOKIES: [&str; 3] = [
    "wordpress_logged_in_*",
    "woocommerce_cart_hash",
    "woocommerce_items_in_cart",
];

/// A shell-style pattern (`*`, `?`, `[...]`), kept alongside its source text.
///
/// Text that is not a valid pattern matches only itself.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    source: String,
    compiled: Option<Pattern>,
}

impl GlobPattern {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.to_string(),
            compiled: Pattern::new(source).ok(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match &self.compiled {
            Some(pattern) => pattern.matches(candidate),
            None => self.source == candidate,
        }
    }
}

/// Settings snapshot consulted by the policy, key derivation and storage.
#[derive(Debug, Clone)]
pub struct CacheabilityConfig {
    pub page_cache_enabled: bool,
    pub ttl_seconds: u64,
    pub cache_logged_in: bool,
    pub mobile_cache: bool,
    pub gzip_enabled: bool,
    pub html_minify_enabled: bool,
    /// Cache every query string regardless of the allow-list.
    pub cache_query_strings: bool,
    pub allowed_query_params: Vec<String>,
    pub excluded_urls: Vec<GlobPattern>,
    pub excluded_cookies: Vec<GlobPattern>,
    pub excluded_user_agents: Vec<GlobPattern>,
    /// Hit/miss events per statistics flush.
    pub stats_flush_every: u64,
    /// Delay before a store schedules the statistics rescan.
    pub stats_refresh_delay_secs: u64,
}

impl Default for CacheabilityConfig {
    fn default() -> Self {
        Self {
            page_cache_enabled: true,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            cache_logged_in: false,
            mobile_cache: false,
            gzip_enabled: true,
            html_minify_enabled: true,
            cache_query_strings: false,
            allowed_query_params: DEFAULT_ALLOWED_QUERY_PARAMS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            excluded_urls: Vec::new(),
            excluded_cookies: compile_patterns(DEFAULT_EXCLUDED_COOKIES),
            excluded_user_agents: Vec::new(),
            stats_flush_every: DEFAULT_STATS_FLUSH_EVERY,
            stats_refresh_delay_secs: DEFAULT_STATS_REFRESH_DELAY_SECS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheabilityConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            page_cache_enabled: settings.page_cache_enabled,
            ttl_seconds: settings.ttl.as_secs(),
            cache_logged_in: settings.cache_logged_in,
            mobile_cache: settings.mobile_cache,
            gzip_enabled: settings.gzip_enabled,
            html_minify_enabled: settings.html_minify_enabled,
            cache_query_strings: settings.cache_query_strings,
            allowed_query_params: settings.allowed_query_params.clone(),
            excluded_urls: compile_patterns(&settings.excluded_urls),
            excluded_cookies: compile_patterns(&settings.excluded_cookies),
            excluded_user_agents: compile_patterns(&settings.excluded_user_agents),
            stats_flush_every: settings.stats_flush_every.get(),
            stats_refresh_delay_secs: settings.stats_refresh_delay.as_secs(),
        }
    }
}

impl CacheabilityConfig {
    /// Expiry timestamp for an entry written at `now`.
    pub fn expires_at(&self, now: i64) -> i64 {
        now.saturating_add(i64::try_from(self.ttl_seconds).unwrap_or(i64::MAX))
    }
}

/// Compile patterns, dropping blank entries (an empty needle would match every URL).
pub fn compile_patterns<I, S>(patterns: I) -> Vec<GlobPattern>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .filter_map(|raw| {
            let trimmed = raw.as_ref().trim();
            (!trimmed.is_empty()).then(|| GlobPattern::new(trimmed))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheabilityConfig::default();
        assert!(config.page_cache_enabled);
        assert_eq!(config.ttl_seconds, 86_400);
        assert!(!config.cache_logged_in);
        assert!(!config.mobile_cache);
        assert!(config.gzip_enabled);
        assert!(config.html_minify_enabled);
        assert!(!config.cache_query_strings);
        assert_eq!(config.allowed_query_params.len(), 7);
        assert_eq!(config.excluded_cookies.len(), 3);
        assert_eq!(config.stats_flush_every, 10);
    }

    #[test]
    fn glob_pattern_wildcards() {
        let pattern = GlobPattern::new("wordpress_logged_in_*");
        assert!(pattern.matches("wordpress_logged_in_99"));
        assert!(!pattern.matches("wordpress_test_cookie"));

        let any_path = GlobPattern::new("*/cart/*");
        assert!(any_path.matches("https://shop.example/cart/items"));
    }

    #[test]
    fn invalid_glob_matches_literally() {
        let pattern = GlobPattern::new("[unclosed");
        assert!(pattern.matches("[unclosed"));
        assert!(!pattern.matches("u"));
    }

    #[test]
    fn blank_patterns_are_dropped() {
        let compiled = compile_patterns(["", "  ", "/checkout/"]);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].as_str(), "/checkout/");
    }

    #[test]
    fn expiry_saturates() {
        let config = CacheabilityConfig {
            ttl_seconds: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.expires_at(10), i64::MAX);
        assert_eq!(CacheabilityConfig::default().expires_at(1_000), 87_400);
    }
}
