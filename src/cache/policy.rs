//! Cacheability policy.
//!
//! A pure decision over a request and a configuration snapshot. The first
//! failing rule wins.

use super::config::{CacheabilityConfig, GlobPattern};
use super::request::RequestDescriptor;

/// Why a request was not cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bypass {
    /// A registered `should_cache` hook vetoed the request.
    Extension,
    Disabled,
    Method,
    LoggedIn,
    ExcludedCookie,
    ExcludedUrl,
    ExcludedUserAgent,
    BodyData,
    QueryString,
}

impl Bypass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Disabled => "disabled",
            Self::Method => "method",
            Self::LoggedIn => "logged_in",
            Self::ExcludedCookie => "excluded_cookie",
            Self::ExcludedUrl => "excluded_url",
            Self::ExcludedUserAgent => "excluded_user_agent",
            Self::BodyData => "body_data",
            Self::QueryString => "query_string",
        }
    }
}

/// Evaluate every rule and report the first one that rejects the request.
pub fn evaluate(request: &RequestDescriptor, config: &CacheabilityConfig) -> Result<(), Bypass> {
    if !config.page_cache_enabled {
        return Err(Bypass::Disabled);
    }

    if request.method != "GET" {
        return Err(Bypass::Method);
    }

    if request.is_logged_in && !config.cache_logged_in {
        return Err(Bypass::LoggedIn);
    }

    if request
        .cookies
        .iter()
        .any(|name| matches_any(&config.excluded_cookies, name))
    {
        return Err(Bypass::ExcludedCookie);
    }

    let url = request.url();
    if config
        .excluded_urls
        .iter()
        .any(|pattern| pattern.matches(&url) || url.contains(pattern.as_str()))
    {
        return Err(Bypass::ExcludedUrl);
    }

    if matches_any(&config.excluded_user_agents, &request.user_agent) {
        return Err(Bypass::ExcludedUserAgent);
    }

    if request.has_body_data {
        return Err(Bypass::BodyData);
    }

    if !config.cache_query_strings
        && request.query_params.iter().any(|(name, _)| {
            !config
                .allowed_query_params
                .iter()
                .any(|allowed| allowed == name)
        })
    {
        return Err(Bypass::QueryString);
    }

    Ok(())
}

/// Whether the request may be served from or written to the cache.
pub fn should_cache(request: &RequestDescriptor, config: &CacheabilityConfig) -> bool {
    evaluate(request, config).is_ok()
}

fn matches_any(patterns: &[GlobPattern], candidate: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(candidate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::config::compile_patterns;

    fn request(url: &str) -> RequestDescriptor {
        RequestDescriptor::get(url).expect("valid url")
    }

    #[test]
    fn plain_get_is_cacheable() {
        let config = CacheabilityConfig::default();
        assert!(should_cache(&request("https://example.com/hello/"), &config));
    }

    #[test]
    fn disabled_cache_rejects_everything() {
        let config = CacheabilityConfig {
            page_cache_enabled: false,
            ..Default::default()
        };
        assert_eq!(
            evaluate(&request("https://example.com/"), &config),
            Err(Bypass::Disabled)
        );
    }

    #[test]
    fn non_get_methods_are_never_cached() {
        let config = CacheabilityConfig::default();
        for method in ["POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "get"] {
            let req = request("https://example.com/").with_method(method);
            assert_eq!(evaluate(&req, &config), Err(Bypass::Method), "{method}");
        }
    }

    #[test]
    fn logged_in_respects_override() {
        let req = request("https://example.com/").logged_in(true);
        assert_eq!(
            evaluate(&req, &CacheabilityConfig::default()),
            Err(Bypass::LoggedIn)
        );

        let config = CacheabilityConfig {
            cache_logged_in: true,
            ..Default::default()
        };
        assert!(should_cache(&req, &config));
    }

    #[test]
    fn excluded_cookie_glob() {
        let config = CacheabilityConfig::default();
        let req = request("https://example.com/").with_cookie("wordpress_logged_in_99");
        assert_eq!(evaluate(&req, &config), Err(Bypass::ExcludedCookie));

        let harmless = request("https://example.com/").with_cookie("theme");
        assert!(should_cache(&harmless, &config));
    }

    #[test]
    fn excluded_url_by_glob_or_substring() {
        let config = CacheabilityConfig {
            excluded_urls: compile_patterns(["/checkout/", "*/account/*"]),
            ..Default::default()
        };
        assert_eq!(
            evaluate(&request("https://shop.example/checkout/step-1"), &config),
            Err(Bypass::ExcludedUrl)
        );
        assert_eq!(
            evaluate(&request("https://shop.example/account/orders"), &config),
            Err(Bypass::ExcludedUrl)
        );
        assert!(should_cache(&request("https://shop.example/products/"), &config));
    }

    #[test]
    fn excluded_user_agent_glob() {
        let config = CacheabilityConfig {
            excluded_user_agents: compile_patterns(["*Lighthouse*"]),
            ..Default::default()
        };
        let req = request("https://example.com/").with_user_agent("Mozilla/5.0 Chrome-Lighthouse");
        assert_eq!(evaluate(&req, &config), Err(Bypass::ExcludedUserAgent));
    }

    #[test]
    fn body_data_rejected_even_for_get() {
        let req = request("https://example.com/").with_body(true);
        assert_eq!(
            evaluate(&req, &CacheabilityConfig::default()),
            Err(Bypass::BodyData)
        );
    }

    #[test]
    fn tracking_params_are_allowed() {
        let config = CacheabilityConfig::default();
        let req = request("https://example.com/?utm_source=news&gclid=abc");
        assert!(should_cache(&req, &config));
    }

    #[test]
    fn unknown_query_param_rejected_unless_override() {
        let req = request("https://example.com/?s=search&utm_source=x");
        assert_eq!(
            evaluate(&req, &CacheabilityConfig::default()),
            Err(Bypass::QueryString)
        );

        let config = CacheabilityConfig {
            cache_query_strings: true,
            ..Default::default()
        };
        assert!(should_cache(&req, &config));
    }

    #[test]
    fn rules_short_circuit_in_order() {
        let req = request("https://example.com/?s=x")
            .with_method("POST")
            .logged_in(true);
        assert_eq!(
            evaluate(&req, &CacheabilityConfig::default()),
            Err(Bypass::Method)
        );
    }
}
