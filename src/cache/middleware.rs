//! Axum adapter for the page cache.
//!
//! Serves hits straight from storage and stores `200 text/html` responses of
//! cacheable requests on a miss.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, error, instrument, warn};

use super::config::{CacheabilityConfig, DEFAULT_LOGIN_COOKIE_PREFIX};
use super::engine::{Lookup, PageCache};
use super::request::{RequestDescriptor, is_mobile_user_agent};
use super::serving::{CACHE_STATUS_HEADER, CachedPage};

/// Largest rendered body the adapter will buffer and store.
pub const MAX_CACHEABLE_BODY: u64 = 8 * 1024 * 1024;

/// Shared state for [`page_cache_layer`].
#[derive(Debug, Clone)]
pub struct PageCacheState {
    pub cache: PageCache,
    pub config: Arc<CacheabilityConfig>,
    /// Cookie name prefix that marks a logged-in visitor.
    pub login_cookie_prefix: String,
}

impl PageCacheState {
    pub fn new(cache: PageCache, config: Arc<CacheabilityConfig>) -> Self {
        Self {
            cache,
            config,
            login_cookie_prefix: DEFAULT_LOGIN_COOKIE_PREFIX.to_string(),
        }
    }

    pub fn with_login_cookie_prefix(mut self, prefix: &str) -> Self {
        self.login_cookie_prefix = prefix.to_string();
        self
    }
}

#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn page_cache_layer(
    State(state): State<PageCacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let descriptor = describe(&request, &state.login_cookie_prefix);

    let cache = state.cache.clone();
    let config = state.config.clone();
    let lookup_request = descriptor.clone();
    let lookup =
        match tokio::task::spawn_blocking(move || cache.lookup(&lookup_request, &config)).await {
            Ok(lookup) => lookup,
            Err(err) => {
                error!(
                    op = "cache::middleware::lookup",
                    result = "join_error",
                    error = %err,
                    "Page cache lookup task failed"
                );
                return next.run(request).await;
            }
        };

    let key = match lookup {
        Lookup::Bypass(_) => return next.run(request).await,
        Lookup::Hit(page) => return serve(page),
        Lookup::Miss(key) => key,
    };

    let response = next.run(request).await;
    if !is_storable(&response) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHEABLE_BODY as usize).await {
        Ok(bytes) => bytes,
        Err(err) => {
            warn!(
                op = "cache::middleware::store",
                result = "body_error",
                error = %err,
                "Failed to buffer response body"
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match String::from_utf8(bytes.to_vec()) {
        Ok(html) => {
            let cache = state.cache.clone();
            let config = state.config.clone();
            let stored = tokio::task::spawn_blocking(move || {
                cache.store_rendered(&descriptor, &key, &html, &config)
            })
            .await;
            if let Err(err) = stored {
                error!(
                    op = "cache::middleware::store",
                    result = "join_error",
                    error = %err,
                    "Page cache store task failed"
                );
            }
        }
        Err(_) => debug!(
            op = "cache::middleware::store",
            result = "skipped",
            reason = "non_utf8",
            "Response body is not UTF-8; not caching"
        ),
    }

    parts
        .headers
        .insert(CACHE_STATUS_HEADER, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

/// Build the request descriptor the core consumes.
pub fn describe<B>(request: &Request<B>, login_cookie_prefix: &str) -> RequestDescriptor {
    let headers = request.headers();
    let uri = request.uri();

    let scheme = header_str(headers, "x-forwarded-proto")
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_ascii_lowercase())
        .filter(|value| !value.is_empty())
        .or_else(|| uri.scheme_str().map(str::to_string))
        .unwrap_or_else(|| "http".to_string());
    let host = header_str(headers, header::HOST.as_str())
        .map(str::to_string)
        .or_else(|| uri.authority().map(|authority| authority.to_string()))
        .unwrap_or_default();
    let request_uri = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    let query_params = uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let cookies = cookie_names(headers);
    let is_logged_in = !login_cookie_prefix.is_empty()
        && cookies
            .iter()
            .any(|name| name.starts_with(login_cookie_prefix));
    let user_agent = header_str(headers, header::USER_AGENT.as_str())
        .unwrap_or_default()
        .to_string();
    let accepts_compressed_encoding = headers
        .get_all(header::ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains("gzip"));
    let has_body_data = headers.contains_key(header::TRANSFER_ENCODING)
        || header_str(headers, header::CONTENT_LENGTH.as_str())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .is_some_and(|length| length > 0);

    RequestDescriptor {
        method: request.method().as_str().to_string(),
        scheme,
        host,
        request_uri,
        cookies,
        query_params,
        is_mobile_device: is_mobile_user_agent(&user_agent),
        user_agent,
        is_logged_in,
        accepts_compressed_encoding,
        has_body_data,
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn cookie_names(headers: &HeaderMap) -> BTreeSet<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let name = pair.split('=').next()?.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// Only complete `200 text/html` responses of known, bounded size are stored.
fn is_storable(response: &Response) -> bool {
    if response.status() != StatusCode::OK {
        return false;
    }
    let is_html = header_str(response.headers(), header::CONTENT_TYPE.as_str())
        .is_some_and(|value| value.to_ascii_lowercase().starts_with("text/html"));
    let bounded = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|upper| upper <= MAX_CACHEABLE_BODY);
    is_html && bounded
}

fn serve(page: CachedPage) -> Response {
    let mut builder = Response::builder().status(StatusCode::OK);
    for (name, value) in page.headers() {
        builder = builder.header(name, value);
    }
    builder
        .body(Body::from(page.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str) -> axum::http::request::Builder {
        Request::builder().uri(uri).header("host", "example.com")
    }

    #[test]
    fn describe_reads_headers() {
        let req = request("/post/?utm_source=x&b=%20y")
            .header("x-forwarded-proto", "https")
            .header("cookie", "a=1; wordpress_logged_in_abc=2")
            .header("accept-encoding", "br, GZIP")
            .header("user-agent", "Mozilla/5.0 (Linux; Android 14)")
            .body(())
            .expect("request");

        let descriptor = describe(&req, DEFAULT_LOGIN_COOKIE_PREFIX);
        assert_eq!(
            descriptor.url(),
            "https://example.com/post/?utm_source=x&b=%20y"
        );
        assert_eq!(
            descriptor.query_params,
            vec![
                ("utm_source".to_string(), "x".to_string()),
                ("b".to_string(), " y".to_string()),
            ]
        );
        assert!(descriptor.cookies.contains("a"));
        assert!(descriptor.is_logged_in);
        assert!(descriptor.accepts_compressed_encoding);
        assert!(descriptor.is_mobile_device);
        assert!(!descriptor.has_body_data);
    }

    #[test]
    fn describe_defaults_to_http_and_detects_body() {
        let req = request("/")
            .method("POST")
            .header("content-length", "12")
            .body(())
            .expect("request");

        let descriptor = describe(&req, DEFAULT_LOGIN_COOKIE_PREFIX);
        assert_eq!(descriptor.scheme, "http");
        assert_eq!(descriptor.method, "POST");
        assert!(descriptor.has_body_data);
        assert!(!descriptor.is_logged_in);
    }

    #[test]
    fn zero_content_length_is_not_body_data() {
        let req = request("/")
            .header("content-length", "0")
            .body(())
            .expect("request");
        assert!(!describe(&req, DEFAULT_LOGIN_COOKIE_PREFIX).has_body_data);
    }

    #[test]
    fn storable_requires_html_ok() {
        let html = Response::builder()
            .header("content-type", "text/html; charset=utf-8")
            .body(Body::from("<p>x</p>"))
            .expect("response");
        assert!(is_storable(&html));

        let json = Response::builder()
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .expect("response");
        assert!(!is_storable(&json));

        let missing = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .header("content-type", "text/html")
            .body(Body::from("gone"))
            .expect("response");
        assert!(!is_storable(&missing));
    }
}
